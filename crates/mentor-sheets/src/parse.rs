//! Pure parsing: URL validation and turning sheet values plus cell
//! background colors into skill schedules. Kept free of I/O so the whole
//! layout convention is unit-testable.

use std::sync::LazyLock;

use chrono::NaiveDate;
use mentor_types::models::SkillSpec;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

static SHEET_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://docs\.google\.com/spreadsheets/d/([a-zA-Z0-9_-]+)").unwrap()
});

pub fn is_valid_sheet_url(url: &str) -> bool {
    SHEET_ID_RE.is_match(url)
}

pub fn extract_sheet_id(url: &str) -> Option<&str> {
    SHEET_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// A cell counts as colored when its background is anything but pure
/// white. Missing color components default to 1.0, matching the API's
/// sparse representation of white cells.
fn is_colored(bg: &Value) -> bool {
    let component = |key: &str| bg.get(key).and_then(Value::as_f64).unwrap_or(1.0);
    !(component("red") == 1.0 && component("green") == 1.0 && component("blue") == 1.0)
}

/// Flatten a cell-format response into a per-cell colored flag grid.
/// Ragged rows are fine; absent cells are uncolored.
pub fn colored_cells(formatting: &Value) -> Vec<Vec<bool>> {
    let row_data = formatting
        .pointer("/sheets/0/data/0/rowData")
        .and_then(Value::as_array);

    let Some(rows) = row_data else {
        return Vec::new();
    };

    rows.iter()
        .map(|row| {
            row.get("values")
                .and_then(Value::as_array)
                .map(|cells| {
                    cells
                        .iter()
                        .map(|cell| {
                            cell.pointer("/userEnteredFormat/backgroundColor")
                                .map(is_colored)
                                .unwrap_or(false)
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Sheet layout: row 0 is the header (`name | link | date | date | ...`),
/// each header date cell starts with `YYYY-MM-DD`. For every skill row the
/// colored span across the date columns gives the start and end week; the
/// first colored column's position is the 1-based release week.
///
/// Rows with no name, no link, or no colored span are skipped.
pub fn parse_skill_rows(values: &[Vec<String>], colored: &[Vec<bool>]) -> Vec<SkillSpec> {
    let Some(headers) = values.first() else {
        return Vec::new();
    };

    let mut skills = Vec::new();

    for (row_index, row) in values.iter().enumerate().skip(1) {
        let name = row.first().map(String::as_str).unwrap_or("");
        let link = row.get(1).map(String::as_str).unwrap_or("");

        let mut start: Option<(usize, NaiveDate)> = None;
        let mut end: Option<NaiveDate> = None;

        for col in 2..headers.len() {
            let cell_colored = colored
                .get(row_index)
                .and_then(|cells| cells.get(col))
                .copied()
                .unwrap_or(false);
            if !cell_colored {
                continue;
            }

            let Some(date) = header_date(&headers[col]) else {
                debug!("skipping unparseable header date '{}'", headers[col]);
                continue;
            };

            if start.is_none() {
                start = Some((col, date));
            }
            end = Some(date);
        }

        if let (false, false, Some((start_col, start_date)), Some(end_date)) =
            (name.is_empty(), link.is_empty(), start, end)
        {
            skills.push(SkillSpec {
                name: name.to_string(),
                link: link.to_string(),
                // Date columns begin at index 2, so column 2 is week 1.
                week_number: (start_col - 1) as u32,
                start_date,
                end_date,
            });
        }
    }

    skills
}

fn header_date(header: &str) -> Option<NaiveDate> {
    let token = header.split_whitespace().next()?;
    NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grid(values: &[&[&str]]) -> Vec<Vec<String>> {
        values
            .iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn extracts_sheet_id_from_url() {
        let url = "https://docs.google.com/spreadsheets/d/1AbC_def-123/edit#gid=0";
        assert!(is_valid_sheet_url(url));
        assert_eq!(extract_sheet_id(url), Some("1AbC_def-123"));
    }

    #[test]
    fn rejects_non_sheet_url() {
        assert!(!is_valid_sheet_url("https://example.com/spreadsheet"));
        assert_eq!(extract_sheet_id("not a url"), None);
    }

    #[test]
    fn colored_span_becomes_week_range() {
        let values = grid(&[
            &["Skill", "Link", "2026-03-02", "2026-03-09", "2026-03-16"],
            &["Ownership", "https://doc.rs/own", "", "", ""],
        ]);
        // Row 1: columns 3 and 4 colored -> weeks 2..3.
        let colored = vec![
            vec![false; 5],
            vec![false, false, false, true, true],
        ];

        let skills = parse_skill_rows(&values, &colored);
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "Ownership");
        assert_eq!(skills[0].week_number, 2);
        assert_eq!(
            skills[0].start_date,
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
        assert_eq!(
            skills[0].end_date,
            NaiveDate::from_ymd_opt(2026, 3, 16).unwrap()
        );
    }

    #[test]
    fn rows_without_link_or_color_are_skipped() {
        let values = grid(&[
            &["Skill", "Link", "2026-03-02"],
            &["No link", "", ""],
            &["No color", "https://doc.rs/x", ""],
        ]);
        let colored = vec![vec![false; 3], vec![false, false, true], vec![false; 3]];

        assert!(parse_skill_rows(&values, &colored).is_empty());
    }

    #[test]
    fn white_and_missing_backgrounds_are_uncolored() {
        let formatting = json!({
            "sheets": [{ "data": [{ "rowData": [
                { "values": [
                    { "userEnteredFormat": { "backgroundColor": {} } },
                    { "userEnteredFormat": { "backgroundColor": { "red": 0.8, "green": 0.9 } } },
                    {}
                ]}
            ]}]}]
        });

        let colored = colored_cells(&formatting);
        assert_eq!(colored, vec![vec![false, true, false]]);
    }

    #[test]
    fn empty_formatting_yields_no_rows() {
        assert!(colored_cells(&json!({})).is_empty());
    }
}
