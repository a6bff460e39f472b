//! Thin Google Sheets v4 REST client. No hard algorithmic work lives
//! here; everything interesting is in [`crate::parse`].

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::parse::{colored_cells, extract_sheet_id, parse_skill_rows};
use crate::{ImportError, ImportedCourse, SheetImporter};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct GoogleSheetsImporter {
    client: reqwest::Client,
    api_key: String,
}

impl GoogleSheetsImporter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, ImportError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn fetch_courses(&self, url: &str) -> Result<Vec<ImportedCourse>, ImportError> {
        let sheet_id =
            extract_sheet_id(url).ok_or_else(|| ImportError::InvalidUrl(url.to_string()))?;

        // Tab titles, one course per tab.
        let meta = self
            .get_json(&format!(
                "{API_BASE}/{sheet_id}?fields=sheets(properties(title))&key={}",
                self.api_key
            ))
            .await?;
        let titles: Vec<String> = meta
            .pointer("/sheets")
            .and_then(Value::as_array)
            .ok_or_else(|| ImportError::Malformed("no sheets in response".into()))?
            .iter()
            .filter_map(|sheet| sheet.pointer("/properties/title"))
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        let mut courses = Vec::with_capacity(titles.len());
        for title in titles {
            let values = self
                .get_json(&format!(
                    "{API_BASE}/{sheet_id}/values/{}?key={}",
                    title, self.api_key
                ))
                .await?;
            let formatting = self
                .get_json(&format!(
                    "{API_BASE}/{sheet_id}?ranges={}!A:AZ\
                     &fields=sheets(data(rowData(values(userEnteredFormat))))&key={}",
                    title, self.api_key
                ))
                .await?;

            let grid = value_grid(&values);
            let skills = parse_skill_rows(&grid, &colored_cells(&formatting));
            courses.push(ImportedCourse {
                name: title,
                skills,
            });
        }

        Ok(courses)
    }
}

/// Coerce the `values` response into a string grid. Numbers and bools
/// show up for free-form cells; render them the way the sheet would.
fn value_grid(values: &Value) -> Vec<Vec<String>> {
    values
        .pointer("/values")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(cell_text).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetImporter for GoogleSheetsImporter {
    async fn import(&self, url: &str) -> Vec<ImportedCourse> {
        match self.fetch_courses(url).await {
            Ok(courses) => courses,
            Err(e) => {
                warn!("Sheet import failed for {}: {}", url, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_grid_coerces_scalars() {
        let values = json!({
            "values": [["Skill", "Link"], ["Counting", 42, true]]
        });
        let grid = value_grid(&values);
        assert_eq!(grid[1], vec!["Counting", "42", "true"]);
    }

    #[tokio::test]
    async fn invalid_url_imports_nothing() {
        let importer = GoogleSheetsImporter::new("test-key".into());
        assert!(importer.import("https://example.com/nope").await.is_empty());
    }
}
