//! Spreadsheet import: one sheet tab per course, one row per skill, with
//! colored date columns marking the weeks a skill spans.

pub mod google;
pub mod parse;

use async_trait::async_trait;
use mentor_types::models::SkillSpec;

/// One course parsed out of a spreadsheet, in tab order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedCourse {
    pub name: String,
    pub skills: Vec<SkillSpec>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("not a spreadsheet URL: {0}")]
    InvalidUrl(String),
    #[error("spreadsheet request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed spreadsheet response: {0}")]
    Malformed(String),
}

/// Converts a spreadsheet URL into courses with skill schedules.
///
/// Any failure — invalid URL, auth, malformed sheet — collapses to an
/// empty list; callers surface that as a plain failure message and never
/// create a partial course.
#[async_trait]
pub trait SheetImporter: Send + Sync {
    async fn import(&self, url: &str) -> Vec<ImportedCourse>;
}
