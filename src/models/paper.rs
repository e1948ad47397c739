use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Paper {
    pub paper_id: i64,
    pub issn: Option<String>,
    pub volume_no: Option<i64>,
    pub page_no: Option<i64>,
    pub title: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: Option<String>,
    pub publication_date: NaiveDate,
    pub doi: Option<String>,
    pub publisher_id: Option<i64>,
    pub uploaded_by: i64,
    pub file_path: String,
    pub citation_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Scalar fields of a paper submission, as handed to the ingestion core.
#[derive(Debug, Clone, Default)]
pub struct PaperFields {
    pub title: String,
    pub abstract_text: String,
    pub keywords: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub doi: Option<String>,
    pub volume: VolumeRef,
    pub publisher_id: Option<i64>,
}

/// (ISSN, volume, page) as submitted; any part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeRef {
    pub issn: Option<String>,
    pub volume_no: Option<i64>,
    pub page_no: Option<i64>,
}

impl VolumeRef {
    pub fn new(issn: impl Into<String>, volume_no: i64, page_no: i64) -> Self {
        Self {
            issn: Some(issn.into()),
            volume_no: Some(volume_no),
            page_no: Some(page_no),
        }
    }

    /// The full triple, or `None` if any part is absent.
    pub fn complete(&self) -> Option<(&str, i64, i64)> {
        let issn = self.issn.as_deref().filter(|v| !v.trim().is_empty())?;
        Some((issn, self.volume_no?, self.page_no?))
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct PaperSummary {
    pub paper_id: i64,
    pub title: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub publication_date: NaiveDate,
    pub doi: Option<String>,
    pub citation_count: i64,
    pub uploader_name: Option<String>,
    #[sqlx(skip)]
    pub author_names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PaperListResponse {
    pub papers: Vec<PaperSummary>,
    pub total: i64,
    pub page: i32,
    pub per_page: i32,
}

#[derive(Debug, Deserialize, Default)]
pub struct PaperQuery {
    pub page: Option<i32>,
    pub per_page: Option<i32>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PaperAuthorResponse {
    pub author_id: i64,
    pub author_name: String,
    pub author_email: Option<String>,
    pub author_affiliation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaperDetailResponse {
    #[serde(flatten)]
    pub paper: Paper,
    pub uploader_full_name: Option<String>,
    pub uploader_email: Option<String>,
    pub publisher_name: Option<String>,
    pub journal_name: Option<String>,
    pub authors: Vec<PaperAuthorResponse>,
}

#[derive(Debug, Serialize)]
pub struct PaperCreatedResponse {
    pub message: String,
    pub paper_id: i64,
    pub file_path: String,
    pub volume: String,
    pub authors: Vec<i64>,
}
