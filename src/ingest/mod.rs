//! Paper ingestion.
//!
//! A submission becomes one paper row, its author links, any newly created
//! authors and an optional journal volume entry, all written inside a single
//! transaction. Nothing survives a failed ingestion; dropping the future
//! before commit rolls the transaction back.

mod resolver;
mod volume;

pub use resolver::{ResolvedAuthor, resolve_author};
pub use volume::{VolumeOutcome, register_volume};

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

use crate::models::{AuthorCandidate, PaperFields, User};

/// How authors without an email are matched against existing rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthorMatchPolicy {
    /// Name and affiliation, only when both are present. A bare name always
    /// creates a new author.
    #[default]
    EmailThenNameAffiliation,
    /// Additionally reuse an author with the same bare name and neither email
    /// nor affiliation on record. Opt-in.
    BareName,
}

/// The authenticated account submitting a paper.
#[derive(Debug, Clone)]
pub struct Uploader {
    pub user_id: i64,
    pub full_name: String,
    pub email: String,
}

impl From<&User> for Uploader {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            full_name: user.full_name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("author #{0} is missing a name")]
    MissingAuthorName(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Begin,
    Volume,
    Paper,
    Author(usize),
    Link(usize),
    Commit,
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin => f.write_str("opening transaction"),
            Self::Volume => f.write_str("registering journal volume"),
            Self::Paper => f.write_str("inserting paper"),
            Self::Author(index) => write!(f, "resolving author #{}", index + 1),
            Self::Link(index) => write!(f, "linking author #{}", index + 1),
            Self::Commit => f.write_str("committing"),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("paper ingestion failed while {stage}: {source}")]
    Ingestion {
        stage: IngestStage,
        #[source]
        source: sqlx::Error,
    },
}

impl IngestError {
    fn at(stage: IngestStage) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Ingestion { stage, source }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub paper_id: i64,
    pub volume: VolumeOutcome,
    /// In submission order.
    pub authors: Vec<ResolvedAuthor>,
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    pool: SqlitePool,
    policy: AuthorMatchPolicy,
}

impl Ingestor {
    pub fn new(pool: SqlitePool, policy: AuthorMatchPolicy) -> Self {
        Self { pool, policy }
    }

    /// Ingests one submission atomically.
    ///
    /// `file_ref` must point at an already stored file; it is never removed
    /// here, even when the transaction rolls back.
    pub async fn ingest(
        &self,
        fields: &PaperFields,
        file_ref: Option<&str>,
        authors: &[AuthorCandidate],
        uploader: &Uploader,
    ) -> Result<IngestReceipt, IngestError> {
        validate_submission(fields, authors)?;
        let file_ref = file_ref
            .filter(|path| !path.trim().is_empty())
            .ok_or(ValidationError::MissingField("paper file"))?;

        // Take the write lock up front. A deferred transaction that reads
        // before writing fails with SQLITE_BUSY instead of waiting when
        // another writer commits first.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(IngestError::at(IngestStage::Begin))?;

        // `tx` rolls back on drop, so every early return below leaves no rows.
        let result = self.write(&mut tx, fields, file_ref, authors, uploader).await;
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(error) => {
                tracing::error!(uploader = uploader.user_id, error = %error, "Paper ingestion rolled back");
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(error = %rollback_error, "Rollback failed");
                }
                return Err(error);
            }
        };

        tx.commit().await.map_err(IngestError::at(IngestStage::Commit))?;

        tracing::info!(
            paper_id = receipt.paper_id,
            uploader = uploader.user_id,
            authors = receipt.authors.len(),
            volume = receipt.volume.as_str(),
            "Paper ingested"
        );
        Ok(receipt)
    }

    async fn write(
        &self,
        conn: &mut SqliteConnection,
        fields: &PaperFields,
        file_ref: &str,
        authors: &[AuthorCandidate],
        uploader: &Uploader,
    ) -> Result<IngestReceipt, IngestError> {
        let volume = register_volume(conn, &fields.volume)
            .await
            .map_err(IngestError::at(IngestStage::Volume))?;

        let (issn, volume_no, page_no) = match fields.volume.complete() {
            Some((issn, volume_no, page_no)) if volume.is_attached() => {
                (Some(issn), Some(volume_no), Some(page_no))
            }
            _ => (None, None, None),
        };

        let paper_id = sqlx::query(
            r#"
            INSERT INTO papers (
                issn, volume_no, page_no,
                title, abstract, keywords, publication_date, doi,
                publisher_id, uploaded_by, file_path, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(issn)
        .bind(volume_no)
        .bind(page_no)
        .bind(&fields.title)
        .bind(&fields.abstract_text)
        .bind(&fields.keywords)
        .bind(fields.publication_date)
        .bind(&fields.doi)
        .bind(fields.publisher_id)
        .bind(uploader.user_id)
        .bind(file_ref)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(IngestError::at(IngestStage::Paper))?
        .last_insert_rowid();

        let mut resolved = Vec::with_capacity(authors.len());
        for (index, candidate) in authors.iter().enumerate() {
            let author = resolve_author(conn, candidate, uploader, self.policy)
                .await
                .map_err(IngestError::at(IngestStage::Author(index)))?;

            sqlx::query("INSERT INTO paper_authors (paper_id, author_id) VALUES (?, ?)")
                .bind(paper_id)
                .bind(author.author_id)
                .execute(&mut *conn)
                .await
                .map_err(IngestError::at(IngestStage::Link(index)))?;

            resolved.push(author);
        }

        Ok(IngestReceipt {
            paper_id,
            volume,
            authors: resolved,
        })
    }
}

/// Checks the submission fields that must hold before any write, including
/// the file write done by callers ahead of [`Ingestor::ingest`].
pub fn validate_submission(
    fields: &PaperFields,
    authors: &[AuthorCandidate],
) -> Result<(), ValidationError> {
    if fields.title.trim().is_empty() {
        return Err(ValidationError::MissingField("title"));
    }
    if fields.abstract_text.trim().is_empty() {
        return Err(ValidationError::MissingField("abstract"));
    }
    if fields.publication_date.is_none() {
        return Err(ValidationError::MissingField("publication date"));
    }
    if let Some(index) = authors.iter().position(|a| a.name.trim().is_empty()) {
        return Err(ValidationError::MissingAuthorName(index + 1));
    }

    Ok(())
}
