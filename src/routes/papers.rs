use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use chrono::NaiveDate;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use super::{ApiError, AppState, api_error, internal_error};
use crate::ingest::{IngestError, Uploader, validate_submission};
use crate::models::{
    AuthorCandidate, Paper, PaperAuthorResponse, PaperCreatedResponse, PaperDetailResponse,
    PaperFields, PaperListResponse, PaperQuery, PaperSummary, VolumeRef,
};
use crate::routes::auth::extract_current_user;

/// Room for the text fields that travel next to the file.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn papers_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_papers)
                .post(upload_paper)
                .layer(DefaultBodyLimit::max(max_upload_bytes + FORM_OVERHEAD_BYTES)),
        )
        .route("/{paper_id}", get(get_paper))
}

#[derive(Debug, Default)]
struct UploadForm {
    title: String,
    abstract_text: String,
    keywords: Option<String>,
    publication_date: Option<String>,
    doi: Option<String>,
    issn: Option<String>,
    volume_no: Option<String>,
    page_no: Option<String>,
    publisher_id: Option<String>,
    authors: Option<String>,
    file: Option<UploadedFile>,
}

#[derive(Debug)]
struct UploadedFile {
    content_type: Option<String>,
    data: Vec<u8>,
}

struct Submission {
    fields: PaperFields,
    authors: Vec<AuthorCandidate>,
}

async fn upload_paper(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let current_user = extract_current_user(&state, &headers).await?;
    let mut form = read_upload_form(multipart).await?;
    let submission = parse_submission(&form)?;
    validate_submission(&submission.fields, &submission.authors)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let stored = match form.file.take() {
        Some(file) => {
            check_paper_file(&file, state.config.max_upload_bytes)?;
            let path = state
                .store
                .store(current_user.user_id, &form.title, &file.data)
                .await
                .map_err(internal_error)?;
            Some(path)
        }
        None => None,
    };

    let uploader = Uploader::from(&current_user);
    let result = state
        .ingestor
        .ingest(&submission.fields, stored.as_deref(), &submission.authors, &uploader)
        .await;

    let receipt = match result {
        Ok(receipt) => receipt,
        Err(error) => {
            if let Some(path) = &stored {
                state.store.remove(path).await;
            }
            return Err(match error {
                IngestError::Validation(v) => api_error(StatusCode::BAD_REQUEST, v),
                other => api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Server error during paper upload: {other}"),
                ),
            });
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(PaperCreatedResponse {
            message: "Paper uploaded successfully".to_string(),
            paper_id: receipt.paper_id,
            file_path: stored.unwrap_or_default(),
            volume: receipt.volume.as_str().to_string(),
            authors: receipt.authors.iter().map(|a| a.author_id).collect(),
        }),
    ))
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if matches!(name.as_str(), "paperFile" | "file") {
            let content_type = field.content_type().map(ToString::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| api_error(e.status(), e.body_text()))?;
            form.file = Some(UploadedFile {
                content_type,
                data: data.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| api_error(e.status(), e.body_text()))?;

        match name.as_str() {
            "title" | "PaperTitle" => form.title = value,
            "abstract" | "PaperAbstract" => form.abstract_text = value,
            "keywords" | "PaperKeywords" => form.keywords = non_empty(value),
            "publication_date" | "PublicationDate" => form.publication_date = non_empty(value),
            "doi" | "DOI" => form.doi = non_empty(value),
            "issn" | "ISSN" => form.issn = non_empty(value),
            "volume_no" | "VolumeNo" => form.volume_no = non_empty(value),
            "page_no" | "PageNo" => form.page_no = non_empty(value),
            "publisher_id" | "PublisherID" => form.publisher_id = non_empty(value),
            "authors" => form.authors = non_empty(value),
            _ => {}
        }
    }

    Ok(form)
}

fn parse_submission(form: &UploadForm) -> Result<Submission, ApiError> {
    let publication_date = form
        .publication_date
        .as_deref()
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                api_error(
                    StatusCode::BAD_REQUEST,
                    "publication_date must be formatted as YYYY-MM-DD",
                )
            })
        })
        .transpose()?;

    let authors = match form.authors.as_deref() {
        Some(raw) => serde_json::from_str::<Vec<AuthorCandidate>>(raw).map_err(|e| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("authors must be a JSON array of author objects: {e}"),
            )
        })?,
        None => Vec::new(),
    };

    Ok(Submission {
        fields: PaperFields {
            title: form.title.clone(),
            abstract_text: form.abstract_text.clone(),
            keywords: form.keywords.clone(),
            publication_date,
            doi: form.doi.clone(),
            volume: VolumeRef {
                issn: form.issn.as_ref().map(|issn| issn.trim().to_string()),
                volume_no: parse_number(form.volume_no.as_deref(), "volume_no")?,
                page_no: parse_number(form.page_no.as_deref(), "page_no")?,
            },
            publisher_id: parse_number(form.publisher_id.as_deref(), "publisher_id")?,
        },
        authors,
    })
}

fn check_paper_file(file: &UploadedFile, max_bytes: usize) -> Result<(), ApiError> {
    if file.content_type.as_deref() != Some("application/pdf") {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Only PDF files are allowed for papers!",
        ));
    }
    if file.data.len() > max_bytes {
        return Err(api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Paper file exceeds {} bytes", max_bytes),
        ));
    }
    Ok(())
}

fn parse_number(raw: Option<&str>, field: &str) -> Result<Option<i64>, ApiError> {
    raw.map(|value| {
        value
            .trim()
            .parse::<i64>()
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, format!("{field} must be an integer")))
    })
    .transpose()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

async fn list_papers(
    State(state): State<AppState>,
    Query(query): Query<PaperQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = i64::from(page - 1).saturating_mul(i64::from(per_page));

    let mut papers = sqlx::query_as::<_, PaperSummary>(
        r#"
        SELECT
            p.paper_id,
            p.title,
            p.abstract,
            p.publication_date,
            p.doi,
            p.citation_count,
            u.full_name AS uploader_name
        FROM papers p
        LEFT JOIN users u ON u.user_id = p.uploaded_by
        ORDER BY p.publication_date DESC, p.paper_id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(i64::from(per_page))
    .bind(offset)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM papers")
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    let paper_ids: Vec<i64> = papers.iter().map(|p| p.paper_id).collect();
    let mut names = fetch_author_names(&state.pool, &paper_ids)
        .await
        .map_err(internal_error)?;
    for paper in &mut papers {
        paper.author_names = names.remove(&paper.paper_id).unwrap_or_default();
    }

    Ok(Json(PaperListResponse {
        papers,
        total,
        page,
        per_page,
    }))
}

/// Distinct author names per paper, alphabetically.
async fn fetch_author_names(
    pool: &SqlitePool,
    paper_ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>, sqlx::Error> {
    if paper_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query_builder = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT DISTINCT pa.paper_id, a.author_name
        FROM paper_authors pa
        JOIN authors a ON a.author_id = pa.author_id
        WHERE pa.paper_id IN (
        "#,
    );
    {
        let mut separated = query_builder.separated(", ");
        for paper_id in paper_ids {
            separated.push_bind(*paper_id);
        }
    }
    query_builder.push(") ORDER BY pa.paper_id, a.author_name");

    let rows: Vec<(i64, String)> = query_builder.build_query_as().fetch_all(pool).await?;
    let mut names: HashMap<i64, Vec<String>> = HashMap::new();
    for (paper_id, name) in rows {
        names.entry(paper_id).or_default().push(name);
    }
    Ok(names)
}

#[derive(Debug, FromRow)]
struct PaperDetailRow {
    #[sqlx(flatten)]
    paper: Paper,
    uploader_full_name: Option<String>,
    uploader_email: Option<String>,
    publisher_name: Option<String>,
    journal_name: Option<String>,
}

async fn get_paper(
    State(state): State<AppState>,
    Path(paper_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = sqlx::query_as::<_, PaperDetailRow>(
        r#"
        SELECT
            p.*,
            u.full_name AS uploader_full_name,
            u.email AS uploader_email,
            pb.publisher_name AS publisher_name,
            j.journal_name AS journal_name
        FROM papers p
        LEFT JOIN users u ON u.user_id = p.uploaded_by
        LEFT JOIN publishers pb ON pb.publisher_id = p.publisher_id
        LEFT JOIN journals j ON j.issn = p.issn
        WHERE p.paper_id = ?
        "#,
    )
    .bind(paper_id)
    .fetch_optional(&state.pool)
    .await
    .map_err(internal_error)?
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Paper not found"))?;

    let authors = sqlx::query_as::<_, PaperAuthorResponse>(
        r#"
        SELECT a.author_id, a.author_name, a.author_email, a.author_affiliation
        FROM paper_authors pa
        JOIN authors a ON a.author_id = pa.author_id
        WHERE pa.paper_id = ?
        ORDER BY pa.rowid
        "#,
    )
    .bind(paper_id)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    Ok(Json(PaperDetailResponse {
        paper: row.paper,
        uploader_full_name: row.uploader_full_name,
        uploader_email: row.uploader_email,
        publisher_name: row.publisher_name,
        journal_name: row.journal_name,
        authors,
    }))
}
