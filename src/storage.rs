use std::path::PathBuf;

use chrono::Utc;
use uuid::Uuid;

const PAPERS_DIR: &str = "papers";
const MAX_TITLE_CHARS: usize = 50;
/// Uploads are PDF-only, and `/uploads` picks the served content type from
/// the extension, so the client's file name never contributes one.
const PAPER_EXT: &str = "pdf";

/// Disk storage for uploaded paper files under the upload root.
#[derive(Debug, Clone)]
pub struct PaperStore {
    root: PathBuf,
}

impl PaperStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.root.join(PAPERS_DIR)).await
    }

    /// Writes the file and returns its reference relative to the upload root.
    pub async fn store(
        &self,
        user_id: i64,
        title: &str,
        data: &[u8],
    ) -> std::io::Result<String> {
        let file_name = format!(
            "{}-{}-{}-{}.{}",
            user_id,
            sanitize_title(title),
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            PAPER_EXT
        );
        let relative = format!("{PAPERS_DIR}/{file_name}");

        self.ensure_dirs().await?;
        tokio::fs::write(self.root.join(&relative), data).await?;
        Ok(relative)
    }

    pub async fn remove(&self, relative: &str) {
        if let Err(error) = tokio::fs::remove_file(self.root.join(relative)).await {
            tracing::warn!(file = relative, error = %error, "Failed to remove stored paper file");
        }
    }
}

fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .take(MAX_TITLE_CHARS)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    if sanitized.is_empty() {
        "paper".to_string()
    } else {
        sanitized
    }
}
