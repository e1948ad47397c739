use sqlx::SqliteConnection;

use crate::models::VolumeRef;

/// What happened to the submitted (ISSN, volume, page) reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeOutcome {
    /// Nothing, or only part of the triple, was submitted.
    NotRequested,
    /// The triple was already catalogued.
    Existing,
    /// A new journal volume entry was written.
    Registered,
    /// No journal carries this ISSN; the paper is stored without the reference.
    UnknownJournal { issn: String },
}

impl VolumeOutcome {
    /// Whether the paper row may carry the reference.
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Existing | Self::Registered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequested => "not_requested",
            Self::Existing => "existing",
            Self::Registered => "registered",
            Self::UnknownJournal { .. } => "omitted_unknown_journal",
        }
    }
}

pub async fn register_volume(
    conn: &mut SqliteConnection,
    volume: &VolumeRef,
) -> Result<VolumeOutcome, sqlx::Error> {
    let Some((issn, volume_no, page_no)) = volume.complete() else {
        return Ok(VolumeOutcome::NotRequested);
    };

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM journal_volumes WHERE issn = ? AND volume_no = ? AND page_no = ?",
    )
    .bind(issn)
    .bind(volume_no)
    .bind(page_no)
    .fetch_optional(&mut *conn)
    .await?;

    if existing.is_some() {
        return Ok(VolumeOutcome::Existing);
    }

    let journal = sqlx::query_scalar::<_, i64>("SELECT journal_id FROM journals WHERE issn = ?")
        .bind(issn)
        .fetch_optional(&mut *conn)
        .await?;

    if journal.is_none() {
        tracing::warn!(issn, volume_no, page_no, "Journal not found, omitting volume reference");
        return Ok(VolumeOutcome::UnknownJournal {
            issn: issn.to_string(),
        });
    }

    sqlx::query("INSERT OR IGNORE INTO journal_volumes (issn, volume_no, page_no) VALUES (?, ?, ?)")
        .bind(issn)
        .bind(volume_no)
        .bind(page_no)
        .execute(&mut *conn)
        .await?;

    tracing::debug!(issn, volume_no, page_no, "Registered journal volume");
    Ok(VolumeOutcome::Registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use sqlx::SqlitePool;

    async fn setup() -> SqlitePool {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO journals (issn, journal_name) VALUES ('1234-5678', 'Journal of Tests')")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    async fn volume_rows(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM journal_volumes")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn incomplete_triple_is_not_requested() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let outcome = register_volume(
            &mut conn,
            &VolumeRef {
                issn: Some("1234-5678".into()),
                volume_no: Some(4),
                page_no: None,
            },
        )
        .await
        .unwrap();
        drop(conn);

        assert_eq!(outcome, VolumeOutcome::NotRequested);
        assert!(!outcome.is_attached());
        assert_eq!(volume_rows(&pool).await, 0);
    }

    #[tokio::test]
    async fn registers_then_finds_existing() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let volume = VolumeRef::new("1234-5678", 4, 120);

        let first = register_volume(&mut conn, &volume).await.unwrap();
        let second = register_volume(&mut conn, &volume).await.unwrap();
        drop(conn);

        assert_eq!(first, VolumeOutcome::Registered);
        assert_eq!(second, VolumeOutcome::Existing);
        assert!(first.is_attached() && second.is_attached());
        assert_eq!(volume_rows(&pool).await, 1);
    }

    #[tokio::test]
    async fn unknown_journal_is_omitted_without_error() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let outcome = register_volume(&mut conn, &VolumeRef::new("0000-0000", 1, 1))
            .await
            .unwrap();
        drop(conn);

        assert_eq!(
            outcome,
            VolumeOutcome::UnknownJournal {
                issn: "0000-0000".into()
            }
        );
        assert!(!outcome.is_attached());
        assert_eq!(volume_rows(&pool).await, 0);
    }
}
