use sqlx::SqliteConnection;

use crate::models::AuthorCandidate;

use super::{AuthorMatchPolicy, Uploader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAuthor {
    pub author_id: i64,
    pub created: bool,
    pub linked_to_uploader: bool,
}

impl ResolvedAuthor {
    fn existing(author_id: i64) -> Self {
        Self {
            author_id,
            created: false,
            linked_to_uploader: false,
        }
    }
}

/// Finds the person a candidate refers to, creating one when nothing matches.
///
/// Email is authoritative when present. Without an email the candidate is
/// matched on the exact (name, affiliation) pair, and only when both are
/// given. A matched person is returned untouched.
pub async fn resolve_author(
    conn: &mut SqliteConnection,
    candidate: &AuthorCandidate,
    uploader: &Uploader,
    policy: AuthorMatchPolicy,
) -> Result<ResolvedAuthor, sqlx::Error> {
    if let Some(existing) = find_existing(conn, candidate, policy).await? {
        tracing::debug!(author_id = existing, "Matched existing author");
        return Ok(ResolvedAuthor::existing(existing));
    }

    create_author(conn, candidate, uploader).await
}

async fn find_existing(
    conn: &mut SqliteConnection,
    candidate: &AuthorCandidate,
    policy: AuthorMatchPolicy,
) -> Result<Option<i64>, sqlx::Error> {
    if let Some(email) = candidate.email() {
        return find_by_email(conn, email).await;
    }

    match (candidate.affiliation(), policy) {
        (Some(affiliation), _) => {
            sqlx::query_scalar::<_, i64>(
                "SELECT author_id FROM authors WHERE author_name = ? AND author_affiliation = ? ORDER BY author_id LIMIT 1",
            )
            .bind(&candidate.name)
            .bind(affiliation)
            .fetch_optional(&mut *conn)
            .await
        }
        (None, AuthorMatchPolicy::BareName) => {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT author_id FROM authors
                WHERE author_name = ?
                  AND author_email IS NULL
                  AND author_affiliation IS NULL
                ORDER BY author_id
                LIMIT 1
                "#,
            )
            .bind(&candidate.name)
            .fetch_optional(&mut *conn)
            .await
        }
        (None, AuthorMatchPolicy::EmailThenNameAffiliation) => Ok(None),
    }
}

async fn find_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT author_id FROM authors WHERE author_email = ?")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await
}

async fn create_author(
    conn: &mut SqliteConnection,
    candidate: &AuthorCandidate,
    uploader: &Uploader,
) -> Result<ResolvedAuthor, sqlx::Error> {
    let email = candidate.email();
    let user_id = email
        .filter(|email| *email == uploader.email)
        .map(|_| uploader.user_id);

    // A concurrent ingestion may have committed the same email since the
    // lookup; the unique index turns that into a no-op insert.
    let result = sqlx::query(
        r#"
        INSERT INTO authors (author_name, author_email, author_affiliation, user_id)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (author_email) DO NOTHING
        "#,
    )
    .bind(&candidate.name)
    .bind(email)
    .bind(candidate.affiliation())
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let email = email.ok_or(sqlx::Error::RowNotFound)?;
        let author_id = find_by_email(conn, email)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        tracing::debug!(author_id, "Author email claimed concurrently, reusing row");
        return Ok(ResolvedAuthor::existing(author_id));
    }

    let author_id = result.last_insert_rowid();
    tracing::debug!(author_id, linked_user = ?user_id, "Created author");

    Ok(ResolvedAuthor {
        author_id,
        created: true,
        linked_to_uploader: user_id.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use sqlx::SqlitePool;

    async fn setup() -> (SqlitePool, Uploader) {
        let pool = connect_in_memory().await.unwrap();
        let user_id = sqlx::query(
            "INSERT INTO users (full_name, email, password_hash) VALUES ('Jane Doe', 'jane@x.edu', 'h')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let uploader = Uploader {
            user_id,
            full_name: "Jane Doe".into(),
            email: "jane@x.edu".into(),
        };
        (pool, uploader)
    }

    async fn author(pool: &SqlitePool, author_id: i64) -> crate::models::Author {
        sqlx::query_as("SELECT * FROM authors WHERE author_id = ?")
            .bind(author_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn email_match_wins_and_leaves_row_untouched() {
        let (pool, uploader) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let policy = AuthorMatchPolicy::default();

        let first = resolve_author(
            &mut conn,
            &AuthorCandidate::new("R. Roe").with_email("roe@x.edu").with_affiliation("MIT"),
            &uploader,
            policy,
        )
        .await
        .unwrap();
        assert!(first.created);

        let second = resolve_author(
            &mut conn,
            &AuthorCandidate::new("Richard Roe").with_email("roe@x.edu").with_affiliation("CMU"),
            &uploader,
            policy,
        )
        .await
        .unwrap();
        drop(conn);

        assert_eq!(second, ResolvedAuthor::existing(first.author_id));
        let stored = author(&pool, first.author_id).await;
        assert_eq!(stored.author_name, "R. Roe");
        assert_eq!(stored.author_affiliation.as_deref(), Some("MIT"));
    }

    #[tokio::test]
    async fn email_present_skips_name_affiliation_fallback() {
        let (pool, uploader) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let policy = AuthorMatchPolicy::default();

        let by_name = resolve_author(
            &mut conn,
            &AuthorCandidate::new("Ann Lee").with_affiliation("ETH"),
            &uploader,
            policy,
        )
        .await
        .unwrap();

        let with_email = resolve_author(
            &mut conn,
            &AuthorCandidate::new("Ann Lee").with_email("ann@eth.ch").with_affiliation("ETH"),
            &uploader,
            policy,
        )
        .await
        .unwrap();

        assert!(with_email.created);
        assert_ne!(with_email.author_id, by_name.author_id);
    }

    #[tokio::test]
    async fn name_and_affiliation_match_without_email() {
        let (pool, uploader) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let policy = AuthorMatchPolicy::default();
        let candidate = AuthorCandidate::new("Ann Lee").with_affiliation("ETH");

        let first = resolve_author(&mut conn, &candidate, &uploader, policy).await.unwrap();
        let second = resolve_author(&mut conn, &candidate, &uploader, policy).await.unwrap();
        let other_affiliation = resolve_author(
            &mut conn,
            &AuthorCandidate::new("Ann Lee").with_affiliation("EPFL"),
            &uploader,
            policy,
        )
        .await
        .unwrap();

        assert!(first.created);
        assert_eq!(second, ResolvedAuthor::existing(first.author_id));
        assert!(other_affiliation.created);
    }

    #[tokio::test]
    async fn bare_name_always_creates_by_default() {
        let (pool, uploader) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let candidate = AuthorCandidate::new("Anonymous Reviewer");

        let first = resolve_author(&mut conn, &candidate, &uploader, AuthorMatchPolicy::default())
            .await
            .unwrap();
        let second = resolve_author(&mut conn, &candidate, &uploader, AuthorMatchPolicy::default())
            .await
            .unwrap();

        assert!(first.created && second.created);
        assert_ne!(first.author_id, second.author_id);
    }

    #[tokio::test]
    async fn bare_name_policy_reuses_bare_rows_only() {
        let (pool, uploader) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let policy = AuthorMatchPolicy::BareName;

        let with_affiliation = resolve_author(
            &mut conn,
            &AuthorCandidate::new("Sam Poe").with_affiliation("UCL"),
            &uploader,
            policy,
        )
        .await
        .unwrap();
        let first = resolve_author(&mut conn, &AuthorCandidate::new("Sam Poe"), &uploader, policy)
            .await
            .unwrap();
        let second = resolve_author(&mut conn, &AuthorCandidate::new("Sam Poe"), &uploader, policy)
            .await
            .unwrap();

        assert_ne!(first.author_id, with_affiliation.author_id);
        assert_eq!(second, ResolvedAuthor::existing(first.author_id));
    }

    #[tokio::test]
    async fn uploader_email_links_new_author_to_account() {
        let (pool, uploader) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let resolved = resolve_author(
            &mut conn,
            &AuthorCandidate::new("Jane Doe").with_email("jane@x.edu"),
            &uploader,
            AuthorMatchPolicy::default(),
        )
        .await
        .unwrap();
        drop(conn);

        assert!(resolved.created && resolved.linked_to_uploader);
        assert_eq!(author(&pool, resolved.author_id).await.user_id, Some(uploader.user_id));
    }

    #[tokio::test]
    async fn uploader_link_is_not_applied_to_existing_author() {
        let (pool, uploader) = setup().await;
        let existing = sqlx::query(
            "INSERT INTO authors (author_name, author_email) VALUES ('J. Doe', 'jane@x.edu')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let mut conn = pool.acquire().await.unwrap();
        let resolved = resolve_author(
            &mut conn,
            &AuthorCandidate::new("Jane Doe").with_email("jane@x.edu"),
            &uploader,
            AuthorMatchPolicy::default(),
        )
        .await
        .unwrap();
        drop(conn);

        assert_eq!(resolved, ResolvedAuthor::existing(existing));
        assert_eq!(author(&pool, existing).await.user_id, None);
    }

    #[tokio::test]
    async fn insert_conflict_on_email_reuses_committed_row() {
        let (pool, uploader) = setup().await;
        let claimed = sqlx::query(
            "INSERT INTO authors (author_name, author_email) VALUES ('J. Doe', 'jane@x.edu')",
        )
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        // Skips the lookup, as when another ingestion commits in between.
        let mut conn = pool.acquire().await.unwrap();
        let resolved = create_author(
            &mut conn,
            &AuthorCandidate::new("Jane Doe").with_email("jane@x.edu"),
            &uploader,
        )
        .await
        .unwrap();
        drop(conn);

        assert_eq!(resolved, ResolvedAuthor::existing(claimed));
        assert!(!resolved.linked_to_uploader);
        let (authors,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM authors")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(authors, 1);
        let stored = author(&pool, claimed).await;
        assert_eq!(stored.author_name, "J. Doe");
        assert_eq!(stored.user_id, None);
    }

    #[tokio::test]
    async fn email_comparison_with_uploader_is_exact() {
        let (pool, uploader) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let resolved = resolve_author(
            &mut conn,
            &AuthorCandidate::new("Jane Doe").with_email("Jane@X.edu"),
            &uploader,
            AuthorMatchPolicy::default(),
        )
        .await
        .unwrap();

        assert!(resolved.created);
        assert!(!resolved.linked_to_uploader);
    }
}
