use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::str::FromStr;

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Single-connection in-memory database with the schema applied.
///
/// Every pooled connection to `sqlite::memory:` gets its own database, so the
/// pool is pinned to one connection that is never recycled.
#[cfg(test)]
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            institution TEXT,
            country TEXT,
            bio TEXT,
            research_interest TEXT,
            role TEXT NOT NULL DEFAULT 'Researcher',
            profile_picture TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS publishers (
            publisher_id INTEGER PRIMARY KEY AUTOINCREMENT,
            publisher_name TEXT NOT NULL,
            publisher_address TEXT,
            publisher_website TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS journals (
            journal_id INTEGER PRIMARY KEY AUTOINCREMENT,
            issn TEXT NOT NULL UNIQUE,
            journal_name TEXT NOT NULL,
            publisher_id INTEGER,
            FOREIGN KEY (publisher_id) REFERENCES publishers(publisher_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS journal_volumes (
            issn TEXT NOT NULL,
            volume_no INTEGER NOT NULL,
            page_no INTEGER NOT NULL,
            PRIMARY KEY (issn, volume_no, page_no),
            FOREIGN KEY (issn) REFERENCES journals(issn)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS papers (
            paper_id INTEGER PRIMARY KEY AUTOINCREMENT,
            issn TEXT,
            volume_no INTEGER,
            page_no INTEGER,
            title TEXT NOT NULL,
            abstract TEXT NOT NULL,
            keywords TEXT,
            publication_date DATE NOT NULL,
            doi TEXT,
            publisher_id INTEGER,
            uploaded_by INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            citation_count INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (
                (issn IS NULL AND volume_no IS NULL AND page_no IS NULL)
                OR (issn IS NOT NULL AND volume_no IS NOT NULL AND page_no IS NOT NULL)
            ),
            FOREIGN KEY (issn, volume_no, page_no) REFERENCES journal_volumes(issn, volume_no, page_no),
            FOREIGN KEY (publisher_id) REFERENCES publishers(publisher_id),
            FOREIGN KEY (uploaded_by) REFERENCES users(user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            author_id INTEGER PRIMARY KEY AUTOINCREMENT,
            author_name TEXT NOT NULL,
            author_email TEXT UNIQUE,
            author_affiliation TEXT,
            user_id INTEGER,
            FOREIGN KEY (user_id) REFERENCES users(user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_authors_name_affiliation ON authors (author_name, author_affiliation)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS paper_authors (
            paper_id INTEGER NOT NULL,
            author_id INTEGER NOT NULL,
            FOREIGN KEY (paper_id) REFERENCES papers(paper_id),
            FOREIGN KEY (author_id) REFERENCES authors(author_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_paper_authors_paper_id ON paper_authors (paper_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_paper_authors_author_id ON paper_authors (author_id)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('users', 'publishers', 'journals', 'journal_volumes', 'papers', 'authors', 'paper_authors')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 7);
    }

    #[tokio::test]
    async fn author_email_is_unique() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO authors (author_name, author_email) VALUES ('A', 'a@x.edu')")
            .execute(&pool)
            .await
            .unwrap();

        let duplicate = sqlx::query("INSERT INTO authors (author_name, author_email) VALUES ('B', 'a@x.edu')")
            .execute(&pool)
            .await;
        assert!(duplicate.is_err());

        // NULL emails never collide
        for _ in 0..2 {
            sqlx::query("INSERT INTO authors (author_name) VALUES ('Anonymous')")
                .execute(&pool)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn partial_volume_reference_is_rejected() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO users (full_name, email, password_hash) VALUES ('U', 'u@x.edu', 'h')")
            .execute(&pool)
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO papers (issn, title, abstract, publication_date, uploaded_by, file_path) \
             VALUES ('1234-5678', 't', 'a', '2024-01-01', 1, 'papers/x.pdf')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
