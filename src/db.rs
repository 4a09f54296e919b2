use chrono::Utc;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

use crate::source::FetchResult;

/// One sent digest.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct Edition {
    pub edition: i64,
    pub sent_at: String,
    pub source_count: i64,
    pub failed_count: i64,
}

/// Outcome of one source within an edition. No content is stored.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct EditionSource {
    pub edition: i64,
    pub position: i64,
    pub name: String,
    pub error: Option<String>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS editions (
                edition INTEGER PRIMARY KEY,
                sent_at TEXT NOT NULL,
                source_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS edition_sources (
                edition INTEGER NOT NULL REFERENCES editions(edition),
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                error TEXT,
                PRIMARY KEY (edition, position)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn latest_edition(&self) -> anyhow::Result<i64> {
        let latest: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(edition), 0) FROM editions")
            .fetch_one(&self.pool)
            .await?;
        Ok(latest.0)
    }

    pub async fn next_edition(&self) -> anyhow::Result<i64> {
        Ok(self.latest_edition().await? + 1)
    }

    /// Store an edition and every source outcome in registration order.
    pub async fn record_edition(&self, edition: i64, results: &[FetchResult]) -> anyhow::Result<()> {
        let failed = results.iter().filter(|r| !r.is_ok()).count() as i64;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO editions (edition, sent_at, source_count, failed_count)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(edition)
        .bind(Utc::now().to_rfc3339())
        .bind(results.len() as i64)
        .bind(failed)
        .execute(&mut *tx)
        .await?;

        for (position, result) in results.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO edition_sources (edition, position, name, error)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(edition)
            .bind(position as i64)
            .bind(&result.name)
            .bind(result.error().map(|e| e.to_string()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn recent_editions(&self, limit: i64) -> anyhow::Result<Vec<Edition>> {
        let editions = sqlx::query_as::<_, Edition>(
            "SELECT * FROM editions ORDER BY edition DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(editions)
    }

    pub async fn sources_for_edition(&self, edition: i64) -> anyhow::Result<Vec<EditionSource>> {
        let sources = sqlx::query_as::<_, EditionSource>(
            "SELECT * FROM edition_sources WHERE edition = ? ORDER BY position",
        )
        .bind(edition)
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceData, SourceError};

    async fn create_test_db() -> Database {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        db
    }

    fn results() -> Vec<FetchResult> {
        vec![
            FetchResult::new("Weather", Err(SourceError::DeadlineExceeded)),
            FetchResult::new("Readwise", Ok(SourceData::Highlights(vec![]))),
            FetchResult::new(
                "Reddit",
                Err(SourceError::Status {
                    service: "Reddit API",
                    status: 429,
                }),
            ),
        ]
    }

    mod initialization_tests {
        use super::*;

        #[tokio::test]
        async fn test_database_creation() {
            let db = Database::new("sqlite::memory:").await;
            assert!(db.is_ok());
        }

        #[tokio::test]
        async fn test_double_initialization_is_safe() {
            let db = create_test_db().await;
            assert!(db.initialize().await.is_ok());
        }

        #[tokio::test]
        async fn test_fresh_ledger_starts_at_one() {
            let db = create_test_db().await;
            assert_eq!(db.latest_edition().await.unwrap(), 0);
            assert_eq!(db.next_edition().await.unwrap(), 1);
            assert!(db.recent_editions(10).await.unwrap().is_empty());
        }
    }

    mod ledger_tests {
        use super::*;

        #[tokio::test]
        async fn test_record_edition_advances_counter() {
            let db = create_test_db().await;

            db.record_edition(1, &results()).await.unwrap();
            assert_eq!(db.next_edition().await.unwrap(), 2);

            db.record_edition(2, &results()).await.unwrap();
            assert_eq!(db.next_edition().await.unwrap(), 3);
        }

        #[tokio::test]
        async fn test_record_edition_counts_failures() {
            let db = create_test_db().await;
            db.record_edition(7, &results()).await.unwrap();

            let editions = db.recent_editions(5).await.unwrap();
            assert_eq!(editions.len(), 1);
            assert_eq!(editions[0].edition, 7);
            assert_eq!(editions[0].source_count, 3);
            assert_eq!(editions[0].failed_count, 2);
            assert!(!editions[0].sent_at.is_empty());
        }

        #[tokio::test]
        async fn test_sources_kept_in_registration_order() {
            let db = create_test_db().await;
            db.record_edition(1, &results()).await.unwrap();

            let sources = db.sources_for_edition(1).await.unwrap();
            let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, vec!["Weather", "Readwise", "Reddit"]);
            assert_eq!(sources[0].error.as_deref(), Some("Deadline exceeded"));
            assert_eq!(sources[1].error, None);
            assert_eq!(
                sources[2].error.as_deref(),
                Some("Reddit API returned status 429")
            );
        }

        #[tokio::test]
        async fn test_duplicate_edition_is_rejected() {
            let db = create_test_db().await;
            db.record_edition(1, &results()).await.unwrap();
            assert!(db.record_edition(1, &results()).await.is_err());
            assert_eq!(db.sources_for_edition(1).await.unwrap().len(), 3);
        }

        #[tokio::test]
        async fn test_recent_editions_newest_first_with_limit() {
            let db = create_test_db().await;
            for edition in 1..=4 {
                db.record_edition(edition, &[]).await.unwrap();
            }

            let editions: Vec<i64> = db
                .recent_editions(2)
                .await
                .unwrap()
                .into_iter()
                .map(|e| e.edition)
                .collect();
            assert_eq!(editions, vec![4, 3]);
        }

        #[tokio::test]
        async fn test_unknown_edition_has_no_sources() {
            let db = create_test_db().await;
            assert!(db.sources_for_edition(99).await.unwrap().is_empty());
        }
    }
}
