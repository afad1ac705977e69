// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    /// Open (creating if necessary) the SQLite store at `path`.
    ///
    /// WAL journaling plus a generous busy timeout lets concurrent scrape
    /// tasks share the store without application-level locking.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database dir: {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .with_context(|| format!("Invalid database path: {}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to open SQLite pool")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_jobs_sql = r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL,
                description TEXT NOT NULL,
                salary TEXT,
                job_type TEXT,
                posted_date TEXT,
                url TEXT,
                source TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                is_applied BOOLEAN NOT NULL DEFAULT 0,
                is_edited BOOLEAN NOT NULL DEFAULT 0,
                employment_type TEXT,
                notes TEXT,
                status TEXT NOT NULL DEFAULT 'new',
                has_full_description BOOLEAN NOT NULL DEFAULT 0,
                ai_processed BOOLEAN NOT NULL DEFAULT 0,
                cleaned_description TEXT,
                tags TEXT,
                entities TEXT,
                UNIQUE(company, title, location)
            )
        "#;

        let create_search_configs_sql = r#"
            CREATE TABLE IF NOT EXISTS search_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                keywords TEXT NOT NULL,
                location TEXT NOT NULL,
                radius INTEGER NOT NULL DEFAULT 10,
                employment_types TEXT NOT NULL DEFAULT '',
                enabled BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_scrape_log_sql = r#"
            CREATE TABLE IF NOT EXISTS scrape_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                search_config_id INTEGER,
                jobs_found INTEGER NOT NULL DEFAULT 0,
                jobs_added INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                success BOOLEAN NOT NULL DEFAULT 1,
                error_message TEXT
            )
        "#;

        let create_scheduler_config_sql = r#"
            CREATE TABLE IF NOT EXISTS scheduler_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                config_json TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        sqlx::query(create_jobs_sql).execute(&self.pool).await?;
        sqlx::query(create_search_configs_sql).execute(&self.pool).await?;
        sqlx::query(create_scrape_log_sql).execute(&self.pool).await?;
        sqlx::query(create_scheduler_config_sql).execute(&self.pool).await?;

        for index_sql in [
            "CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_location ON jobs(location)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_company ON jobs(company)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_employment_type ON jobs(employment_type)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_scraped_at ON jobs(scraped_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_scrape_log_started_at ON scrape_log(started_at DESC)",
        ] {
            sqlx::query(index_sql).execute(&self.pool).await?;
        }

        self.seed_default_search_configs().await?;

        Ok(())
    }

    /// Create default search configurations if they don't exist.
    async fn seed_default_search_configs(&self) -> Result<()> {
        let defaults: [(&str, &str, &str, i64, &str); 4] = [
            ("Python AI - Remote", "python ai", "Remote", 0, "contract,permanent,wfh"),
            ("Python DevOps - Remote", "python devops", "Remote", 0, "contract,permanent,wfh"),
            ("Python AI - Manchester", "python ai", "Manchester", 10, "contract,permanent"),
            ("Python DevOps - Manchester", "python devops", "Manchester", 10, "contract,permanent"),
        ];

        for (name, keywords, location, radius, employment_types) in defaults {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO search_configs (name, keywords, location, radius, employment_types, enabled)
                VALUES (?, ?, ?, ?, ?, 1)
                "#,
            )
            .bind(name)
            .bind(keywords)
            .bind(location)
            .bind(radius)
            .bind(employment_types)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");

        let db = DatabaseConnection::new(&db_path).await?;
        assert!(!db.pool().is_closed());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migration.db");

        let db = DatabaseConnection::new(&db_path).await?;
        db.migrate().await?;

        let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='jobs'")
            .fetch_optional(db.pool())
            .await?;
        assert!(result.is_some());

        // Migration is idempotent and seeding uses INSERT OR IGNORE
        db.migrate().await?;
        let config_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM search_configs")
                .fetch_one(db.pool())
                .await?;
        assert_eq!(config_count, 4);
        Ok(())
    }
}
