//! Database migration system.
//!
//! Runs migrations on startup, tracks applied versions, and reports status.

use sqlx::{PgPool, Row};
use tracing::{error, info, warn};

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

pub struct Migrator {
    pool: PgPool,
}

impl Migrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn init_migration_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_applied_migrations(&self) -> Result<Vec<Migration>> {
        let rows = sqlx::query(r#"SELECT version, name, applied_at FROM _migrations ORDER BY version"#)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Migration {
                version: row.get("version"),
                name: row.get("name"),
                applied_at: row.get("applied_at"),
            })
            .collect())
    }

    async fn record_migration(&self, version: i64, name: &str) -> Result<()> {
        sqlx::query(r#"INSERT INTO _migrations (version, name) VALUES ($1, $2) ON CONFLICT DO NOTHING"#)
            .bind(version)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Run all pending migrations in order.
    pub async fn migrate(&self) -> Result<()> {
        info!("initializing migration system");
        self.init_migration_table().await?;

        let applied = self.get_applied_migrations().await?;
        info!(count = applied.len(), "found applied migrations");

        let migrations: Vec<(i64, &str, &str)> = vec![
            (1, "job_tables", include_str!("../../migrations/001_job_tables.sql")),
            (2, "job_requests", include_str!("../../migrations/002_job_requests.sql")),
        ];

        for (version, name, sql) in migrations {
            if applied.iter().any(|m| m.version == version) {
                info!(version, name, "migration already applied, skipping");
                continue;
            }

            info!(version, name, "applying migration");

            // One raw_sql batch per migration: splitting on semicolons would
            // break the DO blocks used for conditional type creation.
            sqlx::raw_sql(sql).execute(&self.pool).await.map_err(|e| {
                error!(version, error = %e, "migration failed");
                Error::from(e)
            })?;

            self.record_migration(version, name).await?;
            info!(version, name, "migration applied");
        }

        info!("all migrations completed");
        Ok(())
    }

    /// Drop every table and enum type and re-run migrations from scratch.
    pub async fn reset(&self) -> Result<()> {
        warn!("resetting database — this deletes all data");

        sqlx::query(
            r#"
            DO $$ DECLARE
                r RECORD;
            BEGIN
                FOR r IN (SELECT tablename FROM pg_tables WHERE schemaname = 'public') LOOP
                    EXECUTE 'DROP TABLE IF EXISTS ' || quote_ident(r.tablename) || ' CASCADE';
                END LOOP;
            END $$;
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            DO $$ DECLARE
                r RECORD;
            BEGIN
                FOR r IN (SELECT typname FROM pg_type WHERE typtype = 'e' AND typnamespace = 'public'::regnamespace) LOOP
                    EXECUTE 'DROP TYPE IF EXISTS ' || quote_ident(r.typname) || ' CASCADE';
                END LOOP;
            END $$;
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("database reset complete, re-running migrations");
        self.migrate().await
    }

    pub async fn status(&self) -> Result<DbStatus> {
        self.init_migration_table().await?;

        let applied = self.get_applied_migrations().await?;

        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);

        let assignment_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_assignments")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);

        let result_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_results")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);

        Ok(DbStatus {
            applied_migrations: applied.len() as i64,
            job_count,
            assignment_count,
            result_count,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub applied_migrations: i64,
    pub job_count: i64,
    pub assignment_count: i64,
    pub result_count: i64,
}

/// Run migrations automatically on server start.
pub async fn auto_migrate(pool: &PgPool) -> Result<()> {
    Migrator::new(pool.clone()).migrate().await
}
