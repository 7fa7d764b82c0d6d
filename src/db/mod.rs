mod models;

pub use models::*;

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{CertifyError, Result};

const SELECT_RECORD: &str = "SELECT id, track, name, email, track_label, start_date, end_date, \
     status, verification_code, certificate_sent, created_at FROM certificate_records";

/// Result of trying to attach a candidate code to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Another record already owns the candidate.
    Collision,
    /// The record had a code before this attempt; it is returned unchanged.
    AlreadyAssigned(String),
}

/// Persistent store for certificate records, shared by both tracks.
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(url = database_url, "Record store opened");
        Ok(store)
    }

    /// A private in-memory database. One connection, so every query sees the
    /// same data.
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CertifyError::Configuration(format!("migration failed: {e}")))
    }

    pub async fn create_record(&self, draft: &RecordDraft) -> Result<CertificateRecord> {
        let done = sqlx::query(
            r#"
            INSERT INTO certificate_records
                (track, name, email, track_label, start_date, end_date, status, certificate_sent, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', false, ?7)
            "#,
        )
        .bind(draft.track.as_str())
        .bind(&draft.name)
        .bind(&draft.email)
        .bind(&draft.track_label)
        .bind(draft.start_date)
        .bind(draft.end_date)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let id = done.last_insert_rowid();
        self.get_record(id).await?.ok_or(CertifyError::NotFound(id))
    }

    pub async fn get_record(&self, id: i64) -> Result<Option<CertificateRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!("{SELECT_RECORD} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CertificateRecord::try_from).transpose()
    }

    pub async fn list_records(&self) -> Result<Vec<CertificateRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "{SELECT_RECORD} ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CertificateRecord::try_from).collect()
    }

    /// Moves the record to `to` only if its current status is one of
    /// `allowed_from`. The check and the write are one statement, so
    /// concurrent transitions cannot both pass.
    pub async fn set_status(&self, id: i64, to: Status, allowed_from: &[Status]) -> Result<()> {
        let placeholders = (0..allowed_from.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE certificate_records SET status = ?1 WHERE id = ?2 AND status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(id);
        for status in allowed_from {
            query = query.bind(status.as_str());
        }
        let done = query.execute(&self.pool).await?;
        if done.rows_affected() == 1 {
            return Ok(());
        }

        match self.get_record(id).await? {
            Some(record) => Err(CertifyError::InvalidTransition {
                id,
                status: record.status,
                action: to.as_str(),
            }),
            None => Err(CertifyError::NotFound(id)),
        }
    }

    pub async fn mark_certificate_sent(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE certificate_records SET certificate_sent = true WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Attaches `candidate` to the record in a single conditional statement.
    /// The column's uniqueness constraint arbitrates concurrent claims.
    pub async fn claim_verification_code(&self, id: i64, candidate: &str) -> Result<ClaimOutcome> {
        let result = sqlx::query(
            "UPDATE certificate_records SET verification_code = ?1 \
             WHERE id = ?2 AND verification_code IS NULL",
        )
        .bind(candidate)
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(ClaimOutcome::Claimed),
            Ok(_) => match self.get_record(id).await? {
                Some(record) => Ok(record
                    .verification_code
                    .map_or(ClaimOutcome::Collision, ClaimOutcome::AlreadyAssigned)),
                None => Err(CertifyError::NotFound(id)),
            },
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(ClaimOutcome::Collision),
            Err(e) => Err(e.into()),
        }
    }

    /// Exact match on an already-normalized code, across both tracks.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<CertificateRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "{SELECT_RECORD} WHERE verification_code = ?1 ORDER BY id LIMIT 1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CertificateRecord::try_from).transpose()
    }
}
