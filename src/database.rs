use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::request_lifecycle::errors::StoreError;
use crate::request_lifecycle::traits::RequestStore;
use crate::request_lifecycle::types::{HistoryEntry, Request, RequestId, State, StatusUpdate};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
    id TEXT PRIMARY KEY NOT NULL,
    request_type TEXT NOT NULL,
    status TEXT NOT NULL,
    container_no TEXT,
    appointment TEXT,
    rejection TEXT,
    forwarded_at TEXT
);
CREATE TABLE IF NOT EXISTS request_history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL REFERENCES requests(id),
    at TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    action TEXT NOT NULL,
    from_status TEXT,
    reason TEXT,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS idx_request_history_request ON request_history(request_id, seq);
"#;

/// SQLite-backed request store; status updates are compare-and-set inside one transaction
pub struct SqliteRequestStore {
    pool: SqlitePool,
}

impl SqliteRequestStore {
    /// Connect (creating the database file if needed) and ensure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(unavailable)?
            .create_if_missing(true);
        if let Some(parent) = options
            .get_filename()
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable {
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(unavailable)?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(unavailable)?;

        info!(url = %config.url, "Request store database ready");
        Ok(Self { pool })
    }

    /// Stand-in for the CRUD service creating a request
    pub async fn insert(&self, request: &Request) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        sqlx::query(
            r#"
            INSERT INTO requests (id, request_type, status, container_no, appointment, rejection, forwarded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(request.id.as_str())
        .bind(to_json(&request.request_type)?)
        .bind(request.status.as_str())
        .bind(request.container_no.as_deref())
        .bind(request.appointment.as_ref().map(to_json).transpose()?)
        .bind(request.rejection.as_ref().map(to_json).transpose()?)
        .bind(request.forwarded_at.map(|at| at.to_rfc3339()))
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        for entry in &request.history {
            insert_entry(&mut tx, &request.id, entry).await?;
        }

        tx.commit().await.map_err(unavailable)
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

#[async_trait]
impl RequestStore for SqliteRequestStore {
    async fn get(&self, id: &RequestId) -> Result<Request, StoreError> {
        // Row and history come from one read transaction so a concurrent commit cannot tear them
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let request = load_request(&mut tx, id).await?;
        tx.commit().await.map_err(unavailable)?;
        Ok(request)
    }

    async fn update_status_and_append_history(
        &self,
        id: &RequestId,
        update: StatusUpdate,
    ) -> Result<Request, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let patch = &update.patch;

        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = ?1,
                container_no = COALESCE(?2, container_no),
                appointment = COALESCE(?3, appointment),
                rejection = COALESCE(?4, rejection),
                forwarded_at = COALESCE(?5, forwarded_at)
            WHERE id = ?6 AND status = ?7
            "#,
        )
        .bind(update.new_status.as_str())
        .bind(patch.container_no.as_deref())
        .bind(patch.appointment.as_ref().map(to_json).transpose()?)
        .bind(patch.rejection.as_ref().map(to_json).transpose()?)
        .bind(patch.forwarded_at.map(|at| at.to_rfc3339()))
        .bind(id.as_str())
        .bind(update.expected_status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            let current = sqlx::query("SELECT status FROM requests WHERE id = ?1")
                .bind(id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(unavailable)?;
            tx.rollback().await.map_err(unavailable)?;

            return Err(match current {
                None => StoreError::NotFound(id.clone()),
                Some(row) => StoreError::Conflict {
                    request_id: id.clone(),
                    expected: update.expected_status,
                    actual: parse_state(&column::<String>(&row, "status")?)?,
                },
            });
        }

        for entry in &update.entries {
            insert_entry(&mut tx, id, entry).await?;
        }

        // Read back before commit: once committed, a failed read would misreport the write
        let request = load_request(&mut tx, id).await?;
        tx.commit().await.map_err(unavailable)?;
        Ok(request)
    }
}

async fn load_request(conn: &mut SqliteConnection, id: &RequestId) -> Result<Request, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT id, request_type, status, container_no, appointment, rejection, forwarded_at
        FROM requests
        WHERE id = ?1
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(unavailable)?
    .ok_or_else(|| StoreError::NotFound(id.clone()))?;

    let history_rows = sqlx::query(
        r#"
        SELECT at, actor_id, action, from_status, reason, metadata
        FROM request_history
        WHERE request_id = ?1
        ORDER BY seq ASC
        "#,
    )
    .bind(id.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(unavailable)?;

    let history = history_rows
        .iter()
        .map(decode_entry)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Request {
        id: id.clone(),
        request_type: from_json(&column::<String>(&row, "request_type")?)?,
        status: parse_state(&column::<String>(&row, "status")?)?,
        history,
        container_no: column(&row, "container_no")?,
        appointment: column::<Option<String>>(&row, "appointment")?
            .as_deref()
            .map(from_json)
            .transpose()?,
        rejection: column::<Option<String>>(&row, "rejection")?
            .as_deref()
            .map(from_json)
            .transpose()?,
        forwarded_at: column::<Option<String>>(&row, "forwarded_at")?
            .as_deref()
            .map(parse_time)
            .transpose()?,
    })
}

async fn insert_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    request_id: &RequestId,
    entry: &HistoryEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO request_history (request_id, at, actor_id, action, from_status, reason, metadata)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(request_id.as_str())
    .bind(entry.at.to_rfc3339())
    .bind(&entry.by)
    .bind(&entry.action)
    .bind(entry.from.map(|state| state.as_str()))
    .bind(entry.reason.as_deref())
    .bind(entry.metadata.as_ref().map(|m| m.to_string()))
    .execute(&mut **tx)
    .await
    .map_err(unavailable)?;
    Ok(())
}

fn decode_entry(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryEntry, StoreError> {
    Ok(HistoryEntry {
        at: parse_time(&column::<String>(row, "at")?)?,
        by: column(row, "actor_id")?,
        action: column(row, "action")?,
        from: column::<Option<String>>(row, "from_status")?
            .as_deref()
            .map(parse_state)
            .transpose()?,
        reason: column(row, "reason")?,
        metadata: column::<Option<String>>(row, "metadata")?
            .as_deref()
            .map(from_json)
            .transpose()?,
    })
}

fn column<T>(row: &sqlx::sqlite::SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupted(format!("column {name}: {e}")))
}

fn parse_state(raw: &str) -> Result<State, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupted(format!("unknown status {raw}")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupted(format!("timestamp {raw}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupted(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupted(e.to_string()))
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        reason: e.to_string(),
    }
}
