use {async_trait::async_trait, tracing::debug, wagate_common::TenantId};

use crate::{
    model::{DEFAULT_EVENTS, TenantRecord},
    store::{StoreError, TenantStore},
};

/// SQLite-backed tenant store.
pub struct SqliteTenantStore {
    pool: sqlx::SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    id: i64,
    name: String,
    token: String,
    webhook: String,
    jid: String,
    qrcode: String,
    connected: i64,
    expiration: Option<i64>,
    events: String,
}

impl From<TenantRow> for TenantRecord {
    fn from(r: TenantRow) -> Self {
        Self {
            id: TenantId(r.id),
            name: r.name,
            token: r.token,
            webhook: r.webhook,
            jid: r.jid,
            pairing_code: r.qrcode,
            connected: r.connected != 0,
            expiration: r.expiration,
            events: r.events,
        }
    }
}

impl SqliteTenantStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `users` table if it doesn't exist.
    pub async fn init(pool: &sqlx::SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS users (
                id         INTEGER NOT NULL PRIMARY KEY,
                name       TEXT NOT NULL,
                token      TEXT NOT NULL UNIQUE,
                webhook    TEXT NOT NULL DEFAULT '',
                jid        TEXT NOT NULL DEFAULT '',
                qrcode     TEXT NOT NULL DEFAULT '',
                connected  INTEGER NOT NULL DEFAULT 0,
                expiration INTEGER,
                events     TEXT NOT NULL DEFAULT 'All'
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Open (creating if needed) the database file and ensure the schema.
    pub async fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.into()))?;
        }
        let opts = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(3));
        let pool = sqlx::SqlitePool::connect_with(opts).await?;
        Self::init(&pool).await?;
        debug!(path = %path.display(), "tenant database ready");
        Ok(Self::new(pool))
    }
}

fn ensure_affected(res: sqlx::sqlite::SqliteQueryResult, id: TenantId) -> Result<(), StoreError> {
    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound(id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl TenantStore for SqliteTenantStore {
    async fn create(&self, name: &str, token: &str) -> Result<TenantRecord, StoreError> {
        let res = sqlx::query("INSERT INTO users (name, token, events) VALUES (?, ?, ?)")
            .bind(name)
            .bind(token)
            .bind(DEFAULT_EVENTS)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    StoreError::DuplicateToken
                } else {
                    StoreError::Database(e)
                }
            })?;
        let id = TenantId(res.last_insert_rowid());
        self.get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_by_id(&self, id: TenantId) -> Result<Option<TenantRecord>, StoreError> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM users WHERE id = ? LIMIT 1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<TenantRecord>, StoreError> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM users WHERE token = ? LIMIT 1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<TenantRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TenantRow>("SELECT * FROM users ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn connected(&self) -> Result<Vec<TenantRecord>, StoreError> {
        let rows =
            sqlx::query_as::<_, TenantRow>("SELECT * FROM users WHERE connected = 1 ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_jid(&self, id: TenantId, jid: &str) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET jid = ? WHERE id = ?")
            .bind(jid)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        ensure_affected(res, id)
    }

    async fn set_pairing_code(&self, id: TenantId, code: &str) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET qrcode = ? WHERE id = ?")
            .bind(code)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        ensure_affected(res, id)
    }

    async fn set_connected(&self, id: TenantId, connected: bool) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET connected = ? WHERE id = ?")
            .bind(i64::from(connected))
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        ensure_affected(res, id)
    }

    async fn set_webhook(&self, id: TenantId, url: &str) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET webhook = ? WHERE id = ?")
            .bind(url)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        ensure_affected(res, id)
    }

    async fn set_events(&self, id: TenantId, events: &str) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET events = ? WHERE id = ?")
            .bind(events)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        ensure_affected(res, id)
    }

    async fn delete_by_token(&self, token: &str) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(token.to_string()));
        }
        Ok(())
    }
}
