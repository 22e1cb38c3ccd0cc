//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `SessionStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use documind_core::domain::{ChatMessage, Document, Session, UserId};
use documind_core::ports::{PortError, PortResult, SessionStore};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `SessionStore` port.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new `PgSessionStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    user_id: String,
    document: Option<Json<Document>>,
    messages: Json<Vec<ChatMessage>>,
    last_updated: DateTime<Utc>,
}

impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            user_id: UserId::new(self.user_id),
            document: self.document.map(|Json(document)| document),
            messages: self.messages.0,
            last_updated: self.last_updated,
        }
    }
}

fn map_sqlx_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            PortError::Serialization(e.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, user_id: &UserId) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT user_id, document, messages, last_updated FROM user_sessions WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(record.map(SessionRecord::to_domain))
    }

    async fn put(&self, session: &Session) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_sessions (user_id, document, messages, last_updated) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET \
             document = EXCLUDED.document, \
             messages = EXCLUDED.messages, \
             last_updated = EXCLUDED.last_updated",
        )
        .bind(session.user_id.as_str())
        .bind(session.document.as_ref().map(Json))
        .bind(Json(&session.messages))
        .bind(session.last_updated)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(user_id = %session.user_id, messages = session.messages.len(), "Session row upserted");
        Ok(())
    }

    async fn delete(&self, user_id: &UserId) -> PortResult<()> {
        sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
