//! Postgres-backed document sequence counter.
//!
//! One row per `(prefix, year)` in `document_sequences`, advanced with a single
//! `INSERT ... ON CONFLICT DO UPDATE ... RETURNING` statement so the database serializes
//! concurrent allocations. The update is guarded by `last_value < 999`; an exhausted
//! year returns no row and surfaces as `Conflict`.
//!
//! The allocator owns a one-worker tokio runtime that drives its pool. Synchronous callers
//! hand each query to that runtime and wait on a channel, so `allocate` is safe from plain
//! threads and from inside another runtime's tasks alike.

use std::future::Future;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::Runtime;
use tracing::instrument;

use toolroom_core::document_number::MAX_SEQUENCE;
use toolroom_core::{DocumentKind, DocumentNumber, DomainError};

use super::NumberAllocator;
use crate::error::{ServiceResult, StoreError};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PostgresNumberAllocator {
    pool: PgPool,
    runtime: Arc<NumberingRuntime>,
}

/// Runtime dedicated to the allocator's pool.
#[derive(Debug)]
struct NumberingRuntime(Option<Runtime>);

impl NumberingRuntime {
    fn start() -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("toolroom-numbering")
            .enable_all()
            .build()
            .map_err(|e| StoreError::Runtime(format!("cannot start numbering runtime: {e}")))?;
        Ok(Self(Some(runtime)))
    }

    fn get(&self) -> Result<&Runtime, StoreError> {
        self.0
            .as_ref()
            .ok_or_else(|| StoreError::Runtime("numbering runtime is shut down".to_string()))
    }

    /// Run `fut` on the owned runtime and block the calling thread for its output.
    fn run<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.get()?.spawn(async move {
            let _ = tx.send(fut.await);
        });
        rx.recv()
            .map_err(|_| StoreError::Runtime("numbering task was dropped".to_string()))
    }
}

impl Drop for NumberingRuntime {
    fn drop(&mut self) {
        // A plain drop blocks, which panics when the last handle goes away inside a task.
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

impl PostgresNumberAllocator {
    /// Connect to `database_url` and make sure the counter table exists.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let runtime = NumberingRuntime::start()?;
        let url = database_url.to_string();
        let pool = runtime.run(async move {
            PgPoolOptions::new()
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .connect(&url)
                .await
        })?;
        let pool = pool.map_err(|e| StoreError::database("connect", e))?;

        let allocator = Self {
            pool,
            runtime: Arc::new(runtime),
        };
        allocator.ensure_schema()?;
        Ok(allocator)
    }

    /// Build the pool without opening a connection; the first query connects.
    ///
    /// Callers must run [`ensure_schema`](Self::ensure_schema) before allocating.
    pub fn connect_lazy(database_url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let runtime = NumberingRuntime::start()?;
        let pool = {
            let _enter = runtime.get()?.enter();
            PgPoolOptions::new()
                .acquire_timeout(acquire_timeout)
                .connect_lazy(database_url)
                .map_err(|e| StoreError::database("connect", e))?
        };
        Ok(Self {
            pool,
            runtime: Arc::new(runtime),
        })
    }

    /// Create the counter table if it does not exist.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        self.runtime
            .run(async move {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS document_sequences (
                        prefix     TEXT    NOT NULL,
                        year       INTEGER NOT NULL,
                        last_value INTEGER NOT NULL CHECK (last_value BETWEEN 1 AND 999),
                        PRIMARY KEY (prefix, year)
                    )
                    "#,
                )
                .execute(&pool)
                .await
            })?
            .map_err(|e| StoreError::database("ensure_schema", e))?;
        Ok(())
    }
}

async fn next_sequence(pool: PgPool, prefix: &'static str, year: i32) -> Result<Option<i32>, sqlx::Error> {
    let row: Option<(i32,)> = sqlx::query_as(
        r#"
        INSERT INTO document_sequences (prefix, year, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (prefix, year) DO UPDATE
            SET last_value = document_sequences.last_value + 1
            WHERE document_sequences.last_value < $3
        RETURNING last_value
        "#,
    )
    .bind(prefix)
    .bind(year)
    .bind(MAX_SEQUENCE as i32)
    .fetch_optional(&pool)
    .await?;
    Ok(row.map(|(value,)| value))
}

impl NumberAllocator for PostgresNumberAllocator {
    #[instrument(skip(self), fields(prefix = kind.prefix()), err)]
    fn allocate(&self, kind: DocumentKind, year: i32) -> ServiceResult<DocumentNumber> {
        let value = self
            .runtime
            .run(next_sequence(self.pool.clone(), kind.prefix(), year))?
            .map_err(|e| StoreError::database("next_number", e))?;

        let Some(value) = value else {
            return Err(DomainError::conflict(format!(
                "document sequence {}NNN is exhausted",
                kind.stem(year)
            ))
            .into());
        };

        let sequence = u32::try_from(value).map_err(|_| {
            StoreError::database("next_number", format!("negative sequence value {value}"))
        })?;
        Ok(DocumentNumber::new(kind, year, sequence)?)
    }
}
