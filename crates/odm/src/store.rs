//! Store handle - the explicit connection every operation runs against.
//!
//! Writes go through [`Store::transact`], which scopes one DuckDB transaction
//! per call behind a [`TransactionGuard`]: commit on success, rollback on
//! drop. A transaction that loses a uniqueness or write-write conflict to a
//! concurrent handle is rerun from the start with exponential backoff.

use crate::config::{RetryConfig, StoreConfig, validate_config};
use crate::error::{Error, Result};
use crate::schema::CREATE_SCHEMA;
use crate::vocabulary::Vocabulary;
use backon::{BlockingRetryable, ExponentialBuilder};
use diagnostics::*;
use duckdb::{Connection, Transaction};
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct Store {
    conn: Mutex<Connection>,
    vocabulary: Vocabulary,
    retry: RetryConfig,
    location: String,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if needed) the store described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        validate_config(config)?;
        let (conn, location) = match &config.path {
            Some(path) => (Connection::open(path)?, path.display().to_string()),
            None => (Connection::open_in_memory()?, ":memory:".to_string()),
        };
        conn.execute_batch(CREATE_SCHEMA)?;
        info!("Opened observations store {location}", location);

        Ok(Self {
            conn: Mutex::new(conn),
            vocabulary: Vocabulary::from_config(&config.vocabulary),
            retry: config.retry.clone(),
            location,
        })
    }

    /// An empty in-memory store with the default configuration.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreConfig::default())
    }

    /// A second handle onto the same database, with its own connection.
    pub fn try_clone(&self) -> Result<Self> {
        let conn = self.lock()?.try_clone()?;
        Ok(Self {
            conn: Mutex::new(conn),
            vocabulary: self.vocabulary.clone(),
            retry: self.retry.clone(),
            location: self.location.clone(),
        })
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn vocabulary_mut(&mut self) -> &mut Vocabulary {
        &mut self.vocabulary
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::Poisoned)
    }

    /// Run `f` as one atomic write transaction.
    ///
    /// `f` may run more than once when the commit loses a conflict; it must
    /// not have side effects outside the transaction.
    pub fn transact<T, F>(&self, label: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&TransactionGuard<'_>) -> Result<T>,
    {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.min_delay())
            .with_max_delay(self.retry.max_delay())
            .with_max_times(self.retry.max_attempts.saturating_sub(1))
            .with_jitter();

        (|| self.transact_once(label, &mut f))
            .retry(backoff)
            .when(Error::is_retryable)
            .notify(|err: &Error, after: Duration| {
                let delay_ms = after.as_millis() as u64;
                let reason = err.to_string();
                warn!(
                    "Retrying transaction {label} after {delay_ms}ms: {reason}",
                    label,
                    delay_ms,
                    reason
                );
            })
            .call()
    }

    fn transact_once<T, F>(&self, label: &str, f: &mut F) -> Result<T>
    where
        F: FnMut(&TransactionGuard<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let guard = TransactionGuard::new(tx, label, &self.vocabulary);
        let value = f(&guard)?;
        guard.commit()?;
        Ok(value)
    }

    /// Run `f` against a consistent snapshot. Nothing `f` does is committed.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&*tx)?;
        tx.rollback()?;
        Ok(value)
    }
}

/// One write transaction in progress. Dereferences to the underlying
/// connection for statement execution.
pub struct TransactionGuard<'a> {
    tx: Option<Transaction<'a>>,
    label: String,
    event_id: String,
    vocabulary: &'a Vocabulary,
    start_time: Instant,
}

impl<'a> TransactionGuard<'a> {
    fn new(tx: Transaction<'a>, label: &str, vocabulary: &'a Vocabulary) -> Self {
        let event_id = uuid7::uuid7().to_string();
        debug!("Begin transaction {label} event {event_id}", label, event_id);
        Self {
            tx: Some(tx),
            label: label.to_string(),
            event_id,
            vocabulary,
            start_time: Instant::now(),
        }
    }

    /// Identifier shared by every action this transaction records.
    #[must_use]
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        self.vocabulary
    }

    fn commit(mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit()?;
        }
        let label = &self.label;
        let event_id = &self.event_id;
        let elapsed_ms = self.start_time.elapsed().as_millis() as u64;
        debug!(
            "Committed transaction {label} event {event_id} in {elapsed_ms}ms",
            label,
            event_id,
            elapsed_ms
        );
        Ok(())
    }
}

impl Deref for TransactionGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `commit` takes the transaction, and it consumes the guard.
        match &self.tx {
            Some(tx) => tx,
            None => unreachable!("transaction guard used after commit"),
        }
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // duckdb::Transaction rolls back when dropped.
            let label = &self.label;
            let event_id = &self.event_id;
            debug!("Rolled back transaction {label} event {event_id}", label, event_id);
        }
    }
}
