use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

mod contacts;
mod error;
mod schema;
mod tags;

pub use contacts::{clamp_page, DEFAULT_PAGE_LIMIT};
pub use error::StoreError;
pub use schema::SCHEMA_VERSION;

/// VM instructions between deadline checks while a statement runs.
const PROGRESS_OPS: i32 = 100;

/// What an update of an existing contact does when it carries no tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyTagsPolicy {
    /// Fail with `StoreError::TagsRequired` and leave the row untouched.
    #[default]
    Reject,
    /// Refresh the contact fields and skip reconciliation.
    Ignore,
}

impl EmptyTagsPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Ignore => "ignore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "ignore" => Some(Self::Ignore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub empty_tags: EmptyTagsPolicy,
    /// Total attempts for an upsert that keeps hitting a retryable conflict.
    pub conflict_retries: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            empty_tags: EmptyTagsPolicy::default(),
            conflict_retries: 3,
        }
    }
}

/// Helper to convert stored RFC 3339 text into timestamps
fn parse_timestamp(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub struct Database {
    conn: Connection,
    options: StoreOptions,
    deadline: Cell<Option<Instant>>,
}

impl Database {
    /// Open a file database, creating it if needed, and run migrations.
    pub fn open_at(path: impl AsRef<Path>, options: StoreOptions) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::init(conn, options)
    }

    /// Open in-memory database for testing
    pub fn open_memory() -> anyhow::Result<Self> {
        Self::open_memory_with(StoreOptions::default())
    }

    pub fn open_memory_with(options: StoreOptions) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, options)
    }

    fn init(conn: Connection, options: StoreOptions) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")?;
        conn.busy_timeout(options.busy_timeout)?;

        let db = Self {
            conn,
            options,
            deadline: Cell::new(None),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join("camp").join("camp.db"))
    }

    /// Bound every following statement by `deadline`. A statement still
    /// running when it passes is interrupted and its transaction rolls back.
    /// Waiting on another writer's lock is cut short at the deadline too.
    /// `None` lifts the bound.
    pub fn set_deadline(&self, deadline: Option<Instant>) -> rusqlite::Result<()> {
        self.deadline.set(deadline);
        match deadline {
            Some(deadline) => {
                self.conn
                    .progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline))?;
            }
            None => {
                self.conn.progress_handler(0, None::<fn() -> bool>)?;
            }
        }
        self.bound_lock_wait()
    }

    /// Cap the busy timeout at whatever is left before the deadline. The
    /// progress handler does not run while SQLite sleeps on a locked
    /// database, so the wait has to be shortened separately.
    pub(crate) fn bound_lock_wait(&self) -> rusqlite::Result<()> {
        let wait = match self.deadline.get() {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                // Round up so the wait never ends just short of the deadline
                self.options
                    .busy_timeout
                    .min(left + Duration::from_millis(1))
            }
            None => self.options.busy_timeout,
        };
        self.conn.busy_timeout(wait)
    }

    pub(crate) fn check_deadline(&self) -> Result<(), StoreError> {
        match self.deadline.get() {
            Some(deadline) if Instant::now() >= deadline => {
                Err(StoreError::Storage(error::deadline_exceeded()))
            }
            _ => Ok(()),
        }
    }

    /// Fold the WAL back into the main database file.
    pub fn checkpoint(&self) -> anyhow::Result<()> {
        // Returns (busy, log frames, checkpointed frames); only failure matters.
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    /// Bring the schema up to `SCHEMA_VERSION`. Pending steps and the new
    /// version number commit together.
    fn migrate(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(schema::VERSION_TABLE)?;

        let current = self.schema_version()?;
        let pending = &schema::MIGRATIONS[current.clamp(0, SCHEMA_VERSION) as usize..];
        if pending.is_empty() {
            return Ok(());
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        // Another process may have migrated while we waited for the lock
        if self.schema_version()? < SCHEMA_VERSION {
            for step in pending {
                tx.execute_batch(step)?;
            }
            tx.execute(
                "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
                [SCHEMA_VERSION],
            )?;
        }
        tx.commit()
    }

    fn schema_version(&self) -> rusqlite::Result<i32> {
        let version = self
            .conn
            .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(version.unwrap_or(0))
    }
}
