//! Ordered cleanup on termination.
//!
//! Hooks are registered at startup and run in registration order under a
//! single deadline once the server loop has stopped.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::db::{Database, StoreOptions};

pub trait ShutdownHook {
    fn name(&self) -> &str;

    /// Release whatever this hook owns. Should give up once `deadline` passes.
    fn shutdown(&self, deadline: Instant) -> Result<()>;
}

/// Truncates the WAL so the database file is self-contained after exit.
pub struct CheckpointHook {
    db_path: PathBuf,
    options: StoreOptions,
}

impl CheckpointHook {
    pub fn new(db_path: PathBuf, options: StoreOptions) -> Self {
        Self { db_path, options }
    }
}

impl ShutdownHook for CheckpointHook {
    fn name(&self) -> &str {
        "database checkpoint"
    }

    fn shutdown(&self, deadline: Instant) -> Result<()> {
        let db = Database::open_at(&self.db_path, self.options.clone())?;
        db.set_deadline(Some(deadline))?;
        db.checkpoint()
    }
}

pub struct Shutdown {
    timeout: Duration,
    hooks: Vec<Box<dyn ShutdownHook>>,
}

impl Shutdown {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            hooks: Vec::new(),
        }
    }

    pub fn register(&mut self, hook: impl ShutdownHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in order. Stops at the first failing hook, or before
    /// starting a hook once the deadline has passed.
    pub fn run(&self) -> Result<()> {
        let deadline = Instant::now() + self.timeout;

        for hook in &self.hooks {
            if Instant::now() >= deadline {
                warn!(hook = hook.name(), "shutdown deadline reached");
                bail!("shutdown deadline reached before {}", hook.name());
            }
            hook.shutdown(deadline)
                .with_context(|| format!("shutdown hook '{}' failed", hook.name()))?;
            info!(hook = hook.name(), "shutdown hook finished");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct FnHook<F> {
        name: String,
        f: F,
    }

    impl<F> ShutdownHook for FnHook<F>
    where
        F: Fn(Instant) -> Result<()>,
    {
        fn name(&self) -> &str {
            &self.name
        }

        fn shutdown(&self, deadline: Instant) -> Result<()> {
            (self.f)(deadline)
        }
    }

    fn register_fn<F>(shutdown: &mut Shutdown, name: &str, f: F)
    where
        F: Fn(Instant) -> Result<()> + 'static,
    {
        shutdown.register(FnHook {
            name: name.to_string(),
            f,
        });
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>, name: &str) -> impl Fn(Instant) -> Result<()> {
        let log = log.clone();
        let name = name.to_string();
        move |_| {
            log.borrow_mut().push(name.clone());
            Ok(())
        }
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut shutdown = Shutdown::new(Duration::from_secs(5));
        register_fn(&mut shutdown, "server", recorder(&log, "server"));
        register_fn(&mut shutdown, "database", recorder(&log, "database"));

        assert_eq!(shutdown.len(), 2);
        shutdown.run().unwrap();
        assert_eq!(*log.borrow(), vec!["server", "database"]);
    }

    #[test]
    fn test_failure_stops_remaining_hooks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut shutdown = Shutdown::new(Duration::from_secs(5));
        register_fn(&mut shutdown, "first", |_| Err(anyhow!("boom")));
        register_fn(&mut shutdown, "second", recorder(&log, "second"));

        let err = shutdown.run().unwrap_err();
        assert!(err.to_string().contains("first"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_deadline_skips_late_hooks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut shutdown = Shutdown::new(Duration::from_millis(20));
        register_fn(&mut shutdown, "slow", |_| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(())
        });
        register_fn(&mut shutdown, "late", recorder(&log, "late"));

        assert!(shutdown.run().is_err());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_hook_receives_deadline() {
        let mut shutdown = Shutdown::new(Duration::from_secs(5));
        let start = Instant::now();
        register_fn(&mut shutdown, "check", move |deadline| {
            assert!(deadline > start);
            Ok(())
        });
        shutdown.run().unwrap();
    }

    #[test]
    fn test_checkpoint_hook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camp.db");
        Database::open_at(&path, StoreOptions::default()).unwrap();

        let mut shutdown = Shutdown::new(Duration::from_secs(5));
        shutdown.register(CheckpointHook::new(path, StoreOptions::default()));
        shutdown.run().unwrap();
    }

    #[test]
    fn test_empty_shutdown() {
        let shutdown = Shutdown::new(Duration::from_secs(1));
        assert!(shutdown.is_empty());
        shutdown.run().unwrap();
    }
}
