//! `camp serve`: run the contact HTTP API until interrupted.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

mod server;
pub mod types;

pub use server::ContactServer;

use crate::config::AppConfig;
use crate::shutdown::{CheckpointHook, Shutdown};

/// Start the server and block until Ctrl+C / SIGTERM, then run the
/// registered shutdown hooks.
pub fn run_serve(config: &AppConfig) -> Result<()> {
    let server = ContactServer::bind(("0.0.0.0", config.http_port), config)?;

    let mut shutdown = Shutdown::new(config.shutdown_timeout);
    shutdown.register(CheckpointHook::new(
        config.db_path.clone(),
        config.store.clone(),
    ));

    let stop = Arc::new(AtomicBool::new(false));
    ctrlc_handler(stop.clone());

    info!(
        port = config.http_port,
        db = %config.db_path.display(),
        empty_tags = config.store.empty_tags.as_str(),
        "starting contact server"
    );

    let served = server.start(stop);

    info!(hooks = shutdown.len(), "running shutdown hooks");
    let cleaned = shutdown.run();

    served?;
    cleaned?;
    info!("server stopped gracefully");
    Ok(())
}

fn ctrlc_handler(stop: Arc<AtomicBool>) {
    let _ = ctrlc::set_handler(move || {
        info!("shutdown signal received");
        stop.store(true, Ordering::SeqCst);
    });
}
