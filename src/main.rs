use log::{error, info, warn};
use rdp_ingest::config::Config;
use rdp_ingest::env_file::configure_env_from_args;
use rdp_ingest::{CharDevice, Reader, ValueStore};
use std::sync::Arc;

fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (database={}, device={}, interval={}ms, progress_every={}, reader_enabled={}, seed_demo_devices={})",
        cfg.database_url,
        cfg.device_path.display(),
        cfg.read_interval.as_millis(),
        cfg.progress_every,
        cfg.reader_enabled,
        cfg.seed_demo_devices
    );

    // 2) Open store; applies pending migrations
    let store = Arc::new(ValueStore::open(&cfg.database_url).map_err(|e| e.to_string())?);
    info!("Connected to database");

    if !cfg.reader_enabled {
        info!("Reader disabled via READER_ENABLED={}", cfg.reader_enabled);
        return Ok(());
    }

    // 3) Acquisition runs until the device replays a known record
    let device = Arc::new(CharDevice::new(cfg.device_path.clone()));
    let mut reader = Reader::new(Arc::clone(&store), device, cfg.reader_settings());
    reader.start().map_err(|e| e.to_string())?;
    if let Some(summary) = reader.wait() {
        info!(
            "Reader finished ({:?}): {} value(s) stored, {} iteration(s) skipped",
            summary.exit, summary.inserted, summary.skipped
        );
    }

    match store.count_values() {
        Ok(total) => info!("Database now holds {} value(s)", total),
        Err(e) => warn!("Counting stored values failed: {}", e),
    }
    Ok(())
}

fn main() {
    let loaded_env = match configure_env_from_args(std::env::args_os().skip(1)) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "rdp-ingest {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
