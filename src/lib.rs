pub mod app;

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use app::commands::Workbench;
use app::config::{load_config, AppConfig};
use app::console::Console;
use app::logging::{init_logging, ActivityLog, ConsoleSink};

pub fn run() {
    init_logging();
    let trace_id = Uuid::new_v4().to_string();
    let config = match load_config(&trace_id) {
        Ok(config) => config,
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "failed to load config, using defaults");
            AppConfig::default()
        }
    };
    info!(trace_id = %trace_id, version = %config.version, "android debloater starting");

    let log = ActivityLog::attached(Arc::new(ConsoleSink));
    Console::new(Workbench::new(config, log)).run();
}
