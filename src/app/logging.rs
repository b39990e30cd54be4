use std::sync::{Arc, Mutex, RwLock};

use chrono::Local;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Destination for user-visible activity lines. Implementations must be callable from any
/// worker thread; they only ever append.
pub trait LogSink: Send + Sync {
    fn append(&self, line: &str);
}

pub fn format_log_line(message: &str) -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{now}] {message}")
}

/// Cloneable handle every component reports progress through.
///
/// The sink is attached once the front-end is ready and detached at shutdown. While no sink
/// is attached, messages still reach `tracing` but are not shown anywhere.
#[derive(Clone, Default)]
pub struct ActivityLog {
    sink: Arc<RwLock<Option<Arc<dyn LogSink>>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached(sink: Arc<dyn LogSink>) -> Self {
        let log = Self::new();
        log.attach(sink);
        log
    }

    pub fn attach(&self, sink: Arc<dyn LogSink>) {
        if let Ok(mut guard) = self.sink.write() {
            *guard = Some(sink);
        }
    }

    pub fn detach(&self) {
        if let Ok(mut guard) = self.sink.write() {
            guard.take();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sink.read().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(activity = %message, "activity");
        let sink = match self.sink.read() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        if let Some(sink) = sink {
            sink.append(&format_log_line(message));
        }
    }
}

pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn append(&self, line: &str) {
        println!("{line}");
    }
}

/// Keeps every line in memory, in append order.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Lines with the `[timestamp] ` prefix removed.
    pub fn messages(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .map(|line| match line.split_once("] ") {
                Some((_, message)) => message.to_string(),
                None => line,
            })
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn append(&self, line: &str) {
        if let Ok(mut guard) = self.lines.lock() {
            guard.push(line.to_string());
        }
    }
}
