use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::Lazy;
use serde::Serialize;
use uuid::Uuid;

static LOGGER: Lazy<GenerationLogger> = Lazy::new(GenerationLogger::new);

pub fn init() -> Result<(), String> {
    init_with_config(LoggerConfig::default())
}

pub fn init_with_config(config: LoggerConfig) -> Result<(), String> {
    let level = config.min_level;
    LOGGER.configure(config);

    log::set_logger(&*LOGGER).map_err(|e| format!("Failed to set logger: {:?}", e))?;
    log::set_max_level(level);
    Ok(())
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Trace => Color::Cyan,
        Level::Debug => Color::Blue,
        Level::Info => Color::Green,
        Level::Warn => Color::Yellow,
        Level::Error => Color::Red,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl LogEntry {
    fn from_record(record: &Record) -> Self {
        Self {
            timestamp: Utc::now(),
            level: record.level().to_string(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            file: record.file().map(str::to_string),
            line: record.line(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LevelFilter,
    pub show_colors: bool,
    pub show_target: bool,
    pub show_file_location: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_file_path: Option<String>,
    /// Records from other crates (hyper, aws-smithy, ...) below this are dropped.
    pub dependency_level: LevelFilter,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LevelFilter::Info,
            show_colors: true,
            show_target: true,
            show_file_location: false,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            log_file_path: None,
            dependency_level: LevelFilter::Warn,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_file_output(mut self, path: &str) -> Self {
        self.log_file_path = Some(path.to_string());
        self
    }

    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.output_json = enabled;
        self
    }

    pub fn production() -> Self {
        Self {
            min_level: LevelFilter::Info,
            show_colors: false,
            output_json: true,
            log_file_path: Some("rgenflow.log".to_string()),
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LevelFilter::Debug,
            show_file_location: true,
            ..Default::default()
        }
    }

    /// `RGENFLOW_LOG=production` selects JSON output; `RUST_LOG` overrides the level.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("RGENFLOW_LOG").ok().as_deref() {
            Some("production") => Self::production(),
            _ => Self::development(),
        };
        if let Some(level) = std::env::var("RUST_LOG").ok().and_then(|l| l.parse().ok()) {
            config.min_level = level;
        }
        config
    }
}

pub struct GenerationLogger {
    config: Mutex<LoggerConfig>,
    file: Mutex<Option<File>>,
}

impl GenerationLogger {
    fn new() -> Self {
        Self {
            config: Mutex::new(LoggerConfig::default()),
            file: Mutex::new(None),
        }
    }

    fn configure(&self, config: LoggerConfig) {
        if let Some(path) = &config.log_file_path {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    if let Ok(mut slot) = self.file.lock() {
                        *slot = Some(file);
                    }
                }
                Err(e) => eprintln!("Failed to open log file {}: {}", path, e),
            }
        }
        if let Ok(mut current) = self.config.lock() {
            *current = config;
        }
    }

    fn format_console(&self, entry: &LogEntry, level: Level, config: &LoggerConfig) -> String {
        let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
        let level_str = format!("{:<5}", entry.level);
        let mut line = if config.show_colors {
            format!(
                "{} [{}] ",
                timestamp.bright_black(),
                level_str.color(level_color(level)).bold()
            )
        } else {
            format!("{} [{}] ", timestamp, level_str)
        };

        if config.show_target {
            if config.show_colors {
                line.push_str(&format!("{}: ", entry.target.bright_blue()));
            } else {
                line.push_str(&format!("{}: ", entry.target));
            }
        }
        line.push_str(&entry.message);

        if config.show_file_location {
            if let (Some(file), Some(no)) = (&entry.file, entry.line) {
                let location = format!(" ({}:{})", file, no);
                if config.show_colors {
                    line.push_str(&location.bright_black().to_string());
                } else {
                    line.push_str(&location);
                }
            }
        }
        line
    }
}

impl log::Log for GenerationLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let Ok(config) = self.config.lock() else {
            return true;
        };
        let limit = if metadata.target().starts_with(env!("CARGO_PKG_NAME")) {
            config.min_level
        } else {
            config.dependency_level.min(config.min_level)
        };
        metadata.level() <= limit
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::from_record(record);
        let Ok(config) = self.config.lock() else {
            return;
        };

        let line = if config.output_json {
            serde_json::to_string(&entry).unwrap_or_default()
        } else {
            self.format_console(&entry, record.level(), &config)
        };
        if record.level() <= Level::Warn {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }

        if let Ok(mut file) = self.file.lock() {
            if let Some(file) = file.as_mut() {
                let plain = if config.output_json {
                    line
                } else {
                    self.format_console(&entry, record.level(), &LoggerConfig {
                        show_colors: false,
                        ..config.clone()
                    })
                };
                let _ = writeln!(file, "{}", plain);
            }
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        if let Ok(mut file) = self.file.lock() {
            if let Some(file) = file.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Tracks one request through its stages, tagging every line with a
/// short request id and the time since the request started.
pub struct RequestTimer {
    id: String,
    operation: &'static str,
    started: Instant,
}

impl RequestTimer {
    pub fn new(operation: &'static str) -> Self {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            id,
            operation,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn stage(&self, state: impl Display) {
        log::info!(
            "[req:{}] {} -> {} (+{}ms)",
            self.id,
            self.operation,
            state,
            self.elapsed().as_millis()
        );
    }

    pub fn stage_with(&self, state: impl Display, detail: &str) {
        log::info!(
            "[req:{}] {} -> {}: {} (+{}ms)",
            self.id,
            self.operation,
            state,
            detail,
            self.elapsed().as_millis()
        );
    }

    pub fn finish(&self, state: impl Display, detail: &str) {
        log::info!(
            "[req:{}] {} -> {}: {} in {}ms",
            self.id,
            self.operation,
            state,
            detail,
            self.elapsed().as_millis()
        );
    }

    pub fn fail(&self, state: impl Display, err: &dyn Display) {
        log::warn!(
            "[req:{}] {} -> {}: {} after {}ms",
            self.id,
            self.operation,
            state,
            err,
            self.elapsed().as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let dev = LoggerConfig::development();
        assert_eq!(dev.min_level, LevelFilter::Debug);
        assert!(dev.show_colors);

        let prod = LoggerConfig::production();
        assert!(!prod.show_colors);
        assert!(prod.output_json);
        assert!(prod.log_file_path.is_some());
    }

    #[test]
    fn plain_console_line() {
        let logger = GenerationLogger::new();
        let config = LoggerConfig::new().with_colors(false);
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: "INFO".into(),
            target: "rgenflow::pipeline".into(),
            message: "Deleted empty set".into(),
            file: None,
            line: None,
        };
        let line = logger.format_console(&entry, Level::Info, &config);
        assert!(line.contains("[INFO ] rgenflow::pipeline: Deleted empty set"));
    }

    #[test]
    fn request_ids_are_short_and_distinct() {
        let a = RequestTimer::new("generate");
        let b = RequestTimer::new("generate");
        assert_eq!(a.id().len(), 8);
        assert_ne!(a.id(), b.id());
    }
}
