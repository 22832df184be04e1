use std::collections::HashMap;
use std::sync::OnceLock;

use once_cell::sync::Lazy;
use tracing::Level;

static LOG_CONFIG: OnceLock<LogConfig> = OnceLock::new();
static DEFAULT_CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::default);

pub fn get_log_config() -> &'static LogConfig {
    LOG_CONFIG.get().unwrap_or(&DEFAULT_CONFIG)
}

fn set_log_config(config: LogConfig) {
    LOG_CONFIG.set(config).ok();
}

/// Scope-filtered log configuration.
///
/// Parsed from an environment variable of the form
/// `warn,grab=debug,traverse=trace`. Scopes used by this crate:
/// `grab`, `launch`, `traverse`, `session`.
#[derive(Debug, Clone)]
pub struct LogConfig {
    global_level: Level,
    scope_levels: HashMap<String, Level>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            global_level: Level::WARN,
            scope_levels: HashMap::new(),
        }
    }

    pub fn from_env(env_var_name: &str) -> Self {
        let mut config = Self::new();

        if let Ok(log_config) = std::env::var(env_var_name) {
            config.parse_config_string(&log_config);
        }

        config
    }

    fn parse_config_string(&mut self, config_str: &str) {
        for part in config_str.split(',') {
            let part = part.trim();

            if let Some((scope, level)) = part.split_once('=') {
                if let Ok(level) = parse_level(level.trim()) {
                    self.scope_levels.insert(scope.trim().to_string(), level);
                }
            } else if let Ok(level) = parse_level(part) {
                self.global_level = level;
            }
        }
    }

    pub fn should_log(&self, scope: &str, level: Level) -> bool {
        let target_level = self.scope_levels.get(scope).unwrap_or(&self.global_level);
        level <= *target_level
    }

    pub fn set_global_level(&mut self, level: Level) {
        self.global_level = level;
    }

    pub fn set_scope_level(&mut self, scope: String, level: Level) {
        self.scope_levels.insert(scope, level);
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_level(level_str: &str) -> Result<Level, ()> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(()),
    }
}

/// Initialize logging with the specified environment variable name, e.g.
/// `init_logging("FUNPARK_LOG")`.
pub fn init_logging(env_var_name: &str) -> LogConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let config = LogConfig::from_env(env_var_name);
    set_log_config(config.clone());
    config
}

/// Scoped logging helper; gates the event on the scope's configured level.
#[macro_export]
macro_rules! scoped_log {
    ($level:ident, $scope:expr, $($arg:tt)*) => {{
        let log_config = $crate::logging::get_log_config();
        if log_config.should_log($scope, $crate::level_of!($level)) {
            tracing::$level!(scope = $scope, $($arg)*);
        }
    }};
}

/// Map a lowercase level ident to a `tracing::Level`.
#[macro_export]
macro_rules! level_of {
    (error) => {
        tracing::Level::ERROR
    };
    (warn) => {
        tracing::Level::WARN
    };
    (info) => {
        tracing::Level::INFO
    };
    (debug) => {
        tracing::Level::DEBUG
    };
    (trace) => {
        tracing::Level::TRACE
    };
}

pub use crate::level_of;
pub use crate::scoped_log;
