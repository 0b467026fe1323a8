use std::env;
use std::fmt;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub sweep: SweepConfig,
    pub capacity: CapacityConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let interval_secs = env::var("APP_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidSweepInterval)?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidSweepInterval);
        }

        let warning_hours = env::var("APP_DEADLINE_WARNING_HOURS")
            .unwrap_or_else(|_| "48".to_string())
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidWarningWindow)?;
        if warning_hours <= 0 {
            return Err(ConfigError::InvalidWarningWindow);
        }

        let default_yield_rate = env::var("APP_DEFAULT_YIELD_RATE")
            .unwrap_or_else(|_| "0.6".to_string())
            .parse::<f32>()
            .map_err(|_| ConfigError::InvalidYieldRate)?;
        if !(0.0..=1.0).contains(&default_yield_rate) {
            return Err(ConfigError::InvalidYieldRate);
        }

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            sweep: SweepConfig {
                interval: Duration::from_secs(interval_secs),
                warning_window: chrono::Duration::hours(warning_hours),
            },
            capacity: CapacityConfig { default_yield_rate },
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Settings for the periodic deadline sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    pub warning_window: chrono::Duration,
}

/// Defaults used by capacity projections when no history is loaded.
#[derive(Debug, Clone)]
pub struct CapacityConfig {
    pub default_yield_rate: f32,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidSweepInterval,
    InvalidWarningWindow,
    InvalidYieldRate,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidSweepInterval => {
                write!(f, "APP_SWEEP_INTERVAL_SECS must be a positive whole number")
            }
            ConfigError::InvalidWarningWindow => {
                write!(f, "APP_DEADLINE_WARNING_HOURS must be a positive whole number")
            }
            ConfigError::InvalidYieldRate => {
                write!(f, "APP_DEFAULT_YIELD_RATE must be a fraction between 0 and 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("APP_SWEEP_INTERVAL_SECS");
        env::remove_var("APP_DEADLINE_WARNING_HOURS");
        env::remove_var("APP_DEFAULT_YIELD_RATE");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.sweep.interval, Duration::from_secs(300));
        assert_eq!(config.sweep.warning_window, chrono::Duration::hours(48));
        assert_eq!(config.capacity.default_yield_rate, 0.6);
    }

    #[test]
    fn load_reads_overrides_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_SWEEP_INTERVAL_SECS", "60");
        env::set_var("APP_DEADLINE_WARNING_HOURS", "12");
        env::set_var("APP_DEFAULT_YIELD_RATE", "0.45");
        let config = AppConfig::load().expect("config loads");
        reset_env();
        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(config.sweep.interval, Duration::from_secs(60));
        assert_eq!(config.sweep.warning_window, chrono::Duration::hours(12));
        assert_eq!(config.capacity.default_yield_rate, 0.45);
    }

    #[test]
    fn load_rejects_zero_sweep_interval() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_SWEEP_INTERVAL_SECS", "0");
        let result = AppConfig::load();
        reset_env();
        match result {
            Err(ConfigError::InvalidSweepInterval) => {}
            other => panic!("expected invalid sweep interval, got {other:?}"),
        }
    }

    #[test]
    fn load_rejects_out_of_range_yield_rate() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_DEFAULT_YIELD_RATE", "1.5");
        let result = AppConfig::load();
        reset_env();
        match result {
            Err(ConfigError::InvalidYieldRate) => {}
            other => panic!("expected invalid yield rate, got {other:?}"),
        }
    }
}
