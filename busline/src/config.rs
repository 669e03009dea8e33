//! Configuration management for the bus ticketing engine.
//!
//! Loads configuration from environment variables with sensible defaults.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Largest accepted delay penalty, one day
pub const MAX_DELAY_PENALTY_MINUTES: i64 = 24 * 60;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Booking and timing behaviour
    pub booking: BookingConfig,
    /// Live tracking simulation
    pub fleet: FleetConfig,
    /// Logging
    pub logging: LoggingConfig,
}

/// Booking and timing behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Simulated round trip for booking, cancellation and login, in milliseconds
    pub simulated_latency_ms: u64,
    /// Seats allowed in one booking
    pub max_seats_per_booking: usize,
    /// Minutes added to a delayed bus's arrival estimate, `0..=1440`
    pub delay_penalty_minutes: i64,
    /// Offset of local wall-clock time from UTC, in minutes
    pub utc_offset_minutes: i32,
    /// How long a caller waits for a request's outcome, in seconds
    pub request_timeout_secs: u64,
}

/// Live tracking simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Seconds between position ticks
    pub drift_interval_secs: u64,
    /// Largest per-axis drift per tick, in degrees
    pub drift_magnitude_deg: f64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub log_level: String,
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparseable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            booking: BookingConfig {
                simulated_latency_ms: parse_env("BUSLINE_SIMULATED_LATENCY_MS", 1000),
                max_seats_per_booking: parse_env("BUSLINE_MAX_SEATS_PER_BOOKING", 4),
                delay_penalty_minutes: parse_env("BUSLINE_DELAY_PENALTY_MINUTES", 15_i64)
                    .clamp(0, MAX_DELAY_PENALTY_MINUTES),
                utc_offset_minutes: parse_env("BUSLINE_UTC_OFFSET_MINUTES", 0),
                request_timeout_secs: parse_env("BUSLINE_REQUEST_TIMEOUT_SECS", 10),
            },
            fleet: FleetConfig {
                drift_interval_secs: parse_env("BUSLINE_DRIFT_INTERVAL_SECS", 10),
                drift_magnitude_deg: parse_env("BUSLINE_DRIFT_MAGNITUDE_DEG", 0.001),
            },
            logging: LoggingConfig {
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            },
        }
    }

    /// Defaults with no simulated latency, for tests
    #[must_use]
    pub fn for_tests() -> Self {
        let mut config = Self::default();
        config.booking.simulated_latency_ms = 0;
        config
    }

    /// Simulated round trip as a `Duration`
    #[must_use]
    pub const fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.booking.simulated_latency_ms)
    }

    /// Request timeout as a `Duration`
    ///
    /// Never shorter than the simulated latency plus one second, so a slow
    /// latency setting cannot time out every request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        let floor = self.simulated_latency() + Duration::from_secs(1);
        Duration::from_secs(self.booking.request_timeout_secs).max(floor)
    }

    /// Interval between position ticks
    #[must_use]
    pub const fn drift_interval(&self) -> Duration {
        Duration::from_secs(self.fleet.drift_interval_secs)
    }

    /// Delay penalty as a chrono `Duration`, clamped to `0..=1440` minutes
    #[must_use]
    pub fn delay_penalty(&self) -> chrono::Duration {
        let minutes = self.booking.delay_penalty_minutes.clamp(0, MAX_DELAY_PENALTY_MINUTES);
        chrono::Duration::minutes(minutes)
    }

    /// Local timezone offset; out-of-range values fall back to UTC
    #[must_use]
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.booking.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            booking: BookingConfig {
                simulated_latency_ms: 1000,
                max_seats_per_booking: 4,
                delay_penalty_minutes: 15,
                utc_offset_minutes: 0,
                request_timeout_secs: 10,
            },
            fleet: FleetConfig {
                drift_interval_secs: 10,
                drift_magnitude_deg: 0.001,
            },
            logging: LoggingConfig {
                log_level: "info".to_string(),
            },
        }
    }
}
