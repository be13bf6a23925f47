//! Centralized configuration for Spindrift.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase.

use std::time::Duration;

use crate::alert::AlertCategory;

/// Central configuration for all Spindrift components.
///
/// Groups related settings into logical sections. Supports environment
/// variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SpindriftConfig {
    pub session: SessionConfig,
    pub network: NetworkConfig,
    pub alerts: AlertConfig,
}

/// Engine scheduling configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between periodic stats snapshot alerts
    pub stats_interval: Duration,
    /// Capacity of the engine's command channel
    pub command_queue_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_secs(5),
            command_queue_size: 100,
        }
    }
}

/// Listen socket configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Address the incoming-connection listener binds to
    pub listen_address: &'static str,
    /// Port to accept peer connections on (None = no listener)
    pub listen_port: Option<u16>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0",
            listen_port: None,
        }
    }
}

/// Alert queue configuration.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Maximum buffered alerts before the drop policy engages
    pub queue_capacity: usize,
    /// Categories constructed and delivered
    pub category_mask: AlertCategory,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            // Lifecycle and failures on by default; stats and
            // connection chatter are opt-in.
            category_mask: AlertCategory::critical(),
        }
    }
}

impl SpindriftConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(interval) = std::env::var("SPINDRIFT_STATS_INTERVAL_MS") {
            if let Ok(millis) = interval.parse::<u64>() {
                config.session.stats_interval = Duration::from_millis(millis);
            }
        }

        if let Ok(port) = std::env::var("SPINDRIFT_LISTEN_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.network.listen_port = Some(port);
            }
        }

        if let Ok(capacity) = std::env::var("SPINDRIFT_ALERT_QUEUE_SIZE") {
            if let Ok(capacity) = capacity.parse::<usize>() {
                if capacity > 0 {
                    config.alerts.queue_capacity = capacity;
                }
            }
        }

        if let Ok(mask) = std::env::var("SPINDRIFT_ALERT_MASK") {
            if let Ok(bits) = mask.parse::<u32>() {
                config.alerts.category_mask = AlertCategory::from_bits(bits);
            }
        }

        config
    }

    /// Creates a configuration optimized for testing: every category
    /// subscribed, fast stats ticks, small queue.
    pub fn for_testing() -> Self {
        Self {
            session: SessionConfig {
                stats_interval: Duration::from_millis(50),
                ..Default::default()
            },
            alerts: AlertConfig {
                queue_capacity: 100,
                category_mask: AlertCategory::all(),
            },
            ..Default::default()
        }
    }
}
