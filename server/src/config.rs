//! Server configuration.
//!
//! Everything the core needs at startup is carried by [`ServerConfig`];
//! the binary fills it from command-line arguments.

use shared::{ItemId, Vec3};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value}")]
    InvalidPeriod { name: &'static str, value: f64 },

    #[error("{0} must not be zero")]
    ZeroPeriod(&'static str),

    #[error("{0} must not exceed one day")]
    PeriodTooLong(&'static str),

    #[error("max players must be at least 1")]
    NoCapacity,

    #[error("peer queue capacity must be at least 1")]
    NoQueueCapacity,

    #[error("spawn radius must be finite and non-negative, got {0}")]
    InvalidSpawnRadius(f32),
}

/// Longest accepted period. Deadlines are computed as `Instant::now() + period`.
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Converts a seconds value from the command line into a [`Duration`].
pub fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidPeriod { name, value });
    }
    match Duration::try_from_secs_f64(value) {
        Ok(period) if period <= MAX_PERIOD => Ok(period),
        _ => Err(ConfigError::PeriodTooLong(name)),
    }
}

/// Survival decay and damage tuning. Rates are per second.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsConfig {
    pub hunger_decay: f32,
    pub thirst_decay: f32,
    pub ambient_temperature: f32,
    pub temperature_drift: f32,
    /// Hunger or thirst below this starts hurting.
    pub critical_threshold: f32,
    pub starvation_damage: f32,
    pub cold_threshold: f32,
    pub heat_threshold: f32,
    pub exposure_damage: f32,
    /// Hunger and thirst at or above this let health regenerate.
    pub well_fed_threshold: f32,
    pub regeneration: f32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            hunger_decay: 0.1,
            thirst_decay: 0.15,
            ambient_temperature: 20.0,
            temperature_drift: 0.5,
            critical_threshold: 10.0,
            starvation_damage: 1.0,
            cold_threshold: 0.0,
            heat_threshold: 40.0,
            exposure_damage: 0.5,
            well_fed_threshold: 50.0,
            regeneration: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to listen on.
    pub bind_addr: String,
    pub stats_update_rate: Duration,
    pub stats_sync_rate: Duration,
    pub heartbeat_timeout: Duration,
    pub monitor_interval: Duration,
    pub max_players: usize,
    pub spawn_point: Vec3,
    /// Players spawn uniformly within this distance of `spawn_point` (x/z).
    pub spawn_radius: f32,
    /// Items granted to every new player, in slot order.
    pub starting_items: Vec<(ItemId, u32)>,
    /// Guaranteed-ordered frames a peer may have queued before it is
    /// considered stalled, on top of one PlayerSpawn per possible player.
    pub peer_queue_capacity: usize,
    pub stats: StatsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7777".to_string(),
            stats_update_rate: Duration::from_secs(1),
            stats_sync_rate: Duration::from_secs(2),
            heartbeat_timeout: Duration::from_secs(10),
            monitor_interval: Duration::from_secs(5),
            max_players: 64,
            spawn_point: Vec3::new(0.0, 1.0, 0.0),
            spawn_radius: 5.0,
            starting_items: vec![(1, 3), (4, 2), (6, 1)],
            peer_queue_capacity: 256,
            stats: StatsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("stats update rate", self.stats_update_rate),
            ("stats sync rate", self.stats_sync_rate),
            ("heartbeat timeout", self.heartbeat_timeout),
            ("monitor interval", self.monitor_interval),
        ];
        for (name, period) in periods {
            if period.is_zero() {
                return Err(ConfigError::ZeroPeriod(name));
            }
            if period > MAX_PERIOD {
                return Err(ConfigError::PeriodTooLong(name));
            }
        }

        if self.max_players == 0 {
            return Err(ConfigError::NoCapacity);
        }
        if self.peer_queue_capacity == 0 {
            return Err(ConfigError::NoQueueCapacity);
        }
        if !self.spawn_radius.is_finite() || self.spawn_radius < 0.0 {
            return Err(ConfigError::InvalidSpawnRadius(self.spawn_radius));
        }
        Ok(())
    }

    /// Size of each peer's outbound queue. A joining player is sent the
    /// PlayerSpawn of everyone online in one burst, so the queue always has
    /// room for a full server.
    pub fn outbound_capacity(&self) -> usize {
        self.peer_queue_capacity.saturating_add(self.max_players)
    }
}
