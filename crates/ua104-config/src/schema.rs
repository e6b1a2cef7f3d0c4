// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for the gateway.
//!
//! # Schema Structure
//!
//! ```text
//! GatewayConfig
//! ├── gateway: GatewayInfo
//! ├── bridge: BridgeSection
//! ├── servers: Vec<ServerConfig>
//! ├── mappings: MappingSet
//! ├── station: Option<StationConfig>
//! ├── sink: SinkConfig
//! ├── reconnect: ReconnectConfig
//! └── logging: LoggingConfig
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ua104_core::bridge::BridgeConfig;
use ua104_core::mapping::MappingSet;
use ua104_core::types::{MappingId, ServerId};
use ua104_iec104::StationConfig;
use ua104_opcua::ServerConfig;

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default timeout of one bridge operation in milliseconds.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

/// Default bridge stop timeout in milliseconds.
pub const DEFAULT_BRIDGE_STOP_TIMEOUT_MS: u64 = 5_000;

/// Default push endpoint of the HTTP sink.
pub const DEFAULT_SINK_URL: &str = "http://localhost:5001/api/v1/datapoint-value";

/// Default HTTP sink request timeout in milliseconds.
pub const DEFAULT_SINK_TIMEOUT_MS: u64 = 10_000;

/// Default reconnect sweep interval in seconds.
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 30;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration of a gateway instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway identification.
    #[serde(default)]
    pub gateway: GatewayInfo,

    /// Bridge timeouts.
    #[serde(default)]
    pub bridge: BridgeSection,

    /// OPC UA servers.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    /// Node to point bindings.
    #[serde(default)]
    pub mappings: MappingSet,

    /// The IEC 104 station, absent when values go elsewhere.
    #[serde(default)]
    pub station: Option<StationConfig>,

    /// Where value updates are delivered.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Periodic reconnect sweep.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Validates the entire configuration.
    ///
    /// Checks, in order: unique server ids and per-server settings, the
    /// mapping table invariants, that every mapping names a configured
    /// server, the station section, then the remaining sections.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut server_ids = HashSet::new();
        for server in &self.servers {
            if !server_ids.insert(&server.server_id) {
                return Err(ConfigError::DuplicateServerId {
                    server_id: server.server_id.clone(),
                });
            }
            server.validate().map_err(|source| ConfigError::Server {
                server_id: server.server_id.clone(),
                source,
            })?;
        }

        self.mappings.validate()?;
        for mapping in &self.mappings {
            if !server_ids.contains(&mapping.server_id) {
                return Err(ConfigError::UnknownServer {
                    mapping_id: mapping.id.get(),
                    server_id: mapping.server_id.clone(),
                });
            }
        }

        if let Some(station) = &self.station {
            station.validate().map_err(ConfigError::Station)?;
        }

        self.bridge.validate()?;
        self.sink.validate(self.station.is_some())?;
        self.reconnect.validate()?;

        Ok(())
    }

    /// Returns a server configuration by id.
    pub fn server(&self, server_id: &ServerId) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| &s.server_id == server_id)
    }

    /// Servers marked for automatic connection.
    pub fn auto_connect_servers(&self) -> impl Iterator<Item = &ServerConfig> {
        self.servers.iter().filter(|s| s.auto_connect)
    }

    /// Mappings whose target IOA is not a point of the station.
    ///
    /// Empty when no station is configured. Updates for these mappings are
    /// rejected by the station at runtime.
    pub fn unmapped_targets(&self) -> Vec<MappingId> {
        let Some(station) = &self.station else {
            return Vec::new();
        };
        let points: HashSet<_> = station.points.iter().map(|p| p.io_address).collect();
        self.mappings
            .iter()
            .filter(|m| !points.contains(&m.target_address))
            .map(|m| m.id)
            .collect()
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Gateway identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayInfo {
    /// Human-readable gateway name.
    #[serde(default = "default_gateway_name")]
    pub name: String,
}

fn default_gateway_name() -> String {
    "ua104 gateway".to_string()
}

impl Default for GatewayInfo {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
        }
    }
}

// =============================================================================
// Bridge
// =============================================================================

/// Timeouts of the async bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSection {
    /// Timeout of one blocking bridge operation.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// How long stopping the bridge waits for its thread.
    #[serde(default = "default_bridge_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_operation_timeout_ms() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_MS
}

fn default_bridge_stop_timeout_ms() -> u64 {
    DEFAULT_BRIDGE_STOP_TIMEOUT_MS
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            stop_timeout_ms: DEFAULT_BRIDGE_STOP_TIMEOUT_MS,
        }
    }
}

impl BridgeSection {
    /// Operation timeout as a duration.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Builds the bridge settings.
    pub fn to_bridge_config(&self) -> BridgeConfig {
        BridgeConfig::default()
            .with_operation_timeout(self.operation_timeout())
            .with_stop_timeout(Duration::from_millis(self.stop_timeout_ms))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::validation("bridge.operation_timeout_ms", "must be positive"));
        }
        if self.stop_timeout_ms == 0 {
            return Err(ConfigError::validation("bridge.stop_timeout_ms", "must be positive"));
        }
        Ok(())
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Destination of value updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Write into the local IEC 104 station.
    #[default]
    Station,
    /// POST each update to an HTTP endpoint.
    Http,
    /// Log each update.
    Log,
}

/// Sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Sink kind.
    #[serde(default)]
    pub kind: SinkKind,

    /// Push endpoint, `http` sinks only.
    #[serde(default = "default_sink_url")]
    pub url: String,

    /// Request timeout, `http` sinks only.
    #[serde(default = "default_sink_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_sink_url() -> String {
    DEFAULT_SINK_URL.to_string()
}

fn default_sink_timeout_ms() -> u64 {
    DEFAULT_SINK_TIMEOUT_MS
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            url: default_sink_url(),
            timeout_ms: DEFAULT_SINK_TIMEOUT_MS,
        }
    }
}

impl SinkConfig {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self, has_station: bool) -> ConfigResult<()> {
        match self.kind {
            SinkKind::Station if !has_station => Err(ConfigError::validation(
                "sink.kind",
                "station sink requires a station section",
            )),
            SinkKind::Http => {
                if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
                    return Err(ConfigError::validation("sink.url", "must be an http(s) URL"));
                }
                if self.timeout_ms == 0 {
                    return Err(ConfigError::validation("sink.timeout_ms", "must be positive"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Reconnect
// =============================================================================

/// Periodic reconnect sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Whether the sweep runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_reconnect_interval_secs")]
    pub interval_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_reconnect_interval_secs() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_SECS
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_RECONNECT_INTERVAL_SECS,
        }
    }
}

impl ReconnectConfig {
    /// Sweep interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.enabled && self.interval_secs == 0 {
            return Err(ConfigError::validation("reconnect.interval_secs", "must be positive"));
        }
        Ok(())
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Log file path (optional).
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, accepting `warning` for `warn`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
    /// Single-line abbreviated format.
    Compact,
}

impl LogFormat {
    /// Parses a format name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ua104_core::mapping::Mapping;
    use ua104_iec104::{PointConfig, PointType};

    fn config() -> GatewayConfig {
        GatewayConfig {
            servers: vec![ServerConfig::new("plant", "opc.tcp://localhost:4840")],
            mappings: MappingSet::new(vec![
                Mapping::new(1, "plant", "ns=2;s=Pump", 10),
                Mapping::new(2, "plant", "ns=2;s=Level", 20),
            ]),
            station: Some(
                StationConfig::new("rtu", "127.0.0.1", 2404)
                    .with_point(PointConfig::new(10, PointType::SinglePoint))
                    .with_point(PointConfig::new(20, PointType::ShortFloat)),
            ),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        config().validate().unwrap();
        assert!(config().unmapped_targets().is_empty());
    }

    #[test]
    fn test_duplicate_server_id() {
        let mut config = config();
        config.servers.push(ServerConfig::new("plant", "opc.tcp://other:4840"));
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateServerId { .. })));
    }

    #[test]
    fn test_mapping_to_unknown_server() {
        let mut config = config();
        config.mappings = MappingSet::new(vec![Mapping::new(1, "ghost", "ns=2;s=Pump", 10)]);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownServer { mapping_id: 1, .. }));
    }

    #[test]
    fn test_mapping_invariants_surface() {
        let mut config = config();
        config.mappings = MappingSet::new(vec![
            Mapping::new(1, "plant", "ns=2;s=Pump", 10),
            Mapping::new(2, "plant", "ns=2;s=Other", 10),
        ]);
        assert!(matches!(config.validate(), Err(ConfigError::Mapping(_))));
    }

    #[test]
    fn test_station_and_sink_rules() {
        let mut config = config();
        config.station = Some(StationConfig::new("rtu", "127.0.0.1", 2404).with_windows(4, 8));
        assert!(matches!(config.validate(), Err(ConfigError::Station(_))));

        config.station = None;
        assert!(config.validate().is_err());
        config.sink.kind = SinkKind::Log;
        config.validate().unwrap();

        config.sink.kind = SinkKind::Http;
        config.sink.url = "ftp://nope".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unmapped_targets() {
        let mut config = config();
        config.mappings = MappingSet::new(vec![Mapping::new(7, "plant", "ns=2;s=Pump", 99)]);
        assert_eq!(config.unmapped_targets(), vec![MappingId::new(7)]);
    }

    #[test]
    fn test_level_and_format_parsing() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogLevel::default().as_str(), "info");
    }

    #[test]
    fn test_bridge_section() {
        let bridge = BridgeSection {
            operation_timeout_ms: 1500,
            stop_timeout_ms: 200,
        };
        let cfg = bridge.to_bridge_config();
        assert_eq!(cfg.operation_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.stop_timeout, Duration::from_millis(200));
    }
}
