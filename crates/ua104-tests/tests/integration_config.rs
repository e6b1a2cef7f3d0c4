// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Loading gateway files in every supported format, validation failures,
//! placeholders and environment overrides.
//!
//! ## Test Categories
//!
//! - `test_load_*`: Files and formats
//! - `test_validation_*`: Rejected configurations
//! - `test_env_*`: Placeholders and overrides

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ua104_config::{
    ConfigError, ConfigFormat, ConfigLoader, FileServerStore, GatewayConfig, LogFormat, LogLevel,
    SinkKind,
};
use ua104_core::types::{ConnectionState, MappingId, ServerId};
use ua104_iec104::PointType;
use ua104_opcua::{ServerStore, SecurityMode};
use ua104_tests::prelude::*;

const GATEWAY_YAML: &str = r#"
gateway:
  name: substation-7
bridge:
  operation_timeout_ms: 2000
servers:
  - server_id: plant
    endpoint: opc.tcp://plant.local:4840
    auto_connect: true
  - server_id: backup
    endpoint: opc.tcp://backup.local:4840
mappings:
  - id: 1
    server_id: plant
    node_id: ns=2;s=Breaker
    target_address: 10
  - id: 2
    server_id: plant
    node_id: ns=2;s=Level
    target_address: 20
    sampling_interval_ms: 250
station:
  name: rtu
  port: 2404
  common_address: 3
  points:
    - io_address: 10
      point_type: M_SP_NA_1
    - io_address: 20
      point_type: M_ME_NC_1
reconnect:
  interval_secs: 15
logging:
  level: debug
  format: json
"#;

fn isolated() -> ConfigLoader {
    ConfigLoader::new().with_env_source(HashMap::new())
}

fn env(pairs: &[(&str, &str)]) -> ConfigLoader {
    ConfigLoader::new().with_env_source(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_yaml_file() {
    let dir = temp_test_dir("ua104-config");
    let path = write(dir.path(), "gateway.yaml", GATEWAY_YAML);

    let config = isolated().load(&path).unwrap();
    assert_eq!(config.gateway.name, "substation-7");
    assert_eq!(config.bridge.operation_timeout_ms, 2000);
    assert_eq!(config.servers.len(), 2);
    assert_eq!(config.servers[0].security_mode, SecurityMode::None);
    assert_eq!(config.auto_connect_servers().count(), 1);
    assert_eq!(config.mappings.len(), 2);

    let level = config.mappings.get(MappingId::new(2)).unwrap();
    assert_eq!(level.sampling_interval_ms, 250);
    assert!(level.active);

    let station = config.station.as_ref().unwrap();
    assert_eq!(station.common_address, 3);
    assert_eq!(station.points[1].point_type, PointType::ShortFloat);

    assert_eq!(config.sink.kind, SinkKind::Station);
    assert_eq!(config.reconnect.interval_secs, 15);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.unmapped_targets().is_empty());
}

#[test]
fn test_load_toml_and_json_files() {
    let dir = temp_test_dir("ua104-config");
    let toml = write(
        dir.path(),
        "gateway.toml",
        r#"
[sink]
kind = "log"

[[servers]]
server_id = "plant"
endpoint = "opc.tcp://plant.local:4840"

[[mappings]]
id = 1
server_id = "plant"
node_id = "ns=2;s=Level"
target_address = 20
"#,
    );
    let json = write(
        dir.path(),
        "gateway.json",
        r#"{
  "servers": [{ "server_id": "plant", "endpoint": "opc.tcp://plant.local:4840" }],
  "sink": { "kind": "http", "url": "http://collector.local/updates" }
}"#,
    );

    let from_toml = isolated().load(&toml).unwrap();
    assert_eq!(from_toml.sink.kind, SinkKind::Log);
    assert_eq!(from_toml.mappings.len(), 1);
    assert!(from_toml.station.is_none());

    let from_json = isolated().load(&json).unwrap();
    assert_eq!(from_json.sink.kind, SinkKind::Http);
    assert_eq!(from_json.sink.url, "http://collector.local/updates");
    assert!(from_json.mappings.is_empty());
}

#[test]
fn test_load_missing_and_unsupported_files() {
    let dir = temp_test_dir("ua104-config");

    let missing = isolated().load(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(missing, ConfigError::FileNotFound { .. }));

    let ini = write(dir.path(), "gateway.ini", "name = x");
    let unsupported = isolated().load(&ini).unwrap_err();
    assert!(matches!(unsupported, ConfigError::UnsupportedFormat { .. }));
}

#[test]
fn test_load_parse_error_names_file() {
    let dir = temp_test_dir("ua104-config");
    let path = write(dir.path(), "broken.yaml", "servers: [\n");

    let err = isolated().load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("broken.yaml"));
}

#[test]
fn test_load_resolves_relative_paths() {
    let dir = temp_test_dir("ua104-config");
    let path = write(
        dir.path(),
        "gateway.yaml",
        r#"
sink:
  kind: log
servers:
  - server_id: plant
    endpoint: opc.tcp://plant.local:4840
    certificate_path: pki/client.der
    private_key_path: /etc/ua104/client.pem
logging:
  file: logs/gateway.log
"#,
    );

    let config = isolated().load(&path).unwrap();
    let server = &config.servers[0];
    assert_eq!(
        server.certificate_path.as_deref().map(Path::new),
        Some(dir.path().join("pki/client.der").as_path())
    );
    assert_eq!(server.private_key_path.as_deref(), Some("/etc/ua104/client.pem"));
    assert_eq!(config.logging.file, Some(dir.path().join("logs/gateway.log")));
}

// =============================================================================
// Validation
// =============================================================================

fn rejected(content: &str) -> ConfigError {
    isolated()
        .load_from_str(content, ConfigFormat::Yaml)
        .expect_err("configuration should be rejected")
}

#[test]
fn test_validation_duplicate_server() {
    let err = rejected(
        r#"
sink: { kind: log }
servers:
  - { server_id: plant, endpoint: "opc.tcp://a:4840" }
  - { server_id: plant, endpoint: "opc.tcp://b:4840" }
"#,
    );
    assert!(matches!(err, ConfigError::DuplicateServerId { .. }));
}

#[test]
fn test_validation_bad_endpoint() {
    let err = rejected(
        r#"
sink: { kind: log }
servers:
  - { server_id: plant, endpoint: "http://plant:4840" }
"#,
    );
    assert!(matches!(err, ConfigError::Server { .. }));
}

#[test]
fn test_validation_mapping_rules() {
    let unknown_server = rejected(
        r#"
sink: { kind: log }
servers:
  - { server_id: plant, endpoint: "opc.tcp://a:4840" }
mappings:
  - { id: 1, server_id: other, node_id: "ns=2;s=A", target_address: 1 }
"#,
    );
    assert!(matches!(unknown_server, ConfigError::UnknownServer { mapping_id: 1, .. }));

    let duplicate_address = rejected(
        r#"
sink: { kind: log }
servers:
  - { server_id: plant, endpoint: "opc.tcp://a:4840" }
mappings:
  - { id: 1, server_id: plant, node_id: "ns=2;s=A", target_address: 5 }
  - { id: 2, server_id: plant, node_id: "ns=2;s=B", target_address: 5 }
"#,
    );
    assert!(matches!(duplicate_address, ConfigError::Mapping(_)));
    assert!(duplicate_address.to_string().contains("IOA 5"));
}

#[test]
fn test_validation_sink_rules() {
    let err = rejected("servers: []\n");
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "sink.kind"));

    let err = rejected("sink: { kind: http, url: \"ftp://collector\" }\n");
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "sink.url"));
}

#[test]
fn test_validation_station_rules() {
    let err = rejected(
        r#"
station:
  points:
    - { io_address: 10, point_type: M_SP_NA_1 }
    - { io_address: 10, point_type: M_ME_NB_1 }
"#,
    );
    assert!(matches!(err, ConfigError::Station(_)));
}

#[test]
fn test_validation_unknown_field() {
    let err = rejected("sink: { kind: log }\nstations: []\n");
    assert!(matches!(err, ConfigError::Serialization { .. }));
}

#[test]
fn test_unmapped_target_is_only_a_warning() {
    let config = isolated()
        .load_from_str(
            r#"
servers:
  - { server_id: plant, endpoint: "opc.tcp://a:4840" }
mappings:
  - { id: 7, server_id: plant, node_id: "ns=2;s=A", target_address: 99 }
station:
  points:
    - { io_address: 10, point_type: M_SP_NA_1 }
"#,
            ConfigFormat::Yaml,
        )
        .unwrap();
    assert_eq!(config.unmapped_targets(), vec![MappingId::new(7)]);
}

// =============================================================================
// Environment
// =============================================================================

#[test]
fn test_env_placeholders() {
    let content = r#"
sink: { kind: log }
servers:
  - server_id: plant
    endpoint: "opc.tcp://${PLANT_HOST}:${PLANT_PORT:-4840}"
"#;

    let config = env(&[("PLANT_HOST", "10.0.0.5")])
        .load_from_str(content, ConfigFormat::Yaml)
        .unwrap();
    assert_eq!(config.servers[0].endpoint, "opc.tcp://10.0.0.5:4840");

    let err = isolated().load_from_str(content, ConfigFormat::Yaml).unwrap_err();
    assert!(matches!(err, ConfigError::EnvVarNotFound { ref name } if name == "PLANT_HOST"));

    let verbatim = isolated()
        .resolve_env_placeholders("keep ${UNTERMINATED")
        .unwrap();
    assert_eq!(verbatim, "keep ${UNTERMINATED");
}

#[test]
fn test_env_overrides() {
    let loader = env(&[
        ("UA104_LOG_LEVEL", "warn"),
        ("UA104_LOG_FORMAT", "compact"),
        ("UA104_STATION_PORT", "2505"),
        ("UA104_RECONNECT_ENABLED", "off"),
    ]);
    let config = loader.load_from_str(GATEWAY_YAML, ConfigFormat::Yaml).unwrap();

    assert_eq!(config.logging.level, LogLevel::Warn);
    assert_eq!(config.logging.format, LogFormat::Compact);
    assert_eq!(config.station.as_ref().unwrap().port, 2505);
    assert!(!config.reconnect.enabled);

    let err = env(&[("UA104_STATION_PORT", "http")])
        .load_from_str(GATEWAY_YAML, ConfigFormat::Yaml)
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));

    let custom = ConfigLoader::new()
        .with_env_prefix("GW")
        .with_env_source([("GW_LOG_LEVEL".to_string(), "error".to_string())].into())
        .load_from_str(GATEWAY_YAML, ConfigFormat::Yaml)
        .unwrap();
    assert_eq!(custom.logging.level, LogLevel::Error);
}

// =============================================================================
// Server store
// =============================================================================

#[test]
fn test_file_store_tracks_status() {
    let config: GatewayConfig = isolated().load_from_str(GATEWAY_YAML, ConfigFormat::Yaml).unwrap();
    let store = FileServerStore::new(config.servers.clone());
    let plant = ServerId::new(PLANT);
    let backup = ServerId::new(BACKUP);

    let due: Vec<ServerId> = store
        .servers_to_connect()
        .into_iter()
        .map(|s| s.server_id)
        .collect();
    assert_eq!(due, vec![plant.clone()]);

    store.set_status(&backup, ConnectionState::Connected);
    assert_eq!(store.status(&backup), ConnectionState::Connected);
    assert_eq!(store.servers_to_connect().len(), 2);
    assert_eq!(store.status(&ServerId::new("nobody")), ConnectionState::Disconnected);
}
