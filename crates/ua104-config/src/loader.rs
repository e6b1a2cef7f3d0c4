// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading and processing.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` and `${VAR:-default}` placeholders in the raw text
//! 3. Parse YAML, TOML or JSON into [`GatewayConfig`]
//! 4. Apply `UA104_*` environment overrides
//! 5. Resolve relative paths against the config file directory
//! 6. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! UA104_LOG_LEVEL=debug
//! UA104_LOG_FORMAT=json
//! UA104_STATION_PORT=2405
//! UA104_SINK_URL=http://collector:5001/api/v1/datapoint-value
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{GatewayConfig, LogFormat, LogLevel};

/// Default prefix of override variables.
pub const DEFAULT_ENV_PREFIX: &str = "UA104";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader.
///
/// # Examples
///
/// ```no_run
/// use ua104_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("gateway.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Base directory for resolving relative paths.
    base_path: Option<PathBuf>,

    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve placeholders and apply overrides.
    resolve_env_vars: bool,

    /// Whether to resolve relative paths.
    resolve_paths: bool,

    /// Variables used instead of the process environment.
    env_source: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
            resolve_paths: true,
            env_source: None,
        }
    }

    /// Sets the base path for resolving relative paths.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Enables or disables relative path resolution.
    pub fn with_path_resolution(mut self, enabled: bool) -> Self {
        self.resolve_paths = enabled;
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Loads configuration from a file.
    ///
    /// The file format is determined by the file extension:
    /// - `.yaml` or `.yml` - YAML format
    /// - `.toml` - TOML format
    /// - `.json` - JSON format
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let base_path = self.base_path.clone().unwrap_or_else(|| {
            path.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });

        let content = self.read_file(path)?;
        let format = ConfigFormat::from_path(path)?;
        let mut config = self.parse_content(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if self.resolve_paths {
            resolve_relative_paths(&mut config, &base_path);
        }

        self.finish(config)
    }

    /// Loads configuration from a string.
    ///
    /// Relative paths are resolved only when a base path was set.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
        let mut config = self.parse_content(content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if let (true, Some(base)) = (self.resolve_paths, &self.base_path) {
            resolve_relative_paths(&mut config, base);
        }

        self.finish(config)
    }

    fn finish(&self, config: GatewayConfig) -> ConfigResult<GatewayConfig> {
        config.validate()?;

        for mapping_id in config.unmapped_targets() {
            warn!(mapping_id = %mapping_id, "Mapping targets an IOA the station does not define");
        }
        info!(
            servers = config.servers.len(),
            mappings = config.mappings.len(),
            station = config.station.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse_content(&self, content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
        if self.resolve_env_vars {
            let resolved = self.resolve_env_placeholders(content)?;
            parse_str(&resolved, format)
        } else {
            parse_str(content, format)
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env_source {
            Some(vars) => vars.get(name).cloned(),
            None => env::var(name).ok(),
        }
    }

    /// Resolves `${VAR}` and `${VAR:-default}` placeholders.
    ///
    /// An unterminated `${` is copied through unchanged. A variable that is
    /// unset and has no default is an error.
    pub fn resolve_env_placeholders(&self, content: &str) -> ConfigResult<String> {
        let mut result = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find('}') else {
                result.push_str(&rest[start..]);
                return Ok(result);
            };

            let body = &after[..end];
            let (name, default) = match body.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (body, None),
            };

            match (self.var(name), default) {
                (Some(value), _) => result.push_str(&value),
                (None, Some(default)) => {
                    debug!(variable = name, "Using placeholder default");
                    result.push_str(default);
                }
                (None, None) => {
                    return Err(ConfigError::EnvVarNotFound {
                        name: name.to_string(),
                    })
                }
            }
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        Ok(result)
    }

    fn apply_env_overrides(&self, config: &mut GatewayConfig) -> ConfigResult<()> {
        let key = |suffix: &str| format!("{}_{}", self.env_prefix, suffix);

        let name = key("LOG_LEVEL");
        if let Some(value) = self.var(&name) {
            config.logging.level = LogLevel::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(&name, "expected trace|debug|info|warn|error"))?;
        }

        let name = key("LOG_FORMAT");
        if let Some(value) = self.var(&name) {
            config.logging.format = LogFormat::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(&name, "expected text|json|compact"))?;
        }

        let name = key("STATION_PORT");
        if let Some(value) = self.var(&name) {
            let port = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(&name, "expected valid port number"))?;
            match config.station.as_mut() {
                Some(station) => station.port = port,
                None => warn!(variable = %name, "Ignoring override without a station section"),
            }
        }

        let name = key("SINK_URL");
        if let Some(value) = self.var(&name) {
            config.sink.url = value;
        }

        let name = key("RECONNECT_ENABLED");
        if let Some(value) = self.var(&name) {
            config.reconnect.enabled = parse_bool(&value);
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins relative certificate, key and log file paths onto `base_path`.
fn resolve_relative_paths(config: &mut GatewayConfig, base_path: &Path) {
    let join = |value: &mut String| {
        if Path::new(value.as_str()).is_relative() {
            *value = base_path.join(value.as_str()).to_string_lossy().into_owned();
        }
    };

    for server in &mut config.servers {
        if let Some(cert) = server.certificate_path.as_mut() {
            join(cert);
        }
        if let Some(key) = server.private_key_path.as_mut() {
            join(key);
        }
    }

    if let Some(file) = config.logging.file.as_mut() {
        if file.is_relative() {
            *file = base_path.join(&*file);
        }
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SinkKind;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use ua104_iec104::PointType;

    const YAML: &str = r#"
gateway:
  name: substation-7
servers:
  - server_id: plant
    endpoint: "opc.tcp://${PLANT_HOST:-localhost}:4840"
    auto_connect: true
    certificate_path: pki/client.der
    private_key_path: /etc/ua104/client.pem
mappings:
  - id: 1
    server_id: plant
    node_id: "ns=2;s=Breaker"
    target_address: 100
  - id: 2
    server_id: plant
    node_id: "ns=2;s=Level"
    target_address: 200
    sampling_interval_ms: 500
station:
  name: rtu
  ip: 127.0.0.1
  port: 2404
  common_address: 3
  points:
    - io_address: 100
      point_type: M_SP_NA_1
    - io_address: 200
      point_type: M_ME_NC_1
logging:
  level: debug
  file: logs/gateway.log
"#;

    fn loader(vars: &[(&str, &str)]) -> ConfigLoader {
        ConfigLoader::new().with_env_source(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    fn yaml_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml_file() {
        let file = yaml_file(YAML);
        let config = loader(&[]).load(file.path()).unwrap();

        assert_eq!(config.gateway.name, "substation-7");
        assert_eq!(config.servers[0].endpoint, "opc.tcp://localhost:4840");
        assert!(config.servers[0].auto_connect);
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.mappings.as_slice()[1].sampling_interval_ms, 500);

        let station = config.station.as_ref().unwrap();
        assert_eq!(station.common_address, 3);
        assert_eq!(station.points[1].point_type, PointType::ShortFloat);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.sink.kind, SinkKind::Station);
    }

    #[test]
    fn test_relative_paths_resolved_against_file_dir() {
        let file = yaml_file(YAML);
        let dir = file.path().parent().unwrap();
        let config = loader(&[]).load(file.path()).unwrap();

        let server = &config.servers[0];
        assert_eq!(
            server.certificate_path.as_deref(),
            Some(dir.join("pki/client.der").to_string_lossy().as_ref())
        );
        assert_eq!(server.private_key_path.as_deref(), Some("/etc/ua104/client.pem"));
        assert_eq!(config.logging.file, Some(dir.join("logs/gateway.log")));
    }

    #[test]
    fn test_placeholders() {
        let loader = loader(&[("HOST", "plc-1")]);
        assert_eq!(loader.resolve_env_placeholders("a ${HOST} b").unwrap(), "a plc-1 b");
        assert_eq!(loader.resolve_env_placeholders("${PORT:-4840}").unwrap(), "4840");
        assert_eq!(loader.resolve_env_placeholders("${HOST:-x}").unwrap(), "plc-1");
        assert_eq!(loader.resolve_env_placeholders("cost: $5 ${open").unwrap(), "cost: $5 ${open");
        assert!(matches!(
            loader.resolve_env_placeholders("${MISSING}"),
            Err(ConfigError::EnvVarNotFound { name }) if name == "MISSING"
        ));
    }

    #[test]
    fn test_env_overrides() {
        let file = yaml_file(YAML);
        let config = loader(&[
            ("UA104_LOG_LEVEL", "warn"),
            ("UA104_LOG_FORMAT", "json"),
            ("UA104_STATION_PORT", "2405"),
            ("PLANT_HOST", "10.0.0.5"),
        ])
        .load(file.path())
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.station.unwrap().port, 2405);
        assert_eq!(config.servers[0].endpoint, "opc.tcp://10.0.0.5:4840");
    }

    #[test]
    fn test_invalid_override() {
        let file = yaml_file(YAML);
        let err = loader(&[("UA104_STATION_PORT", "70000")]).load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn test_toml_and_json() {
        let toml = r#"
[sink]
kind = "log"

[[servers]]
server_id = "a"
endpoint = "opc.tcp://a:4840"

[[mappings]]
id = 1
server_id = "a"
node_id = "ns=2;i=5"
target_address = 1
"#;
        let config = loader(&[]).load_from_str(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.sink.kind, SinkKind::Log);
        assert_eq!(config.mappings.len(), 1);

        let json = r#"{"sink": {"kind": "http", "url": "http://collector/api"}, "reconnect": {"enabled": false}}"#;
        let config = loader(&[]).load_from_str(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.sink.url, "http://collector/api");
        assert!(!config.reconnect.enabled);
    }

    #[test]
    fn test_validation_runs_on_load() {
        let yaml = r#"
sink:
  kind: log
servers:
  - server_id: a
    endpoint: "opc.tcp://a:4840"
mappings:
  - id: 1
    server_id: b
    node_id: "ns=2;i=5"
    target_address: 1
"#;
        let err = loader(&[]).load_from_str(yaml, ConfigFormat::Yaml).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_parse_error_carries_path() {
        let file = yaml_file("servers: [unclosed");
        let err = loader(&[]).load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.YML")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")).unwrap(), ConfigFormat::Toml);
        assert!(ConfigFormat::from_path(Path::new("a.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("config")).is_err());
        assert_eq!(ConfigFormat::Json.extension(), "json");
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new().load("/nonexistent/path/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
