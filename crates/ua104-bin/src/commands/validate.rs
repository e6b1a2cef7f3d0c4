// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use std::collections::HashSet;
use std::path::Path;

use ua104_config::{GatewayConfig, SinkKind};

use crate::cli::{Cli, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Prints a summary of the loaded configuration and its warnings.
///
/// Loading already validated the file; this command adds the checks that
/// do not stop the gateway from starting.
pub fn validate(cli: &Cli, config: &GatewayConfig, args: ValidateArgs) -> BinResult<()> {
    let warnings = collect_warnings(config);

    println!("✓ Configuration is valid: {}", cli.config.display());
    println!();
    println!("Summary:");
    println!("  Gateway:  {}", config.gateway.name);
    println!(
        "  Servers:  {} ({} auto-connect)",
        config.servers.len(),
        config.auto_connect_servers().count()
    );
    println!(
        "  Mappings: {} ({} active)",
        config.mappings.len(),
        config.mappings.iter().filter(|m| m.active).count()
    );
    match &config.station {
        Some(station) => println!(
            "  Station:  {} on {}:{} (CA {}, {} points)",
            station.name,
            station.ip,
            station.port,
            station.common_address,
            station.points.len()
        ),
        None => println!("  Station:  none"),
    }
    println!("  Sink:     {:?}", config.sink.kind);

    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &warnings {
            println!("  ⚠ {}", warning);
        }
    }

    if args.show_config {
        println!();
        println!("Parsed configuration:");
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| BinError::runtime(format!("cannot serialize configuration: {}", e)))?;
        println!("{}", json);
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::config(format!(
            "strict mode: {} warning(s) found",
            warnings.len()
        )));
    }
    Ok(())
}

/// Findings that are legal but most likely mistakes.
pub fn collect_warnings(config: &GatewayConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.servers.is_empty() {
        warnings.push("No OPC UA servers configured".to_string());
    }
    if config.mappings.len() == 0 {
        warnings.push("No mappings configured".to_string());
    }

    for id in config.unmapped_targets() {
        if let Some(mapping) = config.mappings.get(id) {
            warnings.push(format!(
                "Mapping {} targets IOA {} which is not a station point",
                id, mapping.target_address
            ));
        }
    }

    if let Some(station) = &config.station {
        let fed: HashSet<_> = config.mappings.iter().map(|m| m.target_address).collect();
        let idle = station.points.iter().filter(|p| !fed.contains(&p.io_address)).count();
        if idle > 0 {
            warnings.push(format!("{} station point(s) have no mapping and stay invalid", idle));
        }
        if config.sink.kind != SinkKind::Station {
            warnings.push(format!(
                "A station is configured but values go to the {:?} sink",
                config.sink.kind
            ));
        }
    }

    for server in &config.servers {
        let mapped = config.mappings.for_server(&server.server_id).count();
        if mapped > 0 && !server.auto_connect {
            warnings.push(format!(
                "Server '{}' has {} mapping(s) but auto_connect is off",
                server.server_id, mapped
            ));
        }
        for path in [&server.certificate_path, &server.private_key_path].into_iter().flatten() {
            if !Path::new(path).exists() {
                warnings.push(format!("Server '{}': file not found: {}", server.server_id, path));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use ua104_config::load_config_str;
    use ua104_config::ConfigFormat;

    const CONFIG: &str = r#"
servers:
  - server_id: plant
    endpoint: opc.tcp://localhost:4840
    auto_connect: false
mappings:
  - id: 1
    server_id: plant
    node_id: ns=2;s=Breaker
    target_address: 100
  - id: 2
    server_id: plant
    node_id: ns=2;s=Level
    target_address: 999
station:
  name: rtu
  ip: 127.0.0.1
  port: 2404
  common_address: 1
  points:
    - io_address: 100
      point_type: M_SP_NA_1
    - io_address: 200
      point_type: M_ME_NC_1
"#;

    #[test]
    fn test_warnings() {
        let config = load_config_str(CONFIG, ConfigFormat::Yaml).unwrap();
        let warnings = collect_warnings(&config);

        assert!(warnings.iter().any(|w| w.contains("IOA 999")));
        assert!(warnings.iter().any(|w| w.contains("1 station point(s)")));
        assert!(warnings.iter().any(|w| w.contains("auto_connect is off")));
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_empty_config_warnings() {
        let config = GatewayConfig {
            sink: ua104_config::SinkConfig {
                kind: SinkKind::Log,
                ..Default::default()
            },
            ..GatewayConfig::default()
        };
        let warnings = collect_warnings(&config);
        assert_eq!(warnings.len(), 2);
    }
}
