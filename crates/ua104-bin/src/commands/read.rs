// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `read` command.

use ua104_config::GatewayConfig;
use ua104_opcua::{read_node_details, read_node_value};

use crate::cli::ReadArgs;
use crate::commands::{blocking, transport_factory, Session};
use crate::error::{BinError, BinResult};

/// Prints the value, or with `--details` every common attribute, of one
/// node as pretty JSON.
pub async fn read(config: GatewayConfig, args: ReadArgs) -> BinResult<()> {
    let timeout = config.bridge.operation_timeout();
    let factory = transport_factory()?;

    let json = blocking(move || {
        let session = Session::open(&config, &args.server_id, factory)?;
        let registry = &session.registry;
        let rendered = if args.details {
            read_node_details(registry, &session.server_id, &args.node_id, timeout)
                .map_err(BinError::from)
                .and_then(|details| to_json(&details))
        } else {
            read_node_value(registry, &session.server_id, &args.node_id, timeout)
                .map_err(BinError::from)
                .and_then(|value| to_json(&value))
        };
        session.close();
        rendered
    })
    .await?;

    println!("{}", json);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> BinResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| BinError::runtime(format!("cannot serialize result: {}", e)))
}
