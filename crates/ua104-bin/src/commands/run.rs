// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use tokio::runtime::Handle;

use ua104_config::GatewayConfig;

use crate::cli::RunArgs;
use crate::commands::transport_factory;
use crate::error::BinResult;
use crate::runtime::GatewayRuntime;

/// Runs the gateway until a shutdown signal arrives.
pub async fn run(config: GatewayConfig, args: RunArgs) -> BinResult<()> {
    let runtime = GatewayRuntime::build(config, transport_factory()?, &Handle::current())?;
    runtime.run(args.skip_connect).await
}
