// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! ua104 - OPC UA to IEC 60870-5-104 gateway
//!
//! Main binary entry point.

use ua104_bin::cli::Cli;
use ua104_bin::commands::execute;
use ua104_bin::error::report_error_and_exit;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = execute(cli).await {
        report_error_and_exit(e);
    }
}
