// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::error::BinResult;

/// Prints version information.
pub fn version() -> BinResult<()> {
    println!("ua104 - OPC UA to IEC 60870-5-104 gateway");
    println!();
    println!("Version Information:");
    println!("  ua104-bin:    {}", env!("CARGO_PKG_VERSION"));
    println!("  ua104-core:   {}", ua104_core::VERSION);
    println!("  ua104-opcua:  {}", ua104_opcua::VERSION);
    println!("  ua104-iec104: {}", ua104_iec104::VERSION);
    println!("  ua104-config: {}", ua104_config::VERSION);
    println!();
    println!("Build Information:");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
    println!();
    println!("Features:");
    println!(
        "  OPC UA client: {}",
        if cfg!(feature = "real-transport") { "enabled" } else { "disabled" }
    );
    println!("  IEC 104 port:  {}", ua104_iec104::IEC104_PORT);
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
