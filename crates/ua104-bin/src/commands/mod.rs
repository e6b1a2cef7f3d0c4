// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Start the gateway
//! - `validate`: Validate the configuration file
//! - `browse`: Print the address space of one server
//! - `read`: Print the value or the attributes of one node
//! - `version`: Show version information

mod browse;
mod read;
mod run;
mod validate;
mod version;

pub use browse::browse;
pub use read::read;
pub use run::run;
pub use validate::validate;
pub use version::version;

use std::sync::Arc;

use tracing::warn;

use ua104_config::{ConfigLoader, GatewayConfig};
use ua104_core::bridge::AsyncBridge;
use ua104_core::types::ServerId;
use ua104_opcua::{ConnectionRegistry, TransportFactory};

use crate::cli::{Cli, Commands};
use crate::error::{BinError, BinResult};
use crate::logging::{init_logging, LogSettings};

/// Executes the command selected on the command line.
pub async fn execute(cli: Cli) -> BinResult<()> {
    let command = cli.effective_command();
    if let Commands::Version = command {
        init_logging(&LogSettings::resolve(&cli, None))?;
        return version::version();
    }

    let config = ConfigLoader::new().load(&cli.config)?;
    init_logging(&LogSettings::resolve(&cli, Some(&config.logging)))?;

    match command {
        Commands::Run(args) => run::run(config, args).await,
        Commands::Validate(args) => validate::validate(&cli, &config, args),
        Commands::Browse(args) => browse::browse(config, args).await,
        Commands::Read(args) => read::read(config, args).await,
        Commands::Version => version::version(),
    }
}

/// Builds the transport factory compiled into this binary.
pub fn transport_factory() -> BinResult<Arc<dyn TransportFactory>> {
    #[cfg(feature = "real-transport")]
    {
        Ok(Arc::new(ua104_opcua::RealTransportFactory::new()))
    }
    #[cfg(not(feature = "real-transport"))]
    {
        Err(BinError::init("built without the real-transport feature"))
    }
}

// =============================================================================
// Session
// =============================================================================

/// A bridge with one connected server, for one-shot commands.
pub(crate) struct Session {
    pub(crate) server_id: ServerId,
    pub(crate) registry: ConnectionRegistry,
}

impl Session {
    /// Starts a bridge and connects `server_id`. Blocks.
    pub(crate) fn open(
        config: &GatewayConfig,
        server_id: &str,
        factory: Arc<dyn TransportFactory>,
    ) -> BinResult<Self> {
        let server_id = ServerId::new(server_id);
        let server = config
            .server(&server_id)
            .ok_or_else(|| BinError::config(format!("server '{}' is not configured", server_id)))?;

        let bridge = AsyncBridge::with_config(config.bridge.to_bridge_config());
        bridge.start()?;
        let registry = ConnectionRegistry::new(bridge.clone(), factory);

        if let Err(e) = registry.connect(server) {
            bridge.stop();
            return Err(BinError::from(e).with_context(format!("cannot connect to '{}'", server_id)));
        }
        Ok(Self { server_id, registry })
    }

    /// Disconnects and stops the bridge. Blocks.
    pub(crate) fn close(self) {
        if let Err(e) = self.registry.disconnect(&self.server_id) {
            warn!(server_id = %self.server_id, error = %e, "Disconnect failed");
        }
        self.registry.bridge().stop();
    }
}

/// Runs blocking work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> BinResult<T>
where
    F: FnOnce() -> BinResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BinError::runtime(format!("blocking task failed: {}", e)))?
}
