// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `browse` command.
//!
//! Prints one JSON object per node on stdout as the traversal reaches it.
//! Ctrl+C stops the traversal; the nodes printed so far stay valid.

use std::time::Duration;

use tracing::{info, warn};

use ua104_config::GatewayConfig;
use ua104_opcua::{AddressSpaceBrowser, BrowseOptions, NodeId, NodeRecord};

use crate::cli::BrowseArgs;
use crate::commands::{blocking, transport_factory, Session};
use crate::error::BinResult;

/// Browses one configured server.
pub async fn browse(config: GatewayConfig, args: BrowseArgs) -> BinResult<()> {
    let mut options = BrowseOptions::default().with_depth(args.depth);
    if let Some(start) = &args.start {
        let start: NodeId = start.parse()?;
        options = options.with_start(start);
    }
    let timeout = Duration::from_secs(args.timeout_secs);

    let factory = transport_factory()?;
    let server_id = args.server_id.clone();
    let session = blocking(move || Session::open(&config, &server_id, factory)).await?;
    let browser = AddressSpaceBrowser::new(session.registry.clone());

    let interrupt = {
        let browser = browser.clone();
        let server_id = session.server_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(server_id = %server_id, "Stopping browse");
                browser.stop(&server_id);
            }
        })
    };

    let result = blocking(move || {
        let outcome = walk(&session, &browser, &options, timeout);
        session.close();
        outcome
    })
    .await;
    interrupt.abort();

    let (count, stopped) = result?;
    info!(nodes = count, stopped, "Browse complete");
    Ok(())
}

fn walk(
    session: &Session,
    browser: &AddressSpaceBrowser,
    options: &BrowseOptions,
    timeout: Duration,
) -> BinResult<(usize, bool)> {
    let mut stream = browser.stream(&session.server_id, options)?;
    let walked = session.registry.bridge().run_and_wait(
        async move {
            let mut count = 0usize;
            while let Some(record) = stream.next().await {
                print_record(&record);
                count += 1;
            }
            (count, stream.is_stopped())
        },
        timeout,
    )?;
    Ok(walked)
}

fn print_record(record: &NodeRecord) {
    match serde_json::to_string(record) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(node_id = %record.node_id, error = %e, "Cannot serialize node record"),
    }
}

