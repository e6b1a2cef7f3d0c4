// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! [`ServerStore`] over the servers of a loaded configuration.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use ua104_core::types::{ConnectionState, ServerId};
use ua104_opcua::{ServerConfig, ServerStore};

/// Server list from the configuration file with connection status kept in
/// memory.
///
/// A server should be connected when it is marked `auto_connect`, or when it
/// was last recorded as connected.
#[derive(Debug, Clone, Default)]
pub struct FileServerStore {
    servers: Arc<Vec<ServerConfig>>,
    status: Arc<DashMap<ServerId, ConnectionState>>,
}

impl FileServerStore {
    /// Creates a store over `servers`, every status `Disconnected`.
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers: Arc::new(servers),
            status: Arc::new(DashMap::new()),
        }
    }

    /// Returns the recorded status of `server_id`.
    pub fn status(&self, server_id: &ServerId) -> ConnectionState {
        self.status
            .get(server_id)
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Returns every configured server.
    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    /// Returns the configuration of `server_id`.
    pub fn server(&self, server_id: &ServerId) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| &s.server_id == server_id)
    }
}

impl ServerStore for FileServerStore {
    fn servers_to_connect(&self) -> Vec<ServerConfig> {
        self.servers
            .iter()
            .filter(|s| s.auto_connect || self.status(&s.server_id).is_connected())
            .cloned()
            .collect()
    }

    fn set_status(&self, server_id: &ServerId, state: ConnectionState) {
        debug!(server_id = %server_id, state = %state, "Recording server status");
        self.status.insert(server_id.clone(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_servers_to_connect() {
        let store = FileServerStore::new(vec![
            ServerConfig::new("a", "opc.tcp://a:4840").with_auto_connect(true),
            ServerConfig::new("b", "opc.tcp://b:4840"),
        ]);

        let ids: Vec<_> = store.servers_to_connect().into_iter().map(|s| s.server_id).collect();
        assert_eq!(ids, vec![ServerId::new("a")]);

        store.set_status(&ServerId::new("b"), ConnectionState::Connected);
        assert_eq!(store.servers_to_connect().len(), 2);

        store.set_status(&ServerId::new("a"), ConnectionState::Error);
        assert_eq!(store.status(&ServerId::new("a")), ConnectionState::Error);
        assert_eq!(store.servers_to_connect().len(), 2);
        assert_eq!(store.status(&ServerId::new("zzz")), ConnectionState::Disconnected);
    }
}
