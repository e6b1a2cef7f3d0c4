// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport over the `opcua` crate.
//!
//! The `opcua` 0.12 client API is synchronous. Every session call runs in
//! `tokio::task::spawn_blocking` so the bridge loop keeps serving other
//! operations and can abort a caller that timed out.
//!
//! # Example
//!
//! ```rust,ignore
//! use ua104_opcua::client::{RealTransportFactory, TransportFactory};
//! use ua104_opcua::types::ServerConfig;
//!
//! let config = ServerConfig::new("plant-a", "opc.tcp://localhost:4840");
//! let transport = RealTransportFactory::new().create(&config)?;
//! transport.connect().await?;
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use opcua::client::prelude::{
    BrowseDescription, BrowseDescriptionResultMask, BrowseDirection, Client, ClientBuilder,
    DataChangeCallback, ExtensionObject, IdentityToken, MonitoredItemCreateRequest,
    MonitoredItemService, MonitoringMode, MonitoringParameters, ReadValueId, ReferenceTypeId,
    Session, SessionCommand, SubscriptionService, TimestampsToReturn, ViewService,
    AttributeService,
};
use opcua::sync::RwLock as OpcUaRwLock;

use crate::client::transport::{
    BrowseResult, DataChange, DataChangeSender, OpcUaTransport, OpcUaValue, QualifiedName,
    ReadResult, SharedTransport, TransportFactory,
};
use crate::error::{
    BrowseError, ConnectionError, OpcUaError, OpcUaResult, OperationError, SubscriptionError,
};
use crate::types::{
    AttributeId, NodeClass, NodeId, NodeIdentifier, SecurityMode, SecurityPolicy, ServerConfig,
    StatusCode, UserIdentity,
};

// =============================================================================
// RealOpcUaTransport
// =============================================================================

/// Transport backed by an `opcua` client session.
pub struct RealOpcUaTransport {
    config: ServerConfig,
    live: Mutex<Option<LiveSession>>,
}

struct LiveSession {
    session: Arc<OpcUaRwLock<Session>>,
    stop: tokio::sync::oneshot::Sender<SessionCommand>,
}

impl RealOpcUaTransport {
    /// Creates an unconnected transport.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            live: Mutex::new(None),
        }
    }

    fn build_client(config: &ServerConfig) -> OpcUaResult<Client> {
        let mut builder = ClientBuilder::new()
            .application_name(config.application_name.as_str())
            .application_uri(format!("urn:ua104:{}", config.server_id))
            .session_retry_limit(0)
            .session_timeout(config.session_timeout_ms.min(u64::from(u32::MAX)) as u32)
            .trust_server_certs(config.trust_server_certificate);

        match (&config.certificate_path, &config.private_key_path) {
            (Some(cert), Some(key)) => {
                builder = builder.certificate_path(cert.as_str()).private_key_path(key.as_str());
            }
            _ if !config.security_mode.is_none() => {
                builder = builder.create_sample_keypair(true);
            }
            _ => {}
        }

        builder.client().ok_or_else(|| {
            ConnectionError::Security(format!(
                "client configuration for {} is invalid",
                config.endpoint
            ))
            .into()
        })
    }

    fn security_policy(policy: SecurityPolicy) -> opcua::client::prelude::SecurityPolicy {
        match policy {
            SecurityPolicy::None => opcua::client::prelude::SecurityPolicy::None,
            SecurityPolicy::Basic128Rsa15 => opcua::client::prelude::SecurityPolicy::Basic128Rsa15,
            SecurityPolicy::Basic256 => opcua::client::prelude::SecurityPolicy::Basic256,
            SecurityPolicy::Basic256Sha256 => opcua::client::prelude::SecurityPolicy::Basic256Sha256,
            SecurityPolicy::Aes128Sha256RsaOaep => opcua::client::prelude::SecurityPolicy::Aes128Sha256RsaOaep,
            SecurityPolicy::Aes256Sha256RsaPss => opcua::client::prelude::SecurityPolicy::Aes256Sha256RsaPss,
        }
    }

    fn message_security_mode(mode: SecurityMode) -> opcua::types::MessageSecurityMode {
        match mode {
            SecurityMode::None => opcua::types::MessageSecurityMode::None,
            SecurityMode::Sign => opcua::types::MessageSecurityMode::Sign,
            SecurityMode::SignAndEncrypt => opcua::types::MessageSecurityMode::SignAndEncrypt,
        }
    }

    fn identity_token(identity: &UserIdentity) -> IdentityToken {
        match identity {
            UserIdentity::Anonymous => IdentityToken::Anonymous,
            UserIdentity::UserName { username, password } => {
                IdentityToken::UserName(username.clone(), password.clone())
            }
        }
    }

    fn open_session(config: &ServerConfig) -> OpcUaResult<LiveSession> {
        let mut client = Self::build_client(config)?;

        let endpoints = client
            .get_server_endpoints_from_url(config.endpoint.as_str())
            .map_err(|status| OpcUaError::connection_failed(&config.endpoint, status.to_string()))?;

        let policy = Self::security_policy(config.security_policy);
        let mode = Self::message_security_mode(config.security_mode);
        let endpoint = endpoints
            .iter()
            .find(|e| e.security_policy_uri.as_ref() == policy.to_uri() && e.security_mode == mode)
            .cloned()
            .ok_or_else(|| ConnectionError::NoSuitableEndpoint {
                endpoint: config.endpoint.clone(),
                mode: config.security_mode.to_string(),
                policy: config.security_policy.to_string(),
            })?;

        debug!(
            endpoint = %config.endpoint,
            security_policy = ?endpoint.security_policy_uri,
            security_mode = ?endpoint.security_mode,
            "Found matching endpoint"
        );

        let session = client
            .connect_to_endpoint(endpoint, Self::identity_token(&config.identity))
            .map_err(|status| OpcUaError::connection_failed(&config.endpoint, status.to_string()))?;

        let stop = Session::run_async(session.clone());
        Ok(LiveSession { session, stop })
    }

    fn session(&self) -> OpcUaResult<Arc<OpcUaRwLock<Session>>> {
        self.live
            .lock()
            .as_ref()
            .map(|live| live.session.clone())
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    async fn blocking<T, F>(&self, f: F) -> OpcUaResult<T>
    where
        F: FnOnce() -> OpcUaResult<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| OpcUaError::connection_failed(&self.config.endpoint, e.to_string()))?
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
        match &node_id.identifier {
            NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(node_id.namespace_index, *v),
            NodeIdentifier::String(v) => opcua::types::NodeId::new(node_id.namespace_index, v.clone()),
            NodeIdentifier::Guid(v) => opcua::types::NodeId::new(
                node_id.namespace_index,
                opcua::types::Guid::from(*v),
            ),
            NodeIdentifier::Opaque(v) => opcua::types::NodeId::new(
                node_id.namespace_index,
                opcua::types::ByteString::from(v.as_slice()),
            ),
        }
    }

    fn from_opcua_node_id(node_id: &opcua::types::NodeId) -> NodeId {
        let ns = node_id.namespace;
        match &node_id.identifier {
            opcua::types::Identifier::Numeric(v) => NodeId::numeric(ns, *v),
            opcua::types::Identifier::String(v) => NodeId::string(ns, v.as_ref()),
            opcua::types::Identifier::Guid(v) => NodeId::guid(ns, uuid::Uuid::from_bytes(*v.as_bytes())),
            opcua::types::Identifier::ByteString(v) => {
                NodeId::opaque(ns, v.value.clone().unwrap_or_default())
            }
        }
    }

    fn to_chrono(dt: &opcua::types::DateTime) -> chrono::DateTime<chrono::Utc> {
        let utc = dt.as_chrono();
        chrono::DateTime::from_timestamp(utc.timestamp(), utc.timestamp_subsec_nanos())
            .unwrap_or_else(chrono::Utc::now)
    }

    fn from_opcua_variant(variant: &opcua::types::Variant) -> OpcUaValue {
        use opcua::types::Variant;

        match variant {
            Variant::Empty => OpcUaValue::Null,
            Variant::Boolean(v) => OpcUaValue::Boolean(*v),
            Variant::SByte(v) => OpcUaValue::SByte(*v),
            Variant::Byte(v) => OpcUaValue::Byte(*v),
            Variant::Int16(v) => OpcUaValue::Int16(*v),
            Variant::UInt16(v) => OpcUaValue::UInt16(*v),
            Variant::Int32(v) => OpcUaValue::Int32(*v),
            Variant::UInt32(v) => OpcUaValue::UInt32(*v),
            Variant::Int64(v) => OpcUaValue::Int64(*v),
            Variant::UInt64(v) => OpcUaValue::UInt64(*v),
            Variant::Float(v) => OpcUaValue::Float(*v),
            Variant::Double(v) => OpcUaValue::Double(*v),
            Variant::String(v) => OpcUaValue::String(v.as_ref().to_string()),
            Variant::DateTime(v) => OpcUaValue::DateTime(Self::to_chrono(v)),
            Variant::Guid(v) => OpcUaValue::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
            Variant::ByteString(v) => OpcUaValue::ByteString(v.value.clone().unwrap_or_default()),
            Variant::NodeId(v) => OpcUaValue::NodeId(Self::from_opcua_node_id(v)),
            Variant::QualifiedName(v) => {
                OpcUaValue::QualifiedName(QualifiedName::new(v.namespace_index, v.name.as_ref()))
            }
            Variant::LocalizedText(v) => OpcUaValue::LocalizedText(v.text.as_ref().to_string()),
            Variant::Array(arr) => {
                OpcUaValue::Array(arr.values.iter().map(Self::from_opcua_variant).collect())
            }
            other => OpcUaValue::String(format!("{:?}", other)),
        }
    }

    fn read_value_id(node_id: &NodeId, attribute: AttributeId) -> ReadValueId {
        ReadValueId {
            node_id: Self::to_opcua_node_id(node_id),
            attribute_id: attribute.value(),
            index_range: opcua::types::UAString::null(),
            data_encoding: opcua::types::QualifiedName::null(),
        }
    }
}

#[async_trait]
impl OpcUaTransport for RealOpcUaTransport {
    async fn connect(&self) -> OpcUaResult<()> {
        info!(server_id = %self.config.server_id, endpoint = %self.config.endpoint, "Connecting to OPC UA server");

        let config = self.config.clone();
        let live = self.blocking(move || Self::open_session(&config)).await?;
        *self.live.lock() = Some(live);

        info!(server_id = %self.config.server_id, endpoint = %self.config.endpoint, "Connected to OPC UA server");
        Ok(())
    }

    async fn disconnect(&self) -> OpcUaResult<()> {
        let Some(live) = self.live.lock().take() else {
            return Ok(());
        };

        let LiveSession { session, stop } = live;
        let _ = stop.send(SessionCommand::Stop);
        self.blocking(move || {
            session.read().disconnect();
            Ok(())
        })
        .await?;

        info!(server_id = %self.config.server_id, "Disconnected from OPC UA server");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.live
            .lock()
            .as_ref()
            .map(|live| live.session.read().is_connected())
            .unwrap_or(false)
    }

    async fn read_attribute(&self, node_id: &NodeId, attribute: AttributeId) -> OpcUaResult<ReadResult> {
        let session = self.session()?;
        let request = Self::read_value_id(node_id, attribute);
        let target = node_id.clone();

        trace!(node_id = %node_id, attribute = %attribute, "Reading attribute");

        self.blocking(move || {
            let values = session
                .read()
                .read(&[request], TimestampsToReturn::Both, 0.0)
                .map_err(|status| OperationError::read_failed(target.to_string(), status.to_string()))?;

            let Some(data_value) = values.into_iter().next() else {
                return Ok(ReadResult::with_status(target, StatusCode::BAD));
            };

            Ok(ReadResult {
                node_id: target,
                value: data_value
                    .value
                    .as_ref()
                    .map(Self::from_opcua_variant)
                    .unwrap_or_default(),
                status: StatusCode(data_value.status.as_ref().map(|s| s.bits()).unwrap_or(0)),
                source_timestamp: data_value.source_timestamp.as_ref().map(Self::to_chrono),
                server_timestamp: data_value.server_timestamp.as_ref().map(Self::to_chrono),
            })
        })
        .await
    }

    async fn browse(&self, node_id: &NodeId) -> OpcUaResult<Vec<BrowseResult>> {
        let session = self.session()?;
        let description = BrowseDescription {
            node_id: Self::to_opcua_node_id(node_id),
            browse_direction: BrowseDirection::Forward,
            reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: BrowseDescriptionResultMask::all().bits(),
        };
        let target = node_id.to_string();

        trace!(node_id = %node_id, "Browsing node");

        self.blocking(move || {
            let results = session
                .read()
                .browse(&[description])
                .map_err(|status| BrowseError::failed(&target, status.to_string()))?
                .ok_or_else(|| BrowseError::failed(&target, "no browse results returned"))?;

            let references = results
                .into_iter()
                .next()
                .and_then(|r| r.references)
                .unwrap_or_default();

            Ok(references
                .iter()
                .map(|r| BrowseResult {
                    node_id: Self::from_opcua_node_id(&r.node_id.node_id),
                    browse_name: QualifiedName::new(r.browse_name.namespace_index, r.browse_name.name.as_ref()),
                    display_name: r.display_name.text.as_ref().to_string(),
                    node_class: NodeClass::from_value(r.node_class as u32),
                })
                .collect())
        })
        .await
    }

    async fn create_subscription(
        &self,
        publishing_interval: Duration,
        notifications: DataChangeSender,
    ) -> OpcUaResult<u32> {
        let session = self.session()?;
        let subscription_id = Arc::new(AtomicU32::new(0));
        let callback_id = subscription_id.clone();

        let callback = DataChangeCallback::new(move |items| {
            for item in items.iter() {
                let data_value = item.last_value();
                let change = DataChange {
                    subscription_id: callback_id.load(Ordering::Acquire),
                    monitored_item_id: item.id(),
                    node_id: Self::from_opcua_node_id(&item.item_to_monitor().node_id),
                    value: data_value
                        .value
                        .as_ref()
                        .map(Self::from_opcua_variant)
                        .unwrap_or_default(),
                    status: StatusCode(data_value.status.as_ref().map(|s| s.bits()).unwrap_or(0)),
                    source_timestamp: data_value.source_timestamp.as_ref().map(Self::to_chrono),
                    server_timestamp: data_value.server_timestamp.as_ref().map(Self::to_chrono),
                };
                if notifications.send(change).is_err() {
                    trace!("Data change receiver dropped");
                }
            }
        });

        let id = self
            .blocking(move || {
                session
                    .read()
                    .create_subscription(
                        publishing_interval.as_millis() as f64,
                        60,
                        10,
                        0,
                        0,
                        true,
                        callback,
                    )
                    .map_err(|status| SubscriptionError::create_failed(status.to_string()).into())
            })
            .await?;
        subscription_id.store(id, Ordering::Release);

        debug!(server_id = %self.config.server_id, subscription_id = id, "Created subscription");
        Ok(id)
    }

    async fn delete_subscription(&self, subscription_id: u32) -> OpcUaResult<()> {
        let session = self.session()?;
        self.blocking(move || {
            session
                .read()
                .delete_subscription(subscription_id)
                .map_err(|status| SubscriptionError::delete_failed(subscription_id, status.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node_id: &NodeId,
        sampling_interval: Duration,
        queue_size: u32,
    ) -> OpcUaResult<u32> {
        let session = self.session()?;
        let request = MonitoredItemCreateRequest {
            item_to_monitor: Self::read_value_id(node_id, AttributeId::Value),
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                client_handle: 0,
                sampling_interval: sampling_interval.as_millis() as f64,
                filter: ExtensionObject::null(),
                queue_size,
                discard_oldest: true,
            },
        };
        let target = node_id.to_string();

        self.blocking(move || {
            let results = session
                .read()
                .create_monitored_items(subscription_id, TimestampsToReturn::Both, &[request])
                .map_err(|status| SubscriptionError::monitored_item_failed(&target, status.to_string()))?;

            let result = results
                .into_iter()
                .next()
                .ok_or_else(|| SubscriptionError::monitored_item_failed(&target, "empty response"))?;
            if !result.status_code.is_good() {
                warn!(node_id = %target, status = ?result.status_code, "Monitored item rejected");
                return Err(SubscriptionError::monitored_item_failed(&target, result.status_code.to_string()).into());
            }
            Ok(result.monitored_item_id)
        })
        .await
    }

    async fn delete_monitored_item(&self, subscription_id: u32, monitored_item_id: u32) -> OpcUaResult<()> {
        let session = self.session()?;
        self.blocking(move || {
            session
                .read()
                .delete_monitored_items(subscription_id, &[monitored_item_id])
                .map_err(|status| SubscriptionError::delete_failed(subscription_id, status.to_string()))?;
            Ok(())
        })
        .await
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn display_name(&self) -> String {
        format!("RealOpcUaTransport({})", self.config.endpoint)
    }
}

// =============================================================================
// RealTransportFactory
// =============================================================================

/// Factory producing [`RealOpcUaTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTransportFactory;

impl RealTransportFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for RealTransportFactory {
    fn create(&self, config: &ServerConfig) -> OpcUaResult<SharedTransport> {
        config.validate()?;
        Ok(Arc::new(RealOpcUaTransport::new(config.clone())))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversion() {
        for node in [NodeId::numeric(2, 1001), NodeId::string(3, "Line.Pump")] {
            let opcua_node = RealOpcUaTransport::to_opcua_node_id(&node);
            assert_eq!(RealOpcUaTransport::from_opcua_node_id(&opcua_node), node);
        }
    }

    #[test]
    fn test_variant_conversion() {
        use opcua::types::Variant;
        assert_eq!(
            RealOpcUaTransport::from_opcua_variant(&Variant::Double(2.5)),
            OpcUaValue::Double(2.5)
        );
        assert_eq!(RealOpcUaTransport::from_opcua_variant(&Variant::Empty), OpcUaValue::Null);
    }

    #[test]
    fn test_factory_validates() {
        let factory = RealTransportFactory::new();
        assert!(factory.create(&ServerConfig::new("a", "http://bad")).is_err());
        let transport = factory.create(&ServerConfig::new("a", "opc.tcp://localhost:4840")).unwrap();
        assert!(!transport.is_connected());
    }
}
