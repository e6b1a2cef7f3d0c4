// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA-specific types.
//!
//! - **NodeId**: the four OPC UA identifier kinds with text parsing
//! - **StatusCode**: severity and info-bit helpers over the raw code
//! - **NodeClass / AttributeId**: address space vocabulary
//! - **SecurityMode / SecurityPolicy / UserIdentity**: session security
//! - **ServerConfig**: one configured server connection
//!
//! # Examples
//!
//! ```
//! use ua104_opcua::types::{NodeId, ServerConfig};
//!
//! let node: NodeId = "ns=2;s=Pump.Running".parse().unwrap();
//! assert_eq!(node.namespace_index, 2);
//!
//! let config = ServerConfig::new("plant-a", "opc.tcp://localhost:4840");
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ua104_core::types::ServerId;

use crate::error::{ConfigurationError, OpcUaError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// # Examples
///
/// ```
/// use ua104_opcua::types::NodeId;
///
/// let numeric = NodeId::numeric(2, 1001);
/// assert_eq!(numeric.to_string(), "ns=2;i=1001");
///
/// let parsed: NodeId = "i=85".parse().unwrap();
/// assert_eq!(parsed, NodeId::OBJECTS_FOLDER);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    // =========================================================================
    // Standard Node IDs
    // =========================================================================

    /// Root folder node (ns=0, i=84).
    pub const ROOT_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(84),
    };

    /// Objects folder node (ns=0, i=85).
    pub const OBJECTS_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(85),
    };

    /// Server_ServerStatus_State (ns=0, i=2259), read as a liveness check.
    pub const SERVER_STATUS_STATE: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(2259),
    };

    /// Returns `true` if this is a null node ID (ns=0, i=0).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }

    /// Returns the numeric value if this is a numeric identifier.
    #[inline]
    pub fn as_numeric(&self) -> Option<u32> {
        match &self.identifier {
            NodeIdentifier::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Converts to the OPC UA text format.
    ///
    /// Namespace 0 is written without the `ns=` prefix.
    pub fn to_opc_string(&self) -> String {
        let id_str = match &self.identifier {
            NodeIdentifier::Numeric(v) => format!("i={}", v),
            NodeIdentifier::String(v) => format!("s={}", v),
            NodeIdentifier::Guid(v) => format!("g={}", v),
            NodeIdentifier::Opaque(v) => format!("b={}", BASE64.encode(v)),
        };

        if self.namespace_index == 0 {
            id_str
        } else {
            format!("ns={};{}", self.namespace_index, id_str)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::numeric(0, 0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses `ns=<n>;{i|s|g|b}=<id>` or the namespace 0 short form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| OpcUaError::from(ConfigurationError::invalid_node_id(s, reason));

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("missing identifier after namespace".to_string()))?;
                let ns: u16 = ns_str
                    .parse()
                    .map_err(|_| invalid("invalid namespace index".to_string()))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(
                id.parse()
                    .map_err(|_| invalid("invalid numeric identifier".to_string()))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(Uuid::parse_str(id).map_err(|e| invalid(format!("invalid GUID: {}", e)))?)
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(
                BASE64
                    .decode(id)
                    .map_err(|e| invalid(format!("invalid base64: {}", e)))?,
            )
        } else {
            return Err(invalid("expected i=, s=, g= or b=".to_string()));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

/// OPC UA node identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque (byte string) identifier.
    Opaque(Vec<u8>),
}

// =============================================================================
// StatusCode
// =============================================================================

/// Raw OPC UA status code.
///
/// The two most significant bits carry the severity; for a good status the
/// low bits may carry data-value info bits such as overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: Self = Self(0);
    /// Generic bad status.
    pub const BAD: Self = Self(0x8000_0000);
    /// BadCommunicationError.
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    /// BadTimeout.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    /// BadAttributeIdInvalid.
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    /// BadNotReadable.
    pub const BAD_NOT_READABLE: Self = Self(0x803A_0000);
    /// BadNotConnected.
    pub const BAD_NOT_CONNECTED: Self = Self(0x808A_0000);
    /// UncertainLastUsableValue.
    pub const UNCERTAIN_LAST_USABLE_VALUE: Self = Self(0x4090_0000);

    const SEVERITY_MASK: u32 = 0xC000_0000;
    const INFO_TYPE_DATA_VALUE: u32 = 0x0000_0400;
    const INFO_OVERFLOW: u32 = 0x0000_0080;

    /// Returns the raw code.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` for a good severity.
    #[inline]
    pub const fn is_good(self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0
    }

    /// Returns `true` for an uncertain severity.
    #[inline]
    pub const fn is_uncertain(self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0x4000_0000
    }

    /// Returns `true` for a bad severity.
    #[inline]
    pub const fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns `true` if the overflow info bit is set.
    #[inline]
    pub const fn has_overflow(self) -> bool {
        self.0 & Self::INFO_OVERFLOW != 0
    }

    /// Returns a good status carrying the overflow info bit.
    pub const fn good_with_overflow() -> Self {
        Self(Self::INFO_TYPE_DATA_VALUE | Self::INFO_OVERFLOW)
    }

    /// Returns `true` for codes caused by the transport rather than the node.
    pub fn is_communication(self) -> bool {
        matches!(
            self.0 & 0xFFFF_0000,
            0x8005_0000 | 0x800A_0000 | 0x808A_0000
        )
    }

    /// Returns the symbolic name for well-known codes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 & 0xFFFF_0000 {
            0 => "Good",
            0x8000_0000 => "Bad",
            0x8005_0000 => "BadCommunicationError",
            0x800A_0000 => "BadTimeout",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8035_0000 => "BadAttributeIdInvalid",
            0x803A_0000 => "BadNotReadable",
            0x808A_0000 => "BadNotConnected",
            0x4090_0000 => "UncertainLastUsableValue",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the OPC UA bit mask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates from the OPC UA value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Object),
            2 => Some(Self::Variable),
            4 => Some(Self::Method),
            8 => Some(Self::ObjectType),
            16 => Some(Self::VariableType),
            32 => Some(Self::ReferenceType),
            64 => Some(Self::DataType),
            128 => Some(Self::View),
            _ => None,
        }
    }

    /// Returns the OPC UA name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Variable => "Variable",
            Self::Method => "Method",
            Self::ObjectType => "ObjectType",
            Self::VariableType => "VariableType",
            Self::ReferenceType => "ReferenceType",
            Self::DataType => "DataType",
            Self::View => "View",
        }
    }

    /// Returns `true` if the browser descends into nodes of this class.
    #[inline]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Object | Self::View)
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// AttributeId
// =============================================================================

/// OPC UA attributes read by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeId {
    /// Node class attribute.
    NodeClass,
    /// Browse name attribute.
    BrowseName,
    /// Display name attribute.
    DisplayName,
    /// Description attribute.
    Description,
    /// Value attribute.
    Value,
    /// Data type attribute.
    DataType,
    /// Value rank attribute.
    ValueRank,
    /// Access level attribute.
    AccessLevel,
    /// Historizing attribute.
    Historizing,
}

impl AttributeId {
    /// Returns the OPC UA numeric value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::NodeClass => 2,
            Self::BrowseName => 3,
            Self::DisplayName => 4,
            Self::Description => 5,
            Self::Value => 13,
            Self::DataType => 14,
            Self::ValueRank => 15,
            Self::AccessLevel => 17,
            Self::Historizing => 20,
        }
    }

    /// Returns the OPC UA name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NodeClass => "NodeClass",
            Self::BrowseName => "BrowseName",
            Self::DisplayName => "DisplayName",
            Self::Description => "Description",
            Self::Value => "Value",
            Self::DataType => "DataType",
            Self::ValueRank => "ValueRank",
            Self::AccessLevel => "AccessLevel",
            Self::Historizing => "Historizing",
        }
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns `true` if this mode provides no security.
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" | "nosecurity" => Ok(Self::None),
            "sign" | "signed" => Ok(Self::Sign),
            "signandencrypt" | "signencrypt" | "encrypted" => Ok(Self::SignAndEncrypt),
            _ => Err(ConfigurationError::InvalidSecurityMode(s.to_string()).into()),
        }
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SecurityPolicy {
    /// No security policy.
    #[default]
    None,
    /// Basic128Rsa15 (deprecated).
    Basic128Rsa15,
    /// Basic256 (deprecated).
    Basic256,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128_Sha256_RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256_Sha256_RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128_Sha256_RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256_Sha256_RsaPss",
        }
    }

    /// Creates from a policy URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let (_, fragment) = uri.rsplit_once('#')?;
        Self::from_name(fragment)
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Some(Self::None),
            "basic128rsa15" => Some(Self::Basic128Rsa15),
            "basic256" => Some(Self::Basic256),
            "basic256sha256" => Some(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Some(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Some(Self::Aes256Sha256RsaPss),
            _ => None,
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = OpcUaError;

    /// Accepts a policy URI or its short name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s)
            .or_else(|| Self::from_name(s))
            .ok_or_else(|| ConfigurationError::InvalidSecurityPolicy(s.to_string()).into())
    }
}

// =============================================================================
// UserIdentity
// =============================================================================

/// User identity presented when activating the session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserIdentity {
    /// Anonymous authentication.
    #[default]
    Anonymous,

    /// Username and password authentication.
    UserName {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },
}

impl UserIdentity {
    /// Creates a username identity.
    pub fn user_name(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UserName {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns `true` if this is anonymous authentication.
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::UserName { username, .. } => write!(f, "UserName({})", username),
        }
    }
}

// =============================================================================
// ServerConfig
// =============================================================================

fn default_application_name() -> String {
    "ua104 gateway".to_string()
}

fn default_session_timeout_ms() -> u64 {
    60_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// One configured OPC UA server connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server identifier.
    pub server_id: ServerId,

    /// Human readable name.
    #[serde(default)]
    pub name: String,

    /// Endpoint URL (`opc.tcp://host:port/path`).
    pub endpoint: String,

    /// Message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// User identity.
    #[serde(default)]
    pub identity: UserIdentity,

    /// Client certificate (DER or PEM).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<String>,

    /// Client private key (PEM).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,

    /// Accept server certificates that are not in the trust store.
    #[serde(default)]
    pub trust_server_certificate: bool,

    /// Application name announced to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Timeout for a single service request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Whether the server should be connected at startup and kept connected.
    #[serde(default)]
    pub auto_connect: bool,
}

impl ServerConfig {
    /// Creates an anonymous, unsecured configuration.
    pub fn new(server_id: impl Into<ServerId>, endpoint: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            name: String::new(),
            endpoint: endpoint.into(),
            security_mode: SecurityMode::None,
            security_policy: SecurityPolicy::None,
            identity: UserIdentity::Anonymous,
            certificate_path: None,
            private_key_path: None,
            trust_server_certificate: false,
            application_name: default_application_name(),
            session_timeout_ms: default_session_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            auto_connect: false,
        }
    }

    /// Sets security mode and policy.
    pub fn with_security(mut self, mode: SecurityMode, policy: SecurityPolicy) -> Self {
        self.security_mode = mode;
        self.security_policy = policy;
        self
    }

    /// Sets the user identity.
    pub fn with_identity(mut self, identity: UserIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the client certificate and key.
    pub fn with_certificate(mut self, certificate: impl Into<String>, key: impl Into<String>) -> Self {
        self.certificate_path = Some(certificate.into());
        self.private_key_path = Some(key.into());
        self
    }

    /// Marks the server for automatic connection.
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Returns the name, or the id when no name is set.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.server_id.as_str()
        } else {
            &self.name
        }
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Session timeout as a duration.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), OpcUaError> {
        if self.server_id.as_str().trim().is_empty() {
            return Err(ConfigurationError::missing_field("server_id").into());
        }
        if self.endpoint.is_empty() {
            return Err(ConfigurationError::missing_field("endpoint").into());
        }
        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(ConfigurationError::invalid_endpoint(
                &self.endpoint,
                "endpoint must start with opc.tcp://",
            )
            .into());
        }

        match (self.security_mode.is_none(), self.security_policy == SecurityPolicy::None) {
            (false, true) => {
                return Err(ConfigurationError::InvalidSecurity(
                    "security mode requires a security policy other than None".to_string(),
                )
                .into())
            }
            (true, false) => {
                return Err(ConfigurationError::InvalidSecurity(
                    "security policy requires a security mode other than None".to_string(),
                )
                .into())
            }
            _ => {}
        }

        if self.certificate_path.is_some() != self.private_key_path.is_some() {
            return Err(ConfigurationError::InvalidSecurity(
                "certificate_path and private_key_path must be set together".to_string(),
            )
            .into());
        }

        if let UserIdentity::UserName { username, .. } = &self.identity {
            if username.is_empty() {
                return Err(ConfigurationError::missing_field("identity.username").into());
            }
        }

        if self.session_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(ConfigurationError::InvalidSecurity(
                "timeouts must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse_and_format() {
        let cases = [
            "i=85",
            "ns=2;i=1001",
            "ns=3;s=Line1.Pump",
            "ns=1;g=550e8400-e29b-41d4-a716-446655440000",
            "ns=4;b=SGVsbG8=",
        ];
        for text in cases {
            let node: NodeId = text.parse().unwrap();
            assert_eq!(node.to_string(), text);
        }
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("q=1".parse::<NodeId>().is_err());
        assert!("i=abc".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_status_code() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());
        assert!(StatusCode::UNCERTAIN_LAST_USABLE_VALUE.is_uncertain());
        let ov = StatusCode::good_with_overflow();
        assert!(ov.is_good());
        assert!(ov.has_overflow());
        assert!(StatusCode::BAD_TIMEOUT.is_communication());
        assert_eq!(StatusCode(0x8034_0000).to_string(), "BadNodeIdUnknown (0x80340000)");
    }

    #[test]
    fn test_node_class() {
        assert_eq!(NodeClass::from_value(2), Some(NodeClass::Variable));
        assert!(NodeClass::View.is_container());
        assert!(!NodeClass::Variable.is_container());
        assert_eq!(NodeClass::from_value(3), None);
    }

    #[test]
    fn test_security_parsing() {
        assert_eq!("sign_and_encrypt".parse::<SecurityMode>().unwrap(), SecurityMode::SignAndEncrypt);
        assert_eq!(
            "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256"
                .parse::<SecurityPolicy>()
                .unwrap(),
            SecurityPolicy::Basic256Sha256
        );
        assert_eq!("aes128_sha256_rsaoaep".parse::<SecurityPolicy>().unwrap(), SecurityPolicy::Aes128Sha256RsaOaep);
        assert!("rot13".parse::<SecurityPolicy>().is_err());
    }

    #[test]
    fn test_identity_hides_password() {
        let identity = UserIdentity::user_name("op", "secret");
        assert_eq!(format!("{:?}", identity), "UserName(op)");
    }

    #[test]
    fn test_server_config_validation() {
        let ok = ServerConfig::new("a", "opc.tcp://localhost:4840");
        assert!(ok.validate().is_ok());

        assert!(ServerConfig::new("a", "http://localhost").validate().is_err());
        assert!(ServerConfig::new("a", "opc.tcp://h:1")
            .with_security(SecurityMode::Sign, SecurityPolicy::None)
            .validate()
            .is_err());
        assert!(ServerConfig::new("a", "opc.tcp://h:1")
            .with_security(SecurityMode::None, SecurityPolicy::Basic256Sha256)
            .validate()
            .is_err());
        assert!(ServerConfig::new("a", "opc.tcp://h:1")
            .with_identity(UserIdentity::user_name("", "x"))
            .validate()
            .is_err());
    }

    #[test]
    fn test_server_config_serde() {
        let yaml = r#"
server_id: plant-a
endpoint: opc.tcp://10.0.0.5:4840
security_mode: sign_and_encrypt
security_policy: Basic256Sha256
identity:
  kind: user_name
  username: operator
  password: pw
auto_connect: true
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.security_mode, SecurityMode::SignAndEncrypt);
        assert_eq!(config.identity, UserIdentity::user_name("operator", "pw"));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.auto_connect);
        assert_eq!(config.display_name(), "plant-a");
    }
}
