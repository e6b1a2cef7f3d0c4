// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types for ua104-config.
//!
//! Every failure of reading, parsing, overriding or validating a gateway
//! configuration file ends up as a [`ConfigError`].

use std::path::PathBuf;

use thiserror::Error;
use ua104_core::error::MappingError;
use ua104_core::types::ServerId;
use ua104_iec104::Iec104Error;
use ua104_opcua::OpcUaError;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse config file '{path}': {message}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Two servers share an id.
    #[error("Duplicate server ID: {server_id}")]
    DuplicateServerId {
        /// The duplicated server ID.
        server_id: ServerId,
    },

    /// A mapping refers to a server that is not configured.
    #[error("Mapping {mapping_id} refers to unknown server '{server_id}'")]
    UnknownServer {
        /// Offending mapping.
        mapping_id: u64,
        /// The missing server.
        server_id: ServerId,
    },

    /// Mapping table invariant violated.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Invalid server entry.
    #[error("Invalid server '{server_id}': {source}")]
    Server {
        /// Offending server.
        server_id: ServerId,
        /// What the OPC UA layer rejected.
        #[source]
        source: OpcUaError,
    },

    /// Invalid station section.
    #[error("Invalid station: {0}")]
    Station(#[source] Iec104Error),

    /// Placeholder without a value or default.
    #[error("Environment variable not found: {name}")]
    EnvVarNotFound {
        /// The environment variable name.
        name: String,
    },

    /// Invalid environment variable value.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// The environment variable name.
        name: String,
        /// Error message.
        message: String,
    },

    /// Unsupported configuration format.
    #[error("Unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The unsupported format.
        format: String,
    },

    /// Serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a file-not-found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns true if the error comes from the file system rather than
    /// the file's content.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::FileNotFound { .. })
    }

    /// Returns true if the content parsed but failed validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::DuplicateServerId { .. }
                | Self::UnknownServer { .. }
                | Self::Mapping(_)
                | Self::Server { .. }
                | Self::Station(_)
        )
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Parse { .. } | Self::Serialization { .. } | Self::UnsupportedFormat { .. } => "parse",
            Self::Io { .. } | Self::FileNotFound { .. } => "io",
            Self::EnvVarNotFound { .. } | Self::InvalidEnvVar { .. } => "environment",
            _ => "validation",
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::validation("station.k", "must be at least 1");
        assert_eq!(err.to_string(), "Validation failed for 'station.k': must be at least 1");

        let err = ConfigError::DuplicateServerId {
            server_id: ServerId::new("plant"),
        };
        assert!(err.to_string().contains("plant"));
    }

    #[test]
    fn test_error_classification() {
        assert!(ConfigError::file_not_found("/nope.yaml").is_io());
        assert!(ConfigError::validation("x", "y").is_validation());
        assert!(!ConfigError::unsupported_format("ini").is_validation());
        assert_eq!(ConfigError::unsupported_format("ini").category(), "parse");
        assert_eq!(ConfigError::invalid_env_var("UA104_X", "bad").category(), "environment");
        assert_eq!(
            ConfigError::Mapping(MappingError::DuplicateId(ua104_core::types::MappingId::new(1))).category(),
            "validation"
        );
    }
}
