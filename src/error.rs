use std::fmt;

use thiserror::Error;

use crate::store::TenantId;

/// Operation that produced a wrapped failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Get,
    List,
    Update,
    Delete,
    LastModified,
    StorePassword,
    PrivateKeyPassword,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Add => "add",
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::LastModified => "last-modified",
            Operation::StorePassword => "store-password",
            Operation::PrivateKeyPassword => "private-key-password",
        };
        f.write_str(s)
    }
}

/// Coarse classification of a [`KeyStoreError`], looking through context wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    DuplicateKeyStore,
    NotFound,
    Conflict,
    Crypto,
    Timeout,
    Storage,
    Codec,
    Config,
    Io,
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("Invalid input: {detail}")]
    Validation { detail: String },

    #[error("Key store '{name}' already exists for tenant {tenant_id}")]
    DuplicateKeyStore { tenant_id: TenantId, name: String },

    #[error("Key store '{name}' not found for tenant {tenant_id}")]
    NotFound { tenant_id: TenantId, name: String },

    #[error("Concurrent modification of key store '{name}' (tenant {tenant_id}): {detail}")]
    Conflict {
        tenant_id: TenantId,
        name: String,
        detail: String,
    },

    #[error("Sealed data could not be processed: {reason}")]
    Crypto { reason: String },

    #[error("Timed out after {waited_ms} ms waiting for key store '{name}' (tenant {tenant_id})")]
    Timeout {
        tenant_id: TenantId,
        name: String,
        waited_ms: u64,
    },

    #[error("Storage error: {reason}")]
    Storage { reason: String },

    #[error("Key store container error: {reason}")]
    Codec { reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{op} of key store '{name}' (tenant {tenant_id}) failed: {source}")]
    Operation {
        op: Operation,
        tenant_id: TenantId,
        name: String,
        #[source]
        source: Box<KeyStoreError>,
    },
}

impl KeyStoreError {
    pub fn validation(detail: impl Into<String>) -> Self {
        KeyStoreError::Validation {
            detail: detail.into(),
        }
    }

    pub fn crypto(reason: impl Into<String>) -> Self {
        KeyStoreError::Crypto {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        KeyStoreError::Storage {
            reason: reason.into(),
        }
    }

    pub fn codec(reason: impl Into<String>) -> Self {
        KeyStoreError::Codec {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            KeyStoreError::Validation { .. } => ErrorKind::Validation,
            KeyStoreError::DuplicateKeyStore { .. } => ErrorKind::DuplicateKeyStore,
            KeyStoreError::NotFound { .. } => ErrorKind::NotFound,
            KeyStoreError::Conflict { .. } => ErrorKind::Conflict,
            KeyStoreError::Crypto { .. } => ErrorKind::Crypto,
            KeyStoreError::Timeout { .. } => ErrorKind::Timeout,
            KeyStoreError::Storage { .. } => ErrorKind::Storage,
            KeyStoreError::Codec { .. } => ErrorKind::Codec,
            KeyStoreError::Config(_) => ErrorKind::Config,
            KeyStoreError::Io(_) => ErrorKind::Io,
            KeyStoreError::Operation { source, .. } => source.kind(),
        }
    }

    /// Attach operation context to crypto, storage, codec and I/O failures.
    /// Caller-facing errors (validation, not-found, duplicate, conflict, timeout)
    /// pass through untouched.
    pub fn in_operation(self, op: Operation, tenant_id: TenantId, name: &str) -> Self {
        match self.kind() {
            ErrorKind::Crypto | ErrorKind::Storage | ErrorKind::Codec | ErrorKind::Io
                if !matches!(self, KeyStoreError::Operation { .. }) =>
            {
                KeyStoreError::Operation {
                    op,
                    tenant_id,
                    name: name.to_string(),
                    source: Box::new(self),
                }
            }
            _ => self,
        }
    }
}
