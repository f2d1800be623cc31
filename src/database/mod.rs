// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Database connections
//!
//! The migration executor talks to databases only through these traits.
//! Drivers implement [`ConnectionFactory`] and [`DatabaseConnection`];
//! [`ProviderRegistry`] dispatches on a connection's `provider` name.

mod echo;

pub use echo::EchoConnectionFactory;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::Connection;
use crate::errors::{SqlstageError, SqlstageResult};

/// Providers available without registering a driver
pub const BUILTIN_PROVIDERS: &[&str] = &["echo"];

/// An open or openable database connection
///
/// A connection carries at most one transaction at a time. Closing a
/// connection with a transaction still open must abandon that transaction.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Open the connection
    async fn open(&mut self) -> SqlstageResult<()>;

    /// Begin a transaction; subsequent statements run inside it
    async fn begin_transaction(&mut self) -> SqlstageResult<()>;

    /// Commit the open transaction
    async fn commit(&mut self) -> SqlstageResult<()>;

    /// Roll back the open transaction
    async fn rollback(&mut self) -> SqlstageResult<()>;

    /// Execute one batch, returning affected rows where the driver knows them
    async fn execute(&mut self, batch: &str) -> SqlstageResult<u64>;

    /// Release the connection
    async fn close(&mut self) -> SqlstageResult<()>;
}

/// Creates connections for connection descriptors
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create_connection(&self, descriptor: &Connection) -> SqlstageResult<Box<dyn DatabaseConnection>>;
}

/// Provider-specific connection tuning applied after open
#[async_trait]
pub trait ConnectionOptimizer: Send + Sync {
    async fn optimize(&self, connection: &mut dyn DatabaseConnection) -> SqlstageResult<()>;
}

/// Connection factory dispatching on the descriptor's provider
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ConnectionFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider writing to stdout
    pub fn with_builtin_providers() -> Self {
        let mut registry = Self::new();
        registry.register("echo", Arc::new(EchoConnectionFactory::stdout()));
        registry
    }

    /// Register a factory for a provider name
    pub fn register(&mut self, provider: &str, factory: Arc<dyn ConnectionFactory>) {
        self.factories.insert(provider.to_lowercase(), factory);
    }

    /// Whether a provider is registered
    pub fn supports(&self, provider: &str) -> bool {
        self.factories.contains_key(&provider.to_lowercase())
    }

    /// Registered provider names, sorted
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ConnectionFactory for ProviderRegistry {
    async fn create_connection(&self, descriptor: &Connection) -> SqlstageResult<Box<dyn DatabaseConnection>> {
        let factory = self
            .factories
            .get(&descriptor.provider.to_lowercase())
            .ok_or_else(|| SqlstageError::provider_not_supported(&descriptor.provider))?;

        factory.create_connection(descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(provider: &str) -> Connection {
        Connection {
            name: "main".into(),
            provider: provider.into(),
            connection_string: None,
            connection_string_env: None,
            default: true,
            module: None,
            package: None,
        }
    }

    #[tokio::test]
    async fn test_registry_dispatches_on_provider() {
        let registry = ProviderRegistry::with_builtin_providers();
        assert!(registry.supports("ECHO"));
        assert_eq!(registry.providers(), vec!["echo"]);
        assert!(registry.create_connection(&descriptor("echo")).await.is_ok());
    }

    #[tokio::test]
    async fn test_registry_rejects_unknown_provider() {
        let registry = ProviderRegistry::with_builtin_providers();
        let result = registry.create_connection(&descriptor("oracle")).await;
        assert!(matches!(
            result,
            Err(SqlstageError::ProviderNotSupported { provider, .. }) if provider == "oracle"
        ));
    }
}
