/// Server factory pattern for creating media servers from configuration
///
/// Each server type registers one factory; the registry turns the
/// `[[servers]]` section of the config into live, rate-limited handles.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use watch_sync_config::{Config, RuntimeConfig, ServerConfig};
use watch_sync_models::ServerKind;
use crate::{MediaServer, ServerHandle, ServerRegistry};

/// Factory trait for creating servers of one kind
pub trait ServerFactory: Send + Sync {
    fn kind(&self) -> ServerKind;

    /// Build a client; no network traffic happens until the first call
    fn create_server(&self, server: &ServerConfig, runtime: &RuntimeConfig) -> Result<Arc<dyn MediaServer>>;

    fn validate_config(&self, server: &ServerConfig) -> Result<()> {
        server.validate()
    }
}

pub struct ServerFactoryRegistry {
    factories: HashMap<ServerKind, Box<dyn ServerFactory>>,
}

impl ServerFactoryRegistry {
    /// Create a new registry with all built-in factories registered
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };

        registry.register(Box::new(plex::PlexServerFactory));
        registry.register(Box::new(emby::EmbyServerFactory::emby()));
        registry.register(Box::new(emby::EmbyServerFactory::jellyfin()));

        registry
    }

    pub fn register(&mut self, factory: Box<dyn ServerFactory>) {
        self.factories.insert(factory.kind(), factory);
    }

    pub fn create_server(&self, server: &ServerConfig, runtime: &RuntimeConfig) -> Result<Arc<dyn MediaServer>> {
        let factory = self
            .factories
            .get(&server.kind)
            .ok_or_else(|| anyhow::anyhow!("No factory registered for server type {}", server.kind))?;
        factory.validate_config(server)?;
        factory.create_server(server, runtime)
    }

    /// Build a handle for every configured server
    pub fn build_registry(&self, config: &Config) -> Result<ServerRegistry> {
        let mut registry = ServerRegistry::new();
        for server in &config.servers {
            let instance = self.create_server(server, &config.runtime)?;
            let concurrency = server.concurrency(&config.runtime);
            info!(
                operation = "server_registered",
                server = %server.name,
                kind = %server.kind,
                concurrency,
                "Registered media server"
            );
            registry.insert(ServerHandle::new(instance, concurrency));
        }
        Ok(registry)
    }

    pub fn validate_all_configs(&self, config: &Config) -> Result<()> {
        for server in &config.servers {
            let factory = self
                .factories
                .get(&server.kind)
                .ok_or_else(|| anyhow::anyhow!("No factory registered for server type {}", server.kind))?;
            factory.validate_config(server)?;
        }
        Ok(())
    }

    pub fn registered_kinds(&self) -> Vec<ServerKind> {
        self.factories.keys().copied().collect()
    }
}

impl Default for ServerFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

mod plex {
    use super::*;
    use crate::PlexServer;

    pub struct PlexServerFactory;

    impl ServerFactory for PlexServerFactory {
        fn kind(&self) -> ServerKind {
            ServerKind::Plex
        }

        fn create_server(&self, server: &ServerConfig, runtime: &RuntimeConfig) -> Result<Arc<dyn MediaServer>> {
            let token = server
                .token
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Plex server '{}' has no token configured", server.name))?;
            let client = PlexServer::new(
                &server.name,
                &server.url,
                token,
                runtime.request_timeout(),
                runtime.retry_attempts,
                runtime.history_limit,
            )?;
            Ok(Arc::new(client))
        }
    }
}

mod emby {
    use super::*;
    use crate::{EmbyCredentials, EmbyFlavor, EmbyServer};

    pub struct EmbyServerFactory {
        flavor: EmbyFlavor,
    }

    impl EmbyServerFactory {
        pub fn emby() -> Self {
            Self { flavor: EmbyFlavor::Emby }
        }

        pub fn jellyfin() -> Self {
            Self {
                flavor: EmbyFlavor::Jellyfin,
            }
        }
    }

    impl ServerFactory for EmbyServerFactory {
        fn kind(&self) -> ServerKind {
            self.flavor.server_kind()
        }

        fn create_server(&self, server: &ServerConfig, runtime: &RuntimeConfig) -> Result<Arc<dyn MediaServer>> {
            // A username/password pair wins over a token so the session user is known
            let credentials = match (&server.username, &server.password, &server.token, &server.user_id) {
                (Some(username), Some(password), _, _) => EmbyCredentials::Login {
                    username: username.clone(),
                    password: password.clone(),
                },
                (_, _, Some(token), Some(user_id)) => EmbyCredentials::Token {
                    token: token.clone(),
                    user_id: user_id.clone(),
                },
                _ => {
                    return Err(anyhow::anyhow!(
                        "{} server '{}' needs username and password, or token and user_id",
                        server.kind,
                        server.name
                    ))
                }
            };
            let client = EmbyServer::new(
                &server.name,
                self.flavor,
                &server.url,
                credentials,
                runtime.request_timeout(),
                runtime.retry_attempts,
                runtime.history_limit,
            )?;
            Ok(Arc::new(client))
        }
    }
}
