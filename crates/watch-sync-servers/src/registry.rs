use crate::MediaServer;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use watch_sync_models::ServerKind;

/// A live server plus the semaphore bounding concurrent work against it.
///
/// Clones share the semaphore, so every task pairing this server draws from
/// the same budget.
#[derive(Clone)]
pub struct ServerHandle {
    server: Arc<dyn MediaServer>,
    limiter: Arc<Semaphore>,
}

impl ServerHandle {
    pub fn new(server: Arc<dyn MediaServer>, concurrency: usize) -> Self {
        Self {
            server,
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn server(&self) -> &Arc<dyn MediaServer> {
        &self.server
    }

    pub fn name(&self) -> &str {
        self.server.name()
    }

    pub fn kind(&self) -> ServerKind {
        self.server.kind()
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.limiter.clone().acquire_owned().await
    }

    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("available_permits", &self.available_permits())
            .finish()
    }
}

/// Live servers by configured name.
#[derive(Clone, Default)]
pub struct ServerRegistry {
    servers: HashMap<String, ServerHandle>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ServerHandle) {
        self.servers.insert(handle.name().to_string(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&ServerHandle> {
        self.servers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.servers.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryServer;

    #[tokio::test]
    async fn test_handles_share_the_limiter() {
        let handle = ServerHandle::new(Arc::new(MemoryServer::new("plex", ServerKind::Plex)), 2);
        let clone = handle.clone();
        assert!(Arc::ptr_eq(handle.server(), clone.server()));

        let _a = handle.acquire().await.unwrap();
        let _b = clone.acquire().await.unwrap();
        assert_eq!(handle.available_permits(), 0);
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ServerRegistry::new();
        registry.insert(ServerHandle::new(Arc::new(MemoryServer::new("b", ServerKind::Emby)), 1));
        registry.insert(ServerHandle::new(Arc::new(MemoryServer::new("a", ServerKind::Plex)), 1));
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get("b").unwrap().kind(), ServerKind::Emby);
        assert!(registry.get("c").is_none());
    }
}
