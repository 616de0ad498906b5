pub mod emby;
pub mod error;
pub mod factory;
mod http;
#[cfg(any(test, feature = "memory-server"))]
pub mod memory;
pub mod plex;
pub mod registry;
pub mod retry;
pub mod traits;

pub use emby::{EmbyCredentials, EmbyFlavor, EmbyServer};
pub use error::ServerError;
pub use factory::{ServerFactory, ServerFactoryRegistry};
#[cfg(any(test, feature = "memory-server"))]
pub use memory::{MemoryServer, Mutation};
pub use plex::PlexServer;
pub use registry::{ServerHandle, ServerRegistry};
pub use traits::MediaServer;
