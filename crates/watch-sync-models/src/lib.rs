pub mod media;
pub mod provider_ids;
pub mod server;
pub mod units;

pub use media::{MediaKind, MediaRef, Section, SectionKind};
pub use provider_ids::{Provider, ProviderIds};
pub use server::{ServerFamily, ServerKind};
pub use units::{Precision, Ticks, TICKS_PER_MILLISECOND};
