use async_trait::async_trait;
use watch_sync_models::{MediaRef, ProviderIds, Section, ServerKind, Ticks};
use crate::ServerError;

/// Operations the sync engine needs from a media server.
///
/// Implementations own HTTP, authentication and wire formats. Every returned
/// [`MediaRef`] is a fresh snapshot; nothing is cached between calls.
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Configured name of this server instance.
    fn name(&self) -> &str;

    fn kind(&self) -> ServerKind;

    /// Recently played items, most recent first, capped by the feed limit.
    async fn history(&self) -> Result<Vec<MediaRef>, ServerError>;

    /// Partially watched items, most recently touched first.
    async fn hub_continue(&self) -> Result<Vec<MediaRef>, ServerError>;

    /// Movies and shows carrying any of the given provider ids.
    async fn guid_search(&self, ids: &ProviderIds) -> Result<Vec<MediaRef>, ServerError>;

    async fn library(&self) -> Result<Vec<Section>, ServerError>;

    /// Top-level movies or shows of one section.
    async fn section_items(&self, section: &Section) -> Result<Vec<MediaRef>, ServerError>;

    async fn episodes(&self, show: &MediaRef) -> Result<Vec<MediaRef>, ServerError>;

    async fn episode(&self, show: &MediaRef, season: u32, episode: u32) -> Result<Option<MediaRef>, ServerError> {
        let episodes = self.episodes(show).await?;
        Ok(episodes
            .into_iter()
            .find(|ep| ep.kind.episode_number() == Some((season, episode))))
    }

    /// The show owning an episode, with provider ids populated.
    async fn show_of(&self, episode: &MediaRef) -> Result<MediaRef, ServerError>;

    /// Re-read an item, including its provider ids.
    async fn fetch_item(&self, item: &MediaRef) -> Result<MediaRef, ServerError>;

    async fn mark_watched(&self, item: &MediaRef) -> Result<(), ServerError>;

    /// Set the resume position; the implementation converts to its native unit.
    async fn set_progress(&self, item: &MediaRef, offset: Ticks) -> Result<(), ServerError>;
}
