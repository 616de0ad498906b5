//! Cross-server identity resolution through provider ids.

use tracing::{debug, warn};
use watch_sync_models::{MediaKind, MediaRef, ProviderIds};
use watch_sync_servers::{MediaServer, ServerError};

/// Items on `target` carrying any of `ids` and of the same class as `kind`.
///
/// An empty id set matches nothing. Results of another class (a show when a
/// movie was asked for) are dropped.
pub async fn resolve(
    ids: &ProviderIds,
    kind: MediaKind,
    target: &dyn MediaServer,
) -> Result<Vec<MediaRef>, ServerError> {
    if ids.is_empty() {
        warn!(
            operation = "identity_skip",
            server = %target.name(),
            "No provider ids to match on"
        );
        return Ok(Vec::new());
    }

    let found = target.guid_search(ids).await?;
    let total = found.len();
    let compatible: Vec<MediaRef> = found.into_iter().filter(|m| m.kind.same_class(&kind)).collect();
    if compatible.len() < total {
        debug!(
            server = %target.name(),
            ids = %ids,
            dropped = total - compatible.len(),
            "Dropped matches of another kind"
        );
    }
    Ok(compatible)
}

/// The single item on `target` that corresponds to `item` from `source`.
///
/// Movies and shows match on their own provider ids. Episodes match through
/// the owning show, then by season and episode number.
pub async fn counterpart(
    item: &MediaRef,
    source: &dyn MediaServer,
    target: &dyn MediaServer,
) -> Result<Option<MediaRef>, ServerError> {
    let Some((season, episode)) = item.kind.episode_number() else {
        let ids = if item.ids.is_empty() {
            // Feed rows (Plex history in particular) can omit guids
            debug!(server = %source.name(), item = %item, "Refetching item for provider ids");
            match source.fetch_item(item).await {
                Ok(full) => full.ids,
                Err(ServerError::NotFound { .. }) => item.ids.clone(),
                Err(e) => return Err(e),
            }
        } else {
            item.ids.clone()
        };
        let matches = resolve(&ids, item.kind, target).await?;
        if matches.is_empty() {
            log_unmatched(item, &ids, target);
        }
        return Ok(matches.into_iter().next());
    };

    let show = match source.show_of(item).await {
        Ok(show) => show,
        Err(ServerError::NotFound { .. }) => {
            warn!(
                operation = "identity_skip",
                server = %source.name(),
                item = %item,
                "Episode has no resolvable show"
            );
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let Some(target_show) = resolve(&show.ids, MediaKind::Show, target).await?.into_iter().next() else {
        log_unmatched(item, &show.ids, target);
        return Ok(None);
    };

    let found = target.episode(&target_show, season, episode).await?;
    if found.is_none() {
        debug!(
            server = %target.name(),
            item = %item,
            show = %target_show,
            "Episode missing on target"
        );
    }
    Ok(found)
}

fn log_unmatched(item: &MediaRef, ids: &ProviderIds, target: &dyn MediaServer) {
    if !ids.is_empty() {
        debug!(
            operation = "identity_unmatched",
            server = %target.name(),
            item = %item,
            ids = %ids,
            "No counterpart found"
        );
    }
}
