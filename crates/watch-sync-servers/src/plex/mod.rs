//! Plex Media Server client.

mod parse;

use crate::http::JsonClient;
use crate::{MediaServer, ServerError};
use async_trait::async_trait;
use parse::Feed;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, warn};
use watch_sync_models::{MediaRef, ProviderIds, Section, SectionKind, ServerKind, Ticks};

const LIBRARY_IDENTIFIER: &str = "com.plexapp.plugins.library";

pub struct PlexServer {
    name: String,
    http: JsonClient,
    history_limit: u32,
    no_headers: HeaderMap,
}

impl PlexServer {
    pub fn new(
        name: &str,
        url: &str,
        token: &str,
        timeout: Duration,
        retry_attempts: u32,
        history_limit: u32,
    ) -> Result<Self, ServerError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("x-plex-token"),
            HeaderValue::from_str(token).map_err(|_| ServerError::Auth {
                server: name.to_string(),
                message: "token contains invalid header characters".to_string(),
            })?,
        );
        headers.insert(
            HeaderName::from_static("x-plex-client-identifier"),
            HeaderValue::from_static("watchbridge"),
        );
        headers.insert(HeaderName::from_static("x-plex-product"), HeaderValue::from_static("watchbridge"));

        Ok(Self {
            name: name.to_string(),
            http: JsonClient::new(name, url, headers, timeout, retry_attempts)?,
            history_limit,
            no_headers: HeaderMap::new(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value, ServerError> {
        self.http.get(path, query, &self.no_headers).await
    }

    fn parse_all(&self, body: &serde_json::Value, feed: Feed) -> Vec<MediaRef> {
        parse::metadata(body)
            .iter()
            .filter_map(|item| parse::parse_item(item, feed))
            .collect()
    }

    async fn sections_with_agents(&self) -> Result<Vec<(Section, String)>, ServerError> {
        let body = self.get("/library/sections", &[]).await?;
        Ok(parse::directories(&body).iter().filter_map(parse::parse_section).collect())
    }

    async fn metadata(&self, id: &str) -> Result<MediaRef, ServerError> {
        let path = format!("/library/metadata/{}", id);
        let body = self.get(&path, &[("includeGuids", "1".to_string())]).await?;
        self.parse_all(&body, Feed::Library)
            .into_iter()
            .next()
            .ok_or_else(|| ServerError::NotFound {
                server: self.name.clone(),
                id: id.to_string(),
            })
    }

    /// Recently played items gathered per section, for servers where the
    /// account history endpoint is unavailable.
    async fn history_from_sections(&self) -> Result<Vec<MediaRef>, ServerError> {
        let mut items = Vec::new();
        for (section, _) in self.sections_with_agents().await? {
            let type_code = match section.kind {
                SectionKind::Movies => "1",
                SectionKind::Shows => "4",
                SectionKind::Other => continue,
            };
            let path = format!("/library/sections/{}/all", section.id);
            let query = [
                ("sort", "lastViewedAt:desc".to_string()),
                ("unwatched", "0".to_string()),
                ("type", type_code.to_string()),
                ("includeGuids", "1".to_string()),
                ("X-Plex-Container-Start", "0".to_string()),
                ("X-Plex-Container-Size", self.history_limit.to_string()),
            ];
            let body = self.get(&path, &query).await?;
            items.extend(self.parse_all(&body, Feed::Library).into_iter().filter(|m| m.played));
        }
        items.sort_by(|a, b| b.last_played_at.cmp(&a.last_played_at));
        items.truncate(self.history_limit as usize);
        Ok(items)
    }

    /// Resolve one external guid inside one section.
    ///
    /// Sections only filter on Plex's own guids, so the external id is first
    /// translated through the manual-match endpoint of any item in the section.
    async fn section_guid_search(
        &self,
        section: &Section,
        agent: &str,
        guid: &str,
    ) -> Result<Option<MediaRef>, ServerError> {
        let all_path = format!("/library/sections/{}/all", section.id);
        let probe = self
            .get(
                &all_path,
                &[
                    ("X-Plex-Container-Start", "0".to_string()),
                    ("X-Plex-Container-Size", "1".to_string()),
                ],
            )
            .await?;
        let Some(anchor) = self.parse_all(&probe, Feed::Library).into_iter().next() else {
            return Ok(None);
        };

        let matches_path = format!("/library/metadata/{}/matches", anchor.id);
        let matches = self
            .get(
                &matches_path,
                &[
                    ("manual", "1".to_string()),
                    ("title", guid.replace("://", "-")),
                    ("agent", agent.to_string()),
                ],
            )
            .await?;
        let plex_guid = matches
            .pointer("/MediaContainer/SearchResult/0/guid")
            .and_then(|g| g.as_str());
        let Some(plex_guid) = plex_guid else {
            return Ok(None);
        };

        let found = self
            .get(&all_path, &[("guid", plex_guid.to_string()), ("includeGuids", "1".to_string())])
            .await?;
        Ok(self.parse_all(&found, Feed::Library).into_iter().next())
    }
}

#[async_trait]
impl MediaServer for PlexServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ServerKind {
        ServerKind::Plex
    }

    async fn history(&self) -> Result<Vec<MediaRef>, ServerError> {
        let query = [
            ("sort", "viewedAt:desc".to_string()),
            ("accountID", "1".to_string()),
            ("includeGuids", "1".to_string()),
            ("X-Plex-Container-Start", "0".to_string()),
            ("X-Plex-Container-Size", self.history_limit.to_string()),
        ];
        match self.get("/status/sessions/history/all", &query).await {
            Ok(body) => {
                let items = self.parse_all(&body, Feed::History);
                if items.is_empty() {
                    warn!(server = %self.name, "Plex has no play history");
                }
                Ok(items)
            }
            Err(e @ ServerError::Status { .. }) | Err(e @ ServerError::Auth { .. }) => {
                debug!(server = %self.name, error = %e, "account history unavailable, reading sections");
                self.history_from_sections().await
            }
            Err(e) => Err(e),
        }
    }

    async fn hub_continue(&self) -> Result<Vec<MediaRef>, ServerError> {
        let body = self
            .get("/hubs/home/continueWatching", &[("includeGuids", "1".to_string())])
            .await?;
        let items = self.parse_all(&body, Feed::Library);
        if items.is_empty() {
            warn!(server = %self.name, "Plex has nothing in continue watching");
        }
        Ok(items)
    }

    async fn guid_search(&self, ids: &ProviderIds) -> Result<Vec<MediaRef>, ServerError> {
        let mut found = Vec::new();
        for (section, agent) in self.sections_with_agents().await? {
            if !section.is_syncable() {
                continue;
            }
            for (provider, id) in ids.iter() {
                let guid = parse::provider_guid(provider, id);
                if let Some(media) = self.section_guid_search(&section, &agent, &guid).await? {
                    found.push(media);
                    break;
                }
            }
        }
        Ok(found)
    }

    async fn library(&self) -> Result<Vec<Section>, ServerError> {
        Ok(self
            .sections_with_agents()
            .await?
            .into_iter()
            .map(|(section, _)| section)
            .collect())
    }

    async fn section_items(&self, section: &Section) -> Result<Vec<MediaRef>, ServerError> {
        let path = format!("/library/sections/{}/all", section.id);
        let body = self.get(&path, &[("includeGuids", "1".to_string())]).await?;
        Ok(self.parse_all(&body, Feed::Library))
    }

    async fn episodes(&self, show: &MediaRef) -> Result<Vec<MediaRef>, ServerError> {
        let path = format!("/library/metadata/{}/allLeaves", show.id);
        let body = self.get(&path, &[]).await?;
        Ok(self.parse_all(&body, Feed::Library))
    }

    async fn show_of(&self, episode: &MediaRef) -> Result<MediaRef, ServerError> {
        let show_id = episode.show_id.as_deref().ok_or_else(|| ServerError::NotFound {
            server: self.name.clone(),
            id: format!("show of {}", episode.id),
        })?;
        self.metadata(show_id).await
    }

    async fn fetch_item(&self, item: &MediaRef) -> Result<MediaRef, ServerError> {
        self.metadata(&item.id).await
    }

    async fn mark_watched(&self, item: &MediaRef) -> Result<(), ServerError> {
        let query = [
            ("identifier", LIBRARY_IDENTIFIER.to_string()),
            ("key", item.id.clone()),
        ];
        self.http.call(Method::GET, "/:/scrobble", &query, None, &self.no_headers).await
    }

    async fn set_progress(&self, item: &MediaRef, offset: Ticks) -> Result<(), ServerError> {
        let duration = match item.duration {
            Some(d) => d,
            None => self.metadata(&item.id).await?.duration.unwrap_or_default(),
        };
        let query = [
            ("ratingKey", item.id.clone()),
            ("key", format!("/library/metadata/{}", item.id)),
            ("identifier", LIBRARY_IDENTIFIER.to_string()),
            ("time", offset.from_canonical(ServerKind::Plex).to_string()),
            ("state", "stopped".to_string()),
            ("duration", duration.to_string()),
        ];
        self.http.call(Method::GET, "/:/timeline", &query, None, &self.no_headers).await
    }
}
