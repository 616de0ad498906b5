//! Emby and Jellyfin client.
//!
//! Jellyfin keeps Emby's item model and most of its routes; the flavor only
//! changes the base path, the authorization header and provider-id search.

mod parse;

use crate::http::JsonClient;
use crate::{MediaServer, ServerError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Method;
use serde_json::json;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use watch_sync_models::{MediaRef, ProviderIds, Section, ServerKind, Ticks};

const ITEM_FIELDS: &str = "UserData,ProviderIds,RunTimeTicks";
const CLIENT_NAME: &str = "watchbridge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbyFlavor {
    Emby,
    Jellyfin,
}

impl EmbyFlavor {
    pub fn server_kind(&self) -> ServerKind {
        match self {
            EmbyFlavor::Emby => ServerKind::Emby,
            EmbyFlavor::Jellyfin => ServerKind::Jellyfin,
        }
    }

    /// Emby serves its API under `/emby`; Jellyfin at the root.
    fn base_url(&self, url: &str) -> String {
        let url = url.trim_end_matches('/');
        match self {
            EmbyFlavor::Emby if !url.ends_with("/emby") => format!("{}/emby", url),
            _ => url.to_string(),
        }
    }
}

/// How the client proves who it is.
#[derive(Debug, Clone)]
pub enum EmbyCredentials {
    Login { username: String, password: String },
    Token { token: String, user_id: String },
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    user_id: String,
}

pub struct EmbyServer {
    name: String,
    flavor: EmbyFlavor,
    http: JsonClient,
    credentials: EmbyCredentials,
    session: OnceCell<Session>,
    history_limit: u32,
}

impl EmbyServer {
    pub fn new(
        name: &str,
        flavor: EmbyFlavor,
        url: &str,
        credentials: EmbyCredentials,
        timeout: Duration,
        retry_attempts: u32,
        history_limit: u32,
    ) -> Result<Self, ServerError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            name: name.to_string(),
            flavor,
            http: JsonClient::new(name, &flavor.base_url(url), headers, timeout, retry_attempts)?,
            credentials,
            session: OnceCell::new(),
            history_limit,
        })
    }

    fn client_header(&self, token: Option<&str>) -> String {
        let mut value = format!(
            "{} Client=\"{}\", Device=\"{}\", DeviceId=\"{}-{}\", Version=\"{}\"",
            match self.flavor {
                EmbyFlavor::Emby => "Emby",
                EmbyFlavor::Jellyfin => "MediaBrowser",
            },
            CLIENT_NAME,
            CLIENT_NAME,
            CLIENT_NAME,
            self.name,
            env!("CARGO_PKG_VERSION"),
        );
        if let Some(token) = token {
            value.push_str(&format!(", Token=\"{}\"", token));
        }
        value
    }

    fn headers(&self, token: Option<&str>) -> Result<HeaderMap, ServerError> {
        let invalid = |_| ServerError::Auth {
            server: self.name.clone(),
            message: "credentials contain invalid header characters".to_string(),
        };
        let mut headers = HeaderMap::new();
        let header_name = match self.flavor {
            EmbyFlavor::Emby => HeaderName::from_static("x-emby-authorization"),
            EmbyFlavor::Jellyfin => reqwest::header::AUTHORIZATION,
        };
        headers.insert(header_name, HeaderValue::from_str(&self.client_header(token)).map_err(invalid)?);
        if let (EmbyFlavor::Emby, Some(token)) = (self.flavor, token) {
            headers.insert(HeaderName::from_static("x-emby-token"), HeaderValue::from_str(token).map_err(invalid)?);
        }
        Ok(headers)
    }

    async fn session(&self) -> Result<&Session, ServerError> {
        self.session.get_or_try_init(|| self.login()).await
    }

    async fn login(&self) -> Result<Session, ServerError> {
        match &self.credentials {
            EmbyCredentials::Token { token, user_id } => Ok(Session {
                token: token.clone(),
                user_id: user_id.clone(),
            }),
            EmbyCredentials::Login { username, password } => {
                let body = json!({ "Username": username, "Pw": password });
                let response = self
                    .http
                    .post("/Users/AuthenticateByName", &[], Some(&body), &self.headers(None)?)
                    .await?
                    .unwrap_or_default();
                let token = response.get("AccessToken").and_then(|t| t.as_str());
                let user_id = response.pointer("/User/Id").and_then(|t| t.as_str());
                match (token, user_id) {
                    (Some(token), Some(user_id)) => {
                        info!(operation = "server_login", server = %self.name, user = %username, "Logged in");
                        Ok(Session {
                            token: token.to_string(),
                            user_id: user_id.to_string(),
                        })
                    }
                    _ => Err(ServerError::Auth {
                        server: self.name.clone(),
                        message: "login response carried no access token".to_string(),
                    }),
                }
            }
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value, ServerError> {
        let session = self.session().await?;
        self.http.get(path, query, &self.headers(Some(&session.token))?).await
    }

    fn parse_all(&self, body: &serde_json::Value) -> Vec<MediaRef> {
        parse::items(body)
            .iter()
            .filter_map(|item| parse::parse_item(item, self.flavor.server_kind()))
            .collect()
    }

    async fn user_items(&self, query: &[(&str, String)]) -> Result<Vec<MediaRef>, ServerError> {
        let user_id = self.session().await?.user_id.clone();
        let body = self.get(&format!("/Users/{}/Items", user_id), query).await?;
        Ok(self.parse_all(&body))
    }

    async fn item(&self, id: &str) -> Result<MediaRef, ServerError> {
        let user_id = self.session().await?.user_id.clone();
        let body = self.get(&format!("/Users/{}/Items/{}", user_id, id), &[]).await?;
        parse::parse_item(&body, self.flavor.server_kind()).ok_or_else(|| ServerError::NotFound {
            server: self.name.clone(),
            id: id.to_string(),
        })
    }
}

#[async_trait]
impl MediaServer for EmbyServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ServerKind {
        self.flavor.server_kind()
    }

    async fn history(&self) -> Result<Vec<MediaRef>, ServerError> {
        let items = self
            .user_items(&[
                ("IsPlayed", "true".to_string()),
                ("SortBy", "DatePlayed".to_string()),
                ("SortOrder", "Descending".to_string()),
                ("Recursive", "true".to_string()),
                ("IncludeItemTypes", "Movie,Episode".to_string()),
                ("Limit", self.history_limit.to_string()),
                ("Fields", ITEM_FIELDS.to_string()),
            ])
            .await?;
        if items.is_empty() {
            warn!(server = %self.name, "{} has no play history", self.flavor.server_kind());
        }
        Ok(items)
    }

    async fn hub_continue(&self) -> Result<Vec<MediaRef>, ServerError> {
        let user_id = self.session().await?.user_id.clone();
        let body = self
            .get(
                &format!("/Users/{}/Items/Resume", user_id),
                &[
                    ("Recursive", "true".to_string()),
                    ("MediaTypes", "Video".to_string()),
                    ("Limit", self.history_limit.to_string()),
                    ("Fields", ITEM_FIELDS.to_string()),
                ],
            )
            .await?;
        let items: Vec<MediaRef> = self
            .parse_all(&body)
            .into_iter()
            .filter(|m| m.last_playing_at.is_some())
            .collect();
        if items.is_empty() {
            warn!(server = %self.name, "{} has nothing in continue watching", self.flavor.server_kind());
        }
        Ok(items)
    }

    async fn guid_search(&self, ids: &ProviderIds) -> Result<Vec<MediaRef>, ServerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = vec![
            ("Recursive", "true".to_string()),
            ("IncludeItemTypes", "Movie,Series".to_string()),
            ("Fields", ITEM_FIELDS.to_string()),
        ];
        // Jellyfin dropped the provider-id filter, so it is matched client side
        if self.flavor == EmbyFlavor::Emby {
            query.push(("AnyProviderIdEquals", parse::provider_filter(ids)));
        }
        let items = self.user_items(&query).await?;
        Ok(items.into_iter().filter(|m| m.ids.shares_any(ids)).collect())
    }

    async fn library(&self) -> Result<Vec<Section>, ServerError> {
        let user_id = self.session().await?.user_id.clone();
        let body = self.get(&format!("/Users/{}/Views", user_id), &[]).await?;
        Ok(parse::items(&body).iter().filter_map(parse::parse_view).collect())
    }

    async fn section_items(&self, section: &Section) -> Result<Vec<MediaRef>, ServerError> {
        self.user_items(&[
            ("ParentId", section.id.clone()),
            ("Recursive", "true".to_string()),
            ("IncludeItemTypes", "Movie,Series".to_string()),
            ("Fields", ITEM_FIELDS.to_string()),
        ])
        .await
    }

    async fn episodes(&self, show: &MediaRef) -> Result<Vec<MediaRef>, ServerError> {
        let user_id = self.session().await?.user_id.clone();
        let body = self
            .get(
                &format!("/Shows/{}/Episodes", show.id),
                &[("UserId", user_id), ("Fields", ITEM_FIELDS.to_string())],
            )
            .await?;
        Ok(self.parse_all(&body))
    }

    async fn show_of(&self, episode: &MediaRef) -> Result<MediaRef, ServerError> {
        let show_id = episode.show_id.as_deref().ok_or_else(|| ServerError::NotFound {
            server: self.name.clone(),
            id: format!("series of {}", episode.id),
        })?;
        self.item(show_id).await
    }

    async fn fetch_item(&self, item: &MediaRef) -> Result<MediaRef, ServerError> {
        self.item(&item.id).await
    }

    async fn mark_watched(&self, item: &MediaRef) -> Result<(), ServerError> {
        let session = self.session().await?;
        let path = format!("/Users/{}/PlayedItems/{}", session.user_id, item.id);
        self.http
            .call(Method::POST, &path, &[], None, &self.headers(Some(&session.token))?)
            .await
    }

    /// Reports a short playback session that stops at the wanted position.
    async fn set_progress(&self, item: &MediaRef, offset: Ticks) -> Result<(), ServerError> {
        let session = self.session().await?;
        let headers = self.headers(Some(&session.token))?;
        let position = offset.from_canonical(self.flavor.server_kind());
        let body = json!({
            "ItemId": item.id,
            "PositionTicks": position,
            "PlaySessionId": format!("{}-{}", CLIENT_NAME, item.id),
            "CanSeek": true,
        });
        self.http.call(Method::POST, "/Sessions/Playing", &[], Some(&body), &headers).await?;
        self.http
            .call(Method::POST, "/Sessions/Playing/Stopped", &[], Some(&body), &headers)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emby_base_url_gains_suffix_once() {
        assert_eq!(EmbyFlavor::Emby.base_url("http://host:8096/"), "http://host:8096/emby");
        assert_eq!(EmbyFlavor::Emby.base_url("http://host:8096/emby"), "http://host:8096/emby");
        assert_eq!(EmbyFlavor::Jellyfin.base_url("http://host:8096/"), "http://host:8096");
    }

    #[test]
    fn test_authorization_header_per_flavor() {
        let creds = EmbyCredentials::Token {
            token: "tok".to_string(),
            user_id: "u1".to_string(),
        };
        let jf = EmbyServer::new("jf", EmbyFlavor::Jellyfin, "http://h", creds.clone(), Duration::from_secs(5), 1, 20)
            .unwrap();
        let headers = jf.headers(Some("tok")).unwrap();
        let auth = headers.get(reqwest::header::AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(auth.starts_with("MediaBrowser "));
        assert!(auth.contains("Token=\"tok\""));

        let emby = EmbyServer::new("emby", EmbyFlavor::Emby, "http://h", creds, Duration::from_secs(5), 1, 20).unwrap();
        let headers = emby.headers(Some("tok")).unwrap();
        assert_eq!(headers.get("x-emby-token").unwrap(), "tok");
        assert!(headers.get("x-emby-authorization").is_some());
    }
}
