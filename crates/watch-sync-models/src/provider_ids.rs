use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata providers used to match the same title across servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Tmdb,
    Imdb,
    Tvdb,
}

impl Provider {
    /// Matching preference order.
    pub const PREFERENCE: [Provider; 3] = [Provider::Tmdb, Provider::Imdb, Provider::Tvdb];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Tmdb => "tmdb",
            Provider::Imdb => "imdb",
            Provider::Tvdb => "tvdb",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External identifiers attached to a movie or show.
///
/// Values are kept as the provider spells them (`tt0133093` for IMDB, bare
/// digits for TMDB and TVDB) so they can be sent back to any server unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<String>,
}

impl ProviderIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tmdb(mut self, id: impl Into<String>) -> Self {
        self.tmdb = Some(id.into());
        self
    }

    pub fn with_imdb(mut self, id: impl Into<String>) -> Self {
        self.imdb = Some(id.into());
        self
    }

    pub fn with_tvdb(mut self, id: impl Into<String>) -> Self {
        self.tvdb = Some(id.into());
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Tmdb => self.tmdb.as_deref(),
            Provider::Imdb => self.imdb.as_deref(),
            Provider::Tvdb => self.tvdb.as_deref(),
        }
    }

    pub fn set(&mut self, provider: Provider, id: impl Into<String>) {
        let id = Some(id.into());
        match provider {
            Provider::Tmdb => self.tmdb = id,
            Provider::Imdb => self.imdb = id,
            Provider::Tvdb => self.tvdb = id,
        }
    }

    /// Available ids in preference order (tmdb, imdb, tvdb).
    pub fn iter(&self) -> impl Iterator<Item = (Provider, &str)> + '_ {
        Provider::PREFERENCE
            .iter()
            .filter_map(move |p| self.get(*p).map(|id| (*p, id)))
    }

    pub fn preferred(&self) -> Option<(Provider, &str)> {
        self.iter().next()
    }

    pub fn is_empty(&self) -> bool {
        self.tmdb.is_none() && self.imdb.is_none() && self.tvdb.is_none()
    }

    /// True when both sets carry the same value for at least one provider.
    pub fn shares_any(&self, other: &ProviderIds) -> bool {
        self.iter()
            .any(|(provider, id)| other.get(provider).is_some_and(|o| o.eq_ignore_ascii_case(id)))
    }

    /// Fill in ids missing from `self`; existing values are not overwritten.
    pub fn merge(&mut self, other: &ProviderIds) {
        if self.tmdb.is_none() {
            self.tmdb = other.tmdb.clone();
        }
        if self.imdb.is_none() {
            self.imdb = other.imdb.clone();
        }
        if self.tvdb.is_none() {
            self.tvdb = other.tvdb.clone();
        }
    }
}

impl fmt::Display for ProviderIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(p, id)| format!("{}:{}", p, id)).collect();
        if parts.is_empty() {
            f.write_str("<none>")
        } else {
            f.write_str(&parts.join(","))
        }
    }
}
