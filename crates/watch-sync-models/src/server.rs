use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The media server products a task can pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Plex,
    Emby,
    Jellyfin,
}

/// Servers sharing one wire dialect and one playback unit.
///
/// Jellyfin is a fork of Emby and keeps its item model, so both belong to the
/// Emby family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerFamily {
    Plex,
    Emby,
}

impl ServerKind {
    pub fn family(&self) -> ServerFamily {
        match self {
            ServerKind::Plex => ServerFamily::Plex,
            ServerKind::Emby | ServerKind::Jellyfin => ServerFamily::Emby,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Plex => "plex",
            ServerKind::Emby => "emby",
            ServerKind::Jellyfin => "jellyfin",
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plex" => Ok(ServerKind::Plex),
            "emby" => Ok(ServerKind::Emby),
            "jellyfin" => Ok(ServerKind::Jellyfin),
            other => Err(format!("Unknown server type: {}. Use 'plex', 'emby' or 'jellyfin'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jellyfin_is_emby_family() {
        assert_eq!(ServerKind::Jellyfin.family(), ServerFamily::Emby);
        assert_eq!(ServerKind::Emby.family(), ServerFamily::Emby);
        assert_eq!(ServerKind::Plex.family(), ServerFamily::Plex);
    }

    #[test]
    fn test_parse_server_kind() {
        assert_eq!("Plex".parse::<ServerKind>().unwrap(), ServerKind::Plex);
        assert_eq!("jellyfin".parse::<ServerKind>().unwrap(), ServerKind::Jellyfin);
        assert!("kodi".parse::<ServerKind>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ServerKind::Emby).unwrap();
        assert_eq!(json, "\"emby\"");
        let kind: ServerKind = serde_json::from_str("\"jellyfin\"").unwrap();
        assert_eq!(kind, ServerKind::Jellyfin);
    }
}
