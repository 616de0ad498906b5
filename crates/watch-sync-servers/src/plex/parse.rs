//! Plex `MediaContainer` JSON to [`MediaRef`].

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use watch_sync_models::{MediaKind, MediaRef, Provider, ProviderIds, Section, SectionKind, ServerKind};

/// Which feed a metadata entry came from; history rows carry `viewedAt`
/// instead of per-user counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Feed {
    Library,
    History,
}

pub(crate) fn metadata(body: &Value) -> &[Value] {
    body.pointer("/MediaContainer/Metadata")
        .and_then(|m| m.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

pub(crate) fn directories(body: &Value) -> &[Value] {
    body.pointer("/MediaContainer/Directory")
        .and_then(|m| m.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// A section plus the metadata agent its manual-match endpoint expects.
pub(crate) fn parse_section(dir: &Value) -> Option<(Section, String)> {
    let key = string_field(dir, "key")?;
    let title = string_field(dir, "title").unwrap_or_default();
    let kind = match dir.get("type").and_then(|t| t.as_str()) {
        Some("movie") => SectionKind::Movies,
        Some("show") => SectionKind::Shows,
        _ => SectionKind::Other,
    };
    let agent = string_field(dir, "agent").unwrap_or_default();
    Some((Section::new(key, title, kind), agent))
}

pub(crate) fn parse_item(item: &Value, feed: Feed) -> Option<MediaRef> {
    let id = string_field(item, "ratingKey")?;
    let title = string_field(item, "title").unwrap_or_default();
    let kind = match item.get("type").and_then(|t| t.as_str())? {
        "movie" => MediaKind::Movie,
        "show" => MediaKind::Show,
        "episode" => MediaKind::Episode {
            season: u32_field(item, "parentIndex")?,
            episode: u32_field(item, "index")?,
        },
        _ => return None,
    };

    let mut media = MediaRef::new(ServerKind::Plex, kind, id, title);
    media.ids = parse_guids(item.get("Guid").unwrap_or(&Value::Null));
    media.duration = u64_field(item, "duration");
    let last_viewed = parse_timestamp(item.get("lastViewedAt"));

    match kind {
        MediaKind::Show => {
            let leaves = u64_field(item, "leafCount").unwrap_or(0);
            let viewed = u64_field(item, "viewedLeafCount").unwrap_or(0);
            if leaves > 0 && viewed >= leaves {
                media.played = true;
                media.last_played_at = last_viewed;
            } else if viewed > 0 || u64_field(item, "viewCount").unwrap_or(0) > 0 {
                media.last_playing_at = last_viewed.or(Some(DateTime::<Utc>::MIN_UTC));
            }
        }
        _ => {
            if feed == Feed::History {
                media.played = true;
                media.last_played_at = parse_timestamp(item.get("viewedAt")).or(last_viewed);
            } else if u64_field(item, "viewCount").unwrap_or(0) > 0 {
                media.played = true;
                media.last_played_at = last_viewed;
            }
            if let Some(offset) = u64_field(item, "viewOffset").filter(|o| *o > 0) {
                media.resume_offset = Some(offset);
                media.last_playing_at = last_viewed;
            }
            if let MediaKind::Episode { .. } = kind {
                media.show_id = string_field(item, "grandparentRatingKey")
                    .or_else(|| string_field(item, "grandparentKey").and_then(|k| last_segment(&k)));
                media.show_title = string_field(item, "grandparentTitle");
                if let (Some(show), Some((season, episode))) = (&media.show_title, kind.episode_number()) {
                    media.title = format!("{} S{:02}E{:02}", show, season, episode);
                }
            }
        }
    }

    Some(media)
}

/// Provider ids from a `Guid` array such as `[{"id": "tmdb://603"}, {"id": "imdb://tt0133093"}]`.
///
/// Legacy agent guids (`com.plexapp.agents.imdb://tt0133093?lang=en`) are accepted too.
pub(crate) fn parse_guids(guids: &Value) -> ProviderIds {
    let mut ids = ProviderIds::default();
    let raw: Vec<&str> = match guids {
        Value::Array(items) => items
            .iter()
            .filter_map(|g| g.get("id").and_then(|i| i.as_str()).or_else(|| g.as_str()))
            .collect(),
        Value::Object(obj) => obj.get("id").and_then(|i| i.as_str()).into_iter().collect(),
        Value::String(s) => vec![s.as_str()],
        _ => Vec::new(),
    };

    for guid in raw {
        for provider in Provider::PREFERENCE {
            if ids.get(provider).is_some() {
                continue;
            }
            if let Some(id) = parse_provider_guid(guid, provider) {
                ids.set(provider, id);
            }
        }
    }
    ids
}

fn parse_provider_guid(guid: &str, provider: Provider) -> Option<String> {
    let marker = format!("{}://", provider.as_str());
    let start = guid.find(&marker)? + marker.len();
    let id = guid[start..]
        .split(|c| c == '?' || c == '&')
        .next()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())?;

    let valid = match provider {
        Provider::Imdb => id.starts_with("tt") && id.len() >= 9 && id[2..].chars().all(|c| c.is_ascii_digit()),
        Provider::Tmdb | Provider::Tvdb => id.chars().all(|c| c.is_ascii_digit()),
    };
    valid.then(|| id.to_string())
}

/// Guid string a section's `all?guid=` filter or the match endpoint accepts.
pub(crate) fn provider_guid(provider: Provider, id: &str) -> String {
    format!("{}://{}", provider.as_str(), id)
}

pub(crate) fn parse_timestamp(timestamp: Option<&Value>) -> Option<DateTime<Utc>> {
    timestamp
        .and_then(|t| t.as_i64().or_else(|| t.as_str().and_then(|s| s.parse().ok())))
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn u64_field(item: &Value, key: &str) -> Option<u64> {
    let value = item.get(key)?;
    value.as_u64().or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn u32_field(item: &Value, key: &str) -> Option<u32> {
    u64_field(item, key).and_then(|v| u32::try_from(v).ok())
}

fn last_segment(key: &str) -> Option<String> {
    key.trim_end_matches('/').rsplit('/').next().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_guids_modern_and_legacy() {
        let ids = parse_guids(&json!([
            {"id": "imdb://tt0133093"},
            {"id": "tmdb://603"},
            {"id": "tvdb://169"}
        ]));
        assert_eq!(ids.tmdb.as_deref(), Some("603"));
        assert_eq!(ids.imdb.as_deref(), Some("tt0133093"));
        assert_eq!(ids.tvdb.as_deref(), Some("169"));

        let ids = parse_guids(&json!("com.plexapp.agents.imdb://tt0133093?lang=en"));
        assert_eq!(ids.imdb.as_deref(), Some("tt0133093"));
        assert!(ids.tmdb.is_none());

        assert!(parse_guids(&json!([{"id": "plex://movie/5d776b5e1e5c36001f8e9b8a"}])).is_empty());
    }

    #[test]
    fn test_parse_movie_in_progress() {
        let item = json!({
            "ratingKey": "1109",
            "type": "movie",
            "title": "The Matrix",
            "viewOffset": 600000,
            "duration": 8160000,
            "lastViewedAt": 1700000000,
            "Guid": [{"id": "tmdb://603"}]
        });
        let movie = parse_item(&item, Feed::Library).unwrap();
        assert_eq!(movie.id, "1109");
        assert!(!movie.played);
        assert_eq!(movie.resume_offset, Some(600_000));
        assert_eq!(movie.last_playing_at, Utc.timestamp_opt(1_700_000_000, 0).single());
        assert_eq!(movie.ids.tmdb.as_deref(), Some("603"));
    }

    #[test]
    fn test_parse_history_episode() {
        let item = json!({
            "ratingKey": "2500",
            "type": "episode",
            "title": "Pilot",
            "grandparentTitle": "Breaking Bad",
            "grandparentKey": "/library/metadata/2498",
            "parentIndex": 1,
            "index": 1,
            "viewedAt": 1700000500
        });
        let ep = parse_item(&item, Feed::History).unwrap();
        assert!(ep.played);
        assert_eq!(ep.kind, MediaKind::Episode { season: 1, episode: 1 });
        assert_eq!(ep.show_id.as_deref(), Some("2498"));
        assert_eq!(ep.title, "Breaking Bad S01E01");
        assert_eq!(ep.last_played_at, Utc.timestamp_opt(1_700_000_500, 0).single());
    }

    #[test]
    fn test_parse_show_progress() {
        let partly = json!({"ratingKey": "7", "type": "show", "title": "Dark", "leafCount": 26, "viewedLeafCount": 3, "lastViewedAt": 1700000000});
        let show = parse_item(&partly, Feed::Library).unwrap();
        assert!(!show.played);
        assert!(show.is_touched());

        let done = json!({"ratingKey": "7", "type": "show", "title": "Dark", "leafCount": 26, "viewedLeafCount": 26});
        assert!(parse_item(&done, Feed::Library).unwrap().played);

        let fresh = json!({"ratingKey": "7", "type": "show", "title": "Dark", "leafCount": 26});
        assert!(!parse_item(&fresh, Feed::Library).unwrap().is_touched());
    }

    #[test]
    fn test_unknown_types_are_skipped() {
        assert!(parse_item(&json!({"ratingKey": "1", "type": "track", "title": "x"}), Feed::Library).is_none());
        assert!(parse_item(&json!({"type": "movie", "title": "x"}), Feed::Library).is_none());
    }

    #[test]
    fn test_parse_section_kinds() {
        let (section, agent) =
            parse_section(&json!({"key": "3", "type": "show", "title": "TV", "agent": "tv.plex.agents.series"})).unwrap();
        assert_eq!(section.kind, SectionKind::Shows);
        assert_eq!(agent, "tv.plex.agents.series");
        let (music, _) = parse_section(&json!({"key": "4", "type": "artist", "title": "Music"})).unwrap();
        assert!(!music.is_syncable());
    }
}
