//! Emby/Jellyfin `BaseItemDto` JSON to [`MediaRef`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use watch_sync_models::{MediaKind, MediaRef, Provider, ProviderIds, Section, SectionKind, ServerKind};

pub(crate) fn items(body: &Value) -> &[Value] {
    body.get("Items")
        .and_then(|m| m.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

pub(crate) fn parse_view(view: &Value) -> Option<Section> {
    let id = view.get("Id")?.as_str()?;
    let title = view.get("Name").and_then(|n| n.as_str()).unwrap_or_default();
    let kind = match view.get("CollectionType").and_then(|c| c.as_str()) {
        Some("movies") => SectionKind::Movies,
        Some("tvshows") => SectionKind::Shows,
        _ => SectionKind::Other,
    };
    Some(Section::new(id, title, kind))
}

pub(crate) fn parse_item(item: &Value, server_kind: ServerKind) -> Option<MediaRef> {
    let id = item.get("Id")?.as_str()?.to_string();
    let title = item.get("Name").and_then(|n| n.as_str()).unwrap_or_default().to_string();
    let kind = match item.get("Type").and_then(|t| t.as_str())? {
        "Movie" => MediaKind::Movie,
        "Series" => MediaKind::Show,
        "Episode" => MediaKind::Episode {
            season: u32_field(item, "ParentIndexNumber")?,
            episode: u32_field(item, "IndexNumber")?,
        },
        _ => return None,
    };

    let mut media = MediaRef::new(server_kind, kind, id, title);
    media.ids = parse_provider_ids(item.get("ProviderIds").unwrap_or(&Value::Null));
    media.duration = item.get("RunTimeTicks").and_then(|t| t.as_u64());

    let user_data = item.get("UserData").unwrap_or(&Value::Null);
    let played = user_data.get("Played").and_then(|p| p.as_bool()).unwrap_or(false);
    let last_played = parse_date(user_data.get("LastPlayedDate"));

    if played {
        media.played = true;
        media.last_played_at = last_played;
    }

    match kind {
        MediaKind::Show => {
            let percentage = user_data.get("PlayedPercentage").and_then(|p| p.as_f64()).unwrap_or(0.0);
            if !played && (percentage > 0.0 || last_played.is_some()) {
                media.last_playing_at = last_played.or(Some(DateTime::<Utc>::MIN_UTC));
            }
        }
        _ => {
            if let Some(ticks) = user_data
                .get("PlaybackPositionTicks")
                .and_then(|t| t.as_u64())
                .filter(|t| *t > 0)
            {
                media.resume_offset = Some(ticks);
                media.last_playing_at = last_played;
            }
            if let MediaKind::Episode { season, episode } = kind {
                media.show_id = item.get("SeriesId").and_then(|s| s.as_str()).map(str::to_string);
                media.show_title = item.get("SeriesName").and_then(|s| s.as_str()).map(str::to_string);
                if let Some(show) = &media.show_title {
                    media.title = format!("{} S{:02}E{:02}", show, season, episode);
                }
            }
        }
    }

    Some(media)
}

/// `{"Tmdb": "603", "Imdb": "tt0133093"}`; key casing varies between versions.
pub(crate) fn parse_provider_ids(value: &Value) -> ProviderIds {
    let mut ids = ProviderIds::default();
    let Some(map) = value.as_object() else {
        return ids;
    };
    for (key, id) in map {
        let Some(id) = id.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "tmdb" => ids.set(Provider::Tmdb, id),
            "imdb" => ids.set(Provider::Imdb, id),
            "tvdb" => ids.set(Provider::Tvdb, id),
            _ => {}
        }
    }
    ids
}

/// `AnyProviderIdEquals` filter value, e.g. `tmdb.603,imdb.tt0133093`.
pub(crate) fn provider_filter(ids: &ProviderIds) -> String {
    ids.iter()
        .map(|(provider, id)| format!("{}.{}", provider.as_str(), id))
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn parse_date(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn u32_field(item: &Value, key: &str) -> Option<u32> {
    item.get(key).and_then(|v| v.as_u64()).and_then(|v| u32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_played_movie() {
        let item = json!({
            "Id": "abc",
            "Name": "The Matrix",
            "Type": "Movie",
            "RunTimeTicks": 81600000000u64,
            "ProviderIds": {"Tmdb": "603", "imdb": "tt0133093"},
            "UserData": {"Played": true, "PlaybackPositionTicks": 0, "LastPlayedDate": "2024-01-15T20:31:12.0000000Z"}
        });
        let movie = parse_item(&item, ServerKind::Emby).unwrap();
        assert!(movie.played);
        assert_eq!(movie.resume_offset, None);
        assert_eq!(movie.last_played_at, Utc.with_ymd_and_hms(2024, 1, 15, 20, 31, 12).single());
        assert_eq!(movie.ids.tmdb.as_deref(), Some("603"));
        assert_eq!(movie.ids.imdb.as_deref(), Some("tt0133093"));
    }

    #[test]
    fn test_parse_resumable_episode() {
        let item = json!({
            "Id": "ep1",
            "Name": "Pilot",
            "Type": "Episode",
            "SeriesId": "s1",
            "SeriesName": "Breaking Bad",
            "ParentIndexNumber": 1,
            "IndexNumber": 2,
            "UserData": {"Played": false, "PlaybackPositionTicks": 500000, "LastPlayedDate": "2024-02-01T10:00:00Z"}
        });
        let ep = parse_item(&item, ServerKind::Jellyfin).unwrap();
        assert_eq!(ep.server_kind, ServerKind::Jellyfin);
        assert_eq!(ep.kind, MediaKind::Episode { season: 1, episode: 2 });
        assert_eq!(ep.resume_offset, Some(500_000));
        assert!(ep.last_playing_at.is_some());
        assert_eq!(ep.show_id.as_deref(), Some("s1"));
        assert_eq!(ep.title, "Breaking Bad S01E02");
    }

    #[test]
    fn test_series_in_progress() {
        let item = json!({"Id": "s1", "Name": "Dark", "Type": "Series", "UserData": {"Played": false, "PlayedPercentage": 12.5}});
        let show = parse_item(&item, ServerKind::Emby).unwrap();
        assert!(!show.played);
        assert!(show.is_touched());

        let item = json!({"Id": "s1", "Name": "Dark", "Type": "Series", "UserData": {"Played": false}});
        assert!(!parse_item(&item, ServerKind::Emby).unwrap().is_touched());
    }

    #[test]
    fn test_provider_filter() {
        let ids = ProviderIds::new().with_tvdb("81189").with_tmdb("1396");
        assert_eq!(provider_filter(&ids), "tmdb.1396,tvdb.81189");
    }

    #[test]
    fn test_views() {
        let view = parse_view(&json!({"Id": "v1", "Name": "Films", "CollectionType": "movies"})).unwrap();
        assert_eq!(view.kind, SectionKind::Movies);
        let mixed = parse_view(&json!({"Id": "v2", "Name": "Mixed"})).unwrap();
        assert_eq!(mixed.kind, SectionKind::Other);
    }
}
