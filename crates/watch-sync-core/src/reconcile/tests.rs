use super::*;
use chrono::{DateTime, TimeZone, Utc};
use watch_sync_models::{ProviderIds, ServerKind};
use watch_sync_servers::{MemoryServer, Mutation};

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 2, 19, minute, 0).unwrap()
}

fn pair(a_kind: ServerKind, b_kind: ServerKind) -> (Arc<MemoryServer>, Arc<MemoryServer>, Reconciler) {
    let a = Arc::new(MemoryServer::new("a", a_kind));
    let b = Arc::new(MemoryServer::new("b", b_kind));
    let reconciler = Reconciler::new("test", ServerHandle::new(a.clone(), 4), ServerHandle::new(b.clone(), 4));
    (a, b, reconciler)
}

fn heat() -> ProviderIds {
    ProviderIds::new().with_tmdb("949").with_imdb("tt0113277")
}

#[tokio::test]
async fn test_played_movie_marks_target_only() {
    let (plex, emby, reconciler) = pair(ServerKind::Plex, ServerKind::Emby);
    let source = plex.add_item(MediaRef::movie(ServerKind::Plex, "1", "Heat").with_ids(heat()).with_played(at(5)));
    emby.add_item(MediaRef::movie(ServerKind::Emby, "m1", "Heat").with_ids(heat()));

    let report = reconciler.reconcile_full(&source).await.unwrap();
    assert_eq!(report.mutations, 1);
    assert_eq!(emby.mutations(), vec![Mutation::MarkWatched("m1".into())]);
    assert_eq!(plex.mutation_count(), 0);
}

#[tokio::test]
async fn test_show_episode_progress_pushed() {
    let (emby, jelly, reconciler) = pair(ServerKind::Emby, ServerKind::Jellyfin);
    let ids = ProviderIds::new().with_tvdb("81189");

    let show = emby.add_item(MediaRef::show(ServerKind::Emby, "s", "Breaking Bad").with_ids(ids.clone()));
    emby.add_episode(MediaRef::episode(ServerKind::Emby, "s-201", &show, 2, 1));
    emby.add_episode(MediaRef::episode(ServerKind::Emby, "s-203", &show, 2, 3).with_progress(500_000, at(10)));
    emby.add_episode(MediaRef::episode(ServerKind::Emby, "s-204", &show, 2, 4));

    let other = jelly.add_item(MediaRef::show(ServerKind::Jellyfin, "j", "Breaking Bad").with_ids(ids));
    jelly.add_episode(MediaRef::episode(ServerKind::Jellyfin, "j-201", &other, 2, 1));
    jelly.add_episode(MediaRef::episode(ServerKind::Jellyfin, "j-203", &other, 2, 3).with_progress(300_000, at(3)));
    jelly.add_episode(MediaRef::episode(ServerKind::Jellyfin, "j-301", &other, 3, 1));

    let report = reconciler.reconcile_full(&show).await.unwrap();
    assert_eq!(report.mutations, 1);
    assert_eq!(jelly.mutations(), vec![Mutation::SetProgress("j-203".into(), Ticks(500_000))]);
    assert_eq!(emby.mutation_count(), 0);
}

#[tokio::test]
async fn test_untouched_show_issues_nothing() {
    let (plex, emby, reconciler) = pair(ServerKind::Plex, ServerKind::Emby);
    let ids = ProviderIds::new().with_tvdb("1");
    let show = plex.add_item(MediaRef::show(ServerKind::Plex, "10", "Dark").with_ids(ids.clone()));
    plex.add_episode(MediaRef::episode(ServerKind::Plex, "11", &show, 1, 1));
    let other = emby.add_item(MediaRef::show(ServerKind::Emby, "d", "Dark").with_ids(ids));
    emby.add_episode(MediaRef::episode(ServerKind::Emby, "d1", &other, 1, 1));

    let report = reconciler.reconcile_full(&show).await.unwrap();
    assert_eq!(report, UnitReport::default());
    assert_eq!(plex.mutation_count() + emby.mutation_count(), 0);
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let (plex, emby, reconciler) = pair(ServerKind::Plex, ServerKind::Emby);
    let items = vec![
        plex.add_item(MediaRef::movie(ServerKind::Plex, "1", "Heat").with_ids(heat()).with_progress(61_000, at(1))),
        plex.add_item(
            MediaRef::movie(ServerKind::Plex, "2", "Ronin")
                .with_ids(ProviderIds::new().with_tmdb("8195"))
                .with_played(at(2)),
        ),
        plex.add_item(MediaRef::movie(ServerKind::Plex, "3", "Thief").with_ids(ProviderIds::new().with_tmdb("11524"))),
    ];
    emby.add_item(MediaRef::movie(ServerKind::Emby, "m1", "Heat").with_ids(heat()));
    emby.add_item(MediaRef::movie(ServerKind::Emby, "m2", "Ronin").with_ids(ProviderIds::new().with_tmdb("8195")));
    emby.add_item(
        MediaRef::movie(ServerKind::Emby, "m3", "Thief")
            .with_ids(ProviderIds::new().with_tmdb("11524"))
            .with_played(at(3)),
    );

    let mut first = 0;
    for item in &items {
        first += reconciler.reconcile_full(item).await.unwrap().mutations;
    }
    assert_eq!(first, 3);
    assert_eq!(emby.item("m1").unwrap().offset(), Some(Ticks::from_millis(61_000)));
    assert!(plex.item("3").unwrap().played);

    plex.clear_mutations();
    emby.clear_mutations();
    for id in ["1", "2", "3"] {
        let fresh = plex.item(id).unwrap();
        assert_eq!(reconciler.reconcile_full(&fresh).await.unwrap().mutations, 0);
    }
    assert_eq!(plex.mutation_count() + emby.mutation_count(), 0);
}

#[tokio::test]
async fn test_sub_millisecond_difference_ignored_with_plex() {
    let (plex, emby, reconciler) = pair(ServerKind::Plex, ServerKind::Emby);
    let source = plex.add_item(MediaRef::movie(ServerKind::Plex, "1", "Heat").with_ids(heat()).with_progress(1_000, at(1)));
    emby.add_item(MediaRef::movie(ServerKind::Emby, "m1", "Heat").with_ids(heat()).with_progress(10_000_005, at(2)));

    let report = reconciler.reconcile_full(&source).await.unwrap();
    assert_eq!(report.mutations, 0);
}

#[tokio::test]
async fn test_unresolved_conflict_counted_not_applied() {
    let (emby, jelly, reconciler) = pair(ServerKind::Emby, ServerKind::Jellyfin);
    let mut stale = MediaRef::movie(ServerKind::Emby, "m1", "Heat").with_ids(heat());
    stale.resume_offset = Some(0);
    stale.last_playing_at = Some(at(1));
    let stale = emby.add_item(stale);
    jelly.add_item(MediaRef::movie(ServerKind::Jellyfin, "j1", "Heat").with_ids(heat()));

    let report = reconciler.reconcile_full(&stale).await.unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.mutations, 0);
    assert_eq!(emby.mutation_count() + jelly.mutation_count(), 0);
}

#[tokio::test]
async fn test_unmatched_item_skipped() {
    let (plex, emby, reconciler) = pair(ServerKind::Plex, ServerKind::Emby);
    let source = plex.add_item(MediaRef::movie(ServerKind::Plex, "1", "Heat").with_ids(heat()).with_played(at(1)));
    let report = reconciler.reconcile_full(&source).await.unwrap();
    assert!(report.skipped);
    assert_eq!(emby.mutation_count(), 0);
}

#[tokio::test]
async fn test_candidate_commits_watermark_past_echo() {
    let (plex, emby, reconciler) = pair(ServerKind::Plex, ServerKind::Emby);
    plex.add_item(MediaRef::movie(ServerKind::Plex, "1", "Heat").with_ids(heat()));
    let watched = emby.add_item(MediaRef::movie(ServerKind::Emby, "m1", "Heat").with_ids(heat()).with_played(at(20)));

    let watermark = Arc::new(Mutex::new(Some(HighWaterMark::at(at(0)))));
    let candidate = Candidate {
        item: watched,
        from: Peer::B,
        channel: Channel::Played,
    };
    let report = reconciler.reconcile_candidate(&candidate, &watermark).await.unwrap();
    assert_eq!(report.mutations, 1);
    assert_eq!(plex.mutations(), vec![Mutation::MarkWatched("1".into())]);

    let mark = watermark.lock().await.unwrap();
    assert_eq!(mark.get(Peer::B, Channel::Played), at(20));
    let echo = plex.item("1").unwrap().last_played_at.unwrap();
    assert_eq!(mark.get(Peer::A, Channel::Played), echo);

    // The echo on the target is not picked up as new activity
    let feeds = crate::scanner::Feeds::fetch(plex.as_ref()).await.unwrap();
    assert!(crate::scanner::newer_than(&feeds.history, mark.get(Peer::A, Channel::Played), Channel::Played).is_empty());
}

#[tokio::test]
async fn test_playing_candidate_pushes_offset() {
    let (plex, emby, reconciler) = pair(ServerKind::Plex, ServerKind::Emby);
    let playing = plex.add_item(MediaRef::movie(ServerKind::Plex, "1", "Heat").with_ids(heat()).with_progress(90_000, at(30)));
    emby.add_item(MediaRef::movie(ServerKind::Emby, "m1", "Heat").with_ids(heat()));

    let watermark = Arc::new(Mutex::new(Some(HighWaterMark::at(at(0)))));
    let candidate = Candidate {
        item: playing,
        from: Peer::A,
        channel: Channel::Playing,
    };
    reconciler.reconcile_candidate(&candidate, &watermark).await.unwrap();
    assert_eq!(
        emby.mutations(),
        vec![Mutation::SetProgress("m1".into(), Ticks::from_millis(90_000))]
    );
    assert_eq!(watermark.lock().await.unwrap().get(Peer::A, Channel::Playing), at(30));

    // Already in sync: a replay writes nothing
    emby.clear_mutations();
    reconciler.reconcile_candidate(&candidate, &watermark).await.unwrap();
    assert_eq!(emby.mutation_count(), 0);
}

#[tokio::test]
async fn test_history_row_without_guids_refetched() {
    let (plex, emby, reconciler) = pair(ServerKind::Plex, ServerKind::Emby);
    let stored = plex.add_item(MediaRef::movie(ServerKind::Plex, "1", "Heat").with_ids(heat()).with_played(at(20)));
    emby.add_item(MediaRef::movie(ServerKind::Emby, "m1", "Heat").with_ids(ProviderIds::new().with_tmdb("949")));

    // Plex history rows carry no guids
    let mut row = stored;
    row.ids = ProviderIds::new();

    let watermark = Arc::new(Mutex::new(Some(HighWaterMark::at(at(0)))));
    let candidate = Candidate {
        item: row,
        from: Peer::A,
        channel: Channel::Played,
    };
    let report = reconciler.reconcile_candidate(&candidate, &watermark).await.unwrap();
    assert!(!report.skipped);
    assert_eq!(emby.mutations(), vec![Mutation::MarkWatched("m1".into())]);
    assert_eq!(watermark.lock().await.unwrap().get(Peer::A, Channel::Played), at(20));
}
