//! End-to-end load tests against a file-backed DuckDB warehouse
//!
//! Sources are newline-delimited JSON files in a temp dir, staged through
//! `read_json`. Each test reopens the warehouse after the run to inspect it,
//! since a run closes its connection.

#[cfg(feature = "duckdb-backend")]
mod common;

#[cfg(feature = "duckdb-backend")]
mod pipeline_load_tests {
    use super::common::{Fixture, count, event, fetch, runtime, song, with};
    use serde_json::json;
    use songplay_warehouse::config::UnmatchedPlays;
    use songplay_warehouse::models::{ArtistRow, SongRow, SongplayRow, TimeRow, UserRow};
    use songplay_warehouse::pipeline::{
        LoadOrchestrator, LoadStage, PipelineError, ProbeKind, RunPlan,
    };
    use songplay_warehouse::statement::Relation;
    use songplay_warehouse::warehouse::WarehouseBackend;

    const USERS_SQL: &str = "SELECT u_user_id AS user_id, u_first_name AS first_name, \
         u_last_name AS last_name, u_gender AS gender, u_level AS level \
         FROM users ORDER BY u_user_id";

    const SONGS_SQL: &str = "SELECT sgs_song_id AS song_id, sgs_title AS title, \
         sgs_artist_id AS artist_id, sgs_year AS year, sgs_duration AS duration \
         FROM songs ORDER BY sgs_song_id";

    const TIME_SQL: &str = "SELECT CAST(t_ts AS BIGINT) AS ts, t_hour AS hour, t_day AS day, \
         t_week AS week, t_month AS month, t_year AS year, t_dayofweek AS day_of_week \
         FROM \"time\" ORDER BY t_ts";

    const ARTISTS_SQL: &str = "SELECT a_artist_id AS artist_id, a_artist_name AS artist_name, \
         a_artist_location AS artist_location, a_artist_latitude AS artist_latitude, \
         a_artist_longitude AS artist_longitude FROM artists ORDER BY a_artist_id";

    const SONGPLAYS_SQL: &str = "SELECT CAST(sps_songplay_id AS BIGINT) AS songplay_id, \
         CAST(sps_ts AS BIGINT) AS ts, sps_user_id AS user_id, sps_level AS level, \
         sps_song_id AS song_id, sps_artist_id AS artist_id, sps_session_id AS session_id, \
         sps_artist_location AS location, sps_user_agent AS user_agent \
         FROM songplays ORDER BY sps_ts";

    fn play(user_id: i32, ts: i64, artist: &str, title: &str, length: f64, level: &str) -> serde_json::Value {
        with(
            event(Some(user_id), Some(ts), "NextSong"),
            json!({"artist": artist, "song": title, "length": length, "level": level}),
        )
    }

    fn round_trip_fixture() -> Fixture {
        Fixture::new(
            &[
                play(7, 1000, "A", "S", 200.0, "free"),
                play(7, 2000, "A", "S", 200.0, "paid"),
            ],
            &[song("SID1", "A1", "A", "S", 200.0)],
        )
    }

    #[test]
    fn test_round_trip_scenario() {
        runtime().block_on(async {
            let fixture = round_trip_fixture();
            let report = LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();

            assert_eq!(report.plan, RunPlan::Full);
            assert_eq!(report.final_stage, LoadStage::Done);
            assert_eq!(report.rows_loaded("insert songplays"), 2);

            let db = fixture.open();
            let users: Vec<UserRow> = fetch(&db, USERS_SQL).await;
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].user_id, 7);
            assert_eq!(users[0].level.as_deref(), Some("paid"));

            let plays: Vec<SongplayRow> = fetch(&db, SONGPLAYS_SQL).await;
            assert_eq!(plays.len(), 2);
            for p in &plays {
                assert_eq!(p.song_id.as_deref(), Some("SID1"));
                assert_eq!(p.artist_id.as_deref(), Some("A1"));
            }
            assert_ne!(plays[0].songplay_id, plays[1].songplay_id);

            let times: Vec<TimeRow> = fetch(&db, TIME_SQL).await;
            let keys: Vec<i64> = times.iter().map(|t| t.ts).collect();
            assert_eq!(keys, vec![1000, 2000]);
        });
    }

    #[test]
    fn test_reset_empties_every_relation() {
        runtime().block_on(async {
            let fixture = round_trip_fixture();
            LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();

            let report = LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .reset_schema()
                .await
                .unwrap();
            assert_eq!(report.plan, RunPlan::ResetOnly);
            assert!(report.data_quality.is_none());

            let db = fixture.open();
            for relation in Relation::ALL {
                assert_eq!(count(&db, &relation.quoted()).await, 0, "{}", relation);
            }
        });
    }

    #[test]
    fn test_full_run_twice_does_not_accumulate() {
        runtime().block_on(async {
            let fixture = round_trip_fixture();
            for _ in 0..2 {
                LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                    .run_full()
                    .await
                    .unwrap();
            }

            let db = fixture.open();
            assert_eq!(count(&db, "events_staging").await, 2);
            assert_eq!(count(&db, "songplays").await, 2);
            assert_eq!(count(&db, "users").await, 1);
        });
    }

    #[test]
    fn test_page_view_produces_no_songplay() {
        runtime().block_on(async {
            let fixture = Fixture::new(
                &[with(
                    event(Some(7), Some(1000), "PageView"),
                    json!({"artist": "A", "song": "S", "length": 200.0}),
                )],
                &[song("SID1", "A1", "A", "S", 200.0)],
            );
            LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();

            let db = fixture.open();
            assert_eq!(count(&db, "songplays").await, 0);
            // The event still feeds the user and time dimensions
            assert_eq!(count(&db, "users").await, 1);
            assert_eq!(count(&db, "\"time\"").await, 1);
        });
    }

    fn non_match_fixture() -> Fixture {
        Fixture::new(
            &[
                play(7, 1000, "A", "S", 200.0, "free"),
                play(7, 2000, "Nobody", "Unknown", 123.4, "free"),
            ],
            &[song("SID1", "A1", "A", "S", 200.0)],
        )
    }

    #[test]
    fn test_unmatched_play_dropped_by_default() {
        runtime().block_on(async {
            let fixture = non_match_fixture();
            let report = LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();

            let quality = report.data_quality.unwrap();
            assert_eq!(quality.count(ProbeKind::UnmatchedPlays), Some(1));

            let db = fixture.open();
            let plays: Vec<SongplayRow> = fetch(&db, SONGPLAYS_SQL).await;
            assert_eq!(plays.len(), 1);
            assert_eq!(plays[0].ts, 1000);
        });
    }

    #[test]
    fn test_unmatched_play_retained_with_null_keys() {
        runtime().block_on(async {
            let fixture = non_match_fixture();
            LoadOrchestrator::new(
                Box::new(fixture.open()),
                fixture.config_with(UnmatchedPlays::Retain),
            )
            .run_full()
            .await
            .unwrap();

            let db = fixture.open();
            let plays: Vec<SongplayRow> = fetch(&db, SONGPLAYS_SQL).await;
            assert_eq!(plays.len(), 2);
            assert_eq!(plays[0].song_id.as_deref(), Some("SID1"));
            assert_eq!(plays[1].ts, 2000);
            assert_eq!(plays[1].song_id, None);
            assert_eq!(plays[1].artist_id, None);
            assert_eq!(plays[1].user_id, 7);
        });
    }

    #[test]
    fn test_user_latest_state_and_tie_break() {
        runtime().block_on(async {
            let fixture = Fixture::new(
                &[
                    // user 7 renamed and upgraded later
                    with(
                        event(Some(7), Some(1000), "Home"),
                        json!({"firstName": "Old", "level": "free"}),
                    ),
                    with(
                        event(Some(7), Some(5000), "NextSong"),
                        json!({"firstName": "New", "level": "paid"}),
                    ),
                    // user 8 has two rows at the same ts: the later session wins
                    with(
                        event(Some(8), Some(3000), "NextSong"),
                        json!({"sessionId": 10, "level": "paid", "lastName": "Early"}),
                    ),
                    with(
                        event(Some(8), Some(3000), "NextSong"),
                        json!({"sessionId": 11, "level": "free", "lastName": "Late"}),
                    ),
                    // logged-out traffic carries no user id
                    with(event(None, Some(4000), "Home"), json!({"userId": ""})),
                ],
                &[song("SID1", "A1", "Radiohead", "Karma Police", 238.07955)],
            );
            let report = LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();
            let quality = report.data_quality.unwrap();
            assert_eq!(quality.count(ProbeKind::TiedUserStates), Some(1));

            let db = fixture.open();
            let users: Vec<UserRow> = fetch(&db, USERS_SQL).await;
            assert_eq!(users.len(), 2);

            assert_eq!(users[0].user_id, 7);
            assert_eq!(users[0].first_name.as_deref(), Some("New"));
            assert_eq!(users[0].level.as_deref(), Some("paid"));

            assert_eq!(users[1].user_id, 8);
            assert_eq!(users[1].last_name.as_deref(), Some("Late"));
            assert_eq!(users[1].level.as_deref(), Some("free"));
        });
    }

    #[test]
    fn test_time_rows_match_utc_decomposition() {
        runtime().block_on(async {
            let stamps = [1_541_106_106_796_i64, 1_541_106_106_796, 1_483_228_800_000, 86_399_999];
            let events: Vec<_> = stamps
                .iter()
                .map(|&ts| event(Some(1), Some(ts), "NextSong"))
                .chain(std::iter::once(event(Some(1), None, "Home")))
                .collect();
            let fixture = Fixture::new(&events, &[song("SID1", "A1", "A", "S", 1.0)]);
            LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();

            let db = fixture.open();
            let times: Vec<TimeRow> = fetch(&db, TIME_SQL).await;
            assert_eq!(times.len(), 3, "one row per distinct non-null ts");
            for row in &times {
                assert_eq!(Some(*row), TimeRow::from_epoch_millis(row.ts), "ts {}", row.ts);
            }
        });
    }

    #[test]
    fn test_artists_unique_and_non_null() {
        runtime().block_on(async {
            let fixture = Fixture::new(
                &[event(Some(1), Some(1000), "Home")],
                &[
                    song("SID1", "AR1", "Beta", "One", 100.0),
                    song("SID2", "AR1", "Alpha", "Two", 200.0),
                    with(song("SID3", "AR2", "Gamma", "Three", 300.0), json!({"artist_id": null})),
                    song("SID4", "AR3", "Delta", "Four", 400.0),
                ],
            );
            LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();

            let db = fixture.open();
            let artists: Vec<ArtistRow> = fetch(&db, ARTISTS_SQL).await;
            let ids: Vec<&str> = artists.iter().map(|a| a.artist_id.as_str()).collect();
            assert_eq!(ids, vec!["AR1", "AR3"]);
            assert_eq!(artists[0].artist_name.as_deref(), Some("Alpha"));

            assert_eq!(count(&db, "songs").await, 4);
        });
    }

    #[test]
    fn test_songs_project_every_catalog_column() {
        runtime().block_on(async {
            let fixture = Fixture::new(
                &[event(Some(1), Some(1000), "Home")],
                &[
                    song("SID1", "AR1", "Beta", "One", 100.5),
                    with(
                        song("SID2", "AR2", "Gamma", "Two", 218.93179),
                        json!({"year": 0, "artist_id": null}),
                    ),
                    with(song("SID3", "AR3", "Delta", "Three", 1.0), json!({"year": ""})),
                ],
            );
            LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();

            let db = fixture.open();
            let songs: Vec<SongRow> = fetch(&db, SONGS_SQL).await;
            assert_eq!(
                songs,
                vec![
                    SongRow {
                        song_id: Some("SID1".to_string()),
                        title: Some("One".to_string()),
                        artist_id: Some("AR1".to_string()),
                        year: Some(1997),
                        duration: Some(100.5),
                    },
                    SongRow {
                        song_id: Some("SID2".to_string()),
                        title: Some("Two".to_string()),
                        artist_id: None,
                        year: Some(0),
                        duration: Some(218.93179),
                    },
                    SongRow {
                        song_id: Some("SID3".to_string()),
                        title: Some("Three".to_string()),
                        artist_id: Some("AR3".to_string()),
                        year: None,
                        duration: Some(1.0),
                    },
                ]
            );
        });
    }

    #[test]
    fn test_duplicate_catalog_entries_do_not_multiply_plays() {
        runtime().block_on(async {
            let fixture = Fixture::new(
                &[play(7, 1000, "A", "S", 200.0, "free")],
                &[
                    song("SID2", "A1", "A", "S", 200.0),
                    song("SID1", "A1", "A", "S", 200.0),
                ],
            );
            let report = LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();
            assert_eq!(
                report.data_quality.unwrap().count(ProbeKind::DuplicateCatalogKeys),
                Some(1)
            );

            let db = fixture.open();
            let plays: Vec<SongplayRow> = fetch(&db, SONGPLAYS_SQL).await;
            assert_eq!(plays.len(), 1);
            assert_eq!(plays[0].song_id.as_deref(), Some("SID1"));
        });
    }

    #[test]
    fn test_plays_without_user_are_skipped() {
        runtime().block_on(async {
            let fixture = Fixture::new(
                &[
                    play(7, 1000, "A", "S", 200.0, "free"),
                    with(
                        event(None, Some(2000), "NextSong"),
                        json!({"artist": "A", "song": "S", "length": 200.0}),
                    ),
                ],
                &[song("SID1", "A1", "A", "S", 200.0)],
            );
            let report = LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();
            assert_eq!(
                report.data_quality.unwrap().count(ProbeKind::IncompletePlays),
                Some(1)
            );

            let db = fixture.open();
            assert_eq!(count(&db, "songplays").await, 1);
        });
    }

    #[test]
    fn test_songplays_only_from_next_song_events() {
        runtime().block_on(async {
            let pages = ["NextSong", "Home", "Logout", "NextSong", "Settings"];
            let events: Vec<_> = pages
                .iter()
                .enumerate()
                .map(|(i, page)| {
                    with(
                        event(Some(3), Some(1000 + i as i64), page),
                        json!({"artist": "A", "song": "S", "length": 200.0, "itemInSession": i}),
                    )
                })
                .collect();
            let fixture = Fixture::new(&events, &[song("SID1", "A1", "A", "S", 200.0)]);
            LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap();

            let db = fixture.open();
            let plays: Vec<SongplayRow> = fetch(&db, SONGPLAYS_SQL).await;
            let ts: Vec<i64> = plays.iter().map(|p| p.ts).collect();
            assert_eq!(ts, vec![1000, 1003]);
        });
    }

    #[test]
    fn test_failed_stage_keeps_earlier_commits() {
        runtime().block_on(async {
            let fixture = round_trip_fixture();
            let mut config = fixture.config();
            config.sources.song_data = fixture
                .dir
                .path()
                .join("missing.json")
                .to_string_lossy()
                .into_owned();

            let err = LoadOrchestrator::new(Box::new(fixture.open()), config)
                .run_full()
                .await
                .unwrap_err();

            match err {
                PipelineError::Statement { stage, label, .. } => {
                    assert_eq!(stage, LoadStage::StageLoad);
                    assert_eq!(label, "copy songs_staging");
                }
                other => panic!("unexpected error: {}", other),
            }

            // The connection was released and the events copy stays committed
            let db = fixture.open();
            assert_eq!(count(&db, "events_staging").await, 2);
            assert_eq!(count(&db, "songs_staging").await, 0);
            assert_eq!(count(&db, "users").await, 0);
        });
    }

    #[test]
    fn test_malformed_source_value_fails_staging() {
        runtime().block_on(async {
            let fixture = Fixture::new(
                &[
                    play(7, 1000, "A", "S", 200.0, "free"),
                    with(
                        event(Some(8), Some(2000), "NextSong"),
                        json!({"userId": "eight", "ts": "not-a-time"}),
                    ),
                ],
                &[song("SID1", "A1", "A", "S", 200.0)],
            );

            let err = LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_full()
                .await
                .unwrap_err();

            match err {
                PipelineError::Statement { stage, label, .. } => {
                    assert_eq!(stage, LoadStage::StageLoad);
                    assert_eq!(label, "copy events_staging");
                }
                other => panic!("unexpected error: {}", other),
            }

            // The insert is atomic, so the valid play is not staged either
            let db = fixture.open();
            assert_eq!(count(&db, "events_staging").await, 0);
            assert_eq!(count(&db, "songs_staging").await, 0);
            assert_eq!(count(&db, "users").await, 0);
        });
    }

    #[test]
    fn test_load_only_requires_existing_schema() {
        runtime().block_on(async {
            let fixture = round_trip_fixture();
            let err = LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_load()
                .await
                .unwrap_err();
            assert_eq!(err.stage(), Some(LoadStage::StageLoad));

            LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .reset_schema()
                .await
                .unwrap();
            let report = LoadOrchestrator::new(Box::new(fixture.open()), fixture.config())
                .run_load()
                .await
                .unwrap();
            assert_eq!(report.plan, RunPlan::LoadOnly);
            assert_eq!(report.rows_loaded("insert songplays"), 2);

            let db = fixture.open();
            assert!(db.health_check().await.unwrap());
        });
    }
}
