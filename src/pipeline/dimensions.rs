//! Dimension extraction from the staging relations
//!
//! Four inserts, all reading staging only:
//! - `users`: latest observed state per user id
//! - `songs`: straight projection of the catalog
//! - `artists`: one row per artist id
//! - `time`: one row per distinct event timestamp

use crate::statement::{Dialect, Relation, Statement, StatementKind};

/// Ranking used to pick a user's latest state
///
/// Highest `ts` wins. Staging keeps no ingestion order, so ties on `ts` go to
/// the later position (session, then item within the session), then to
/// `paid` over `free`, then to names and gender so the pick never depends on
/// storage order.
pub const USER_STATE_ORDER: &str = "ts DESC NULLS LAST, \
     sessionId DESC NULLS LAST, \
     itemInSession DESC NULLS LAST, \
     level DESC NULLS LAST, \
     lastName ASC NULLS LAST, \
     firstName ASC NULLS LAST, \
     gender ASC NULLS LAST";

/// Ranking used to pick one catalog row per artist
pub const ARTIST_ROW_ORDER: &str = "artist_name ASC NULLS LAST, \
     artist_location ASC NULLS LAST, \
     artist_latitude ASC NULLS LAST, \
     artist_longitude ASC NULLS LAST, \
     song_id ASC NULLS LAST";

/// Derives the dimension relations
#[derive(Debug, Clone, Copy)]
pub struct DimensionExtractor {
    dialect: Dialect,
}

impl DimensionExtractor {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// All dimension inserts in load order
    pub fn statements(&self) -> Vec<Statement> {
        vec![self.users(), self.songs(), self.artists(), self.time()]
    }

    pub fn users(&self) -> Statement {
        let sql = format!(
            r#"INSERT INTO "users" (u_user_id, u_first_name, u_last_name, u_gender, u_level)
SELECT userId, firstName, lastName, gender, level
FROM (
    SELECT userId, firstName, lastName, gender, level,
           ROW_NUMBER() OVER (PARTITION BY userId ORDER BY {}) AS state_rank
    FROM events_staging
    WHERE userId IS NOT NULL
) latest_state
WHERE state_rank = 1
ORDER BY userId DESC;"#,
            USER_STATE_ORDER
        );
        Statement::new(StatementKind::Insert, Relation::Users, self.dialect, sql)
    }

    pub fn songs(&self) -> Statement {
        let sql = r#"INSERT INTO "songs" (sgs_song_id, sgs_title, sgs_artist_id, sgs_year, sgs_duration)
SELECT song_id, title, artist_id, year, duration
FROM songs_staging;"#;
        Statement::new(StatementKind::Insert, Relation::Songs, self.dialect, sql)
    }

    pub fn artists(&self) -> Statement {
        let sql = format!(
            r#"INSERT INTO "artists" (a_artist_id, a_artist_name, a_artist_location, a_artist_latitude, a_artist_longitude)
SELECT artist_id, artist_name, artist_location, artist_latitude, artist_longitude
FROM (
    SELECT artist_id, artist_name, artist_location, artist_latitude, artist_longitude,
           ROW_NUMBER() OVER (PARTITION BY artist_id ORDER BY {}) AS artist_rank
    FROM songs_staging
    WHERE artist_id IS NOT NULL
) ranked_artists
WHERE artist_rank = 1;"#,
            ARTIST_ROW_ORDER
        );
        Statement::new(StatementKind::Insert, Relation::Artists, self.dialect, sql)
    }

    /// Week is ISO-8601, day of week counts from 0 = Sunday, all in UTC
    pub fn time(&self) -> Statement {
        let start_time = match self.dialect {
            Dialect::Redshift => "'1970-01-01'::date + ts/1000 * interval '1 second'",
            Dialect::DuckDb => "epoch_ms(CAST(ts AS BIGINT))",
        };
        let sql = format!(
            r#"INSERT INTO "time" (t_ts, t_hour, t_day, t_week, t_month, t_year, t_dayofweek)
SELECT ts,
       EXTRACT(HOUR FROM t_start_time) AS t_hour,
       EXTRACT(DAY FROM t_start_time) AS t_day,
       EXTRACT(WEEK FROM t_start_time) AS t_week,
       EXTRACT(MONTH FROM t_start_time) AS t_month,
       EXTRACT(YEAR FROM t_start_time) AS t_year,
       EXTRACT(DOW FROM t_start_time) AS t_dayofweek
FROM (
    SELECT DISTINCT ts, {} AS t_start_time
    FROM events_staging
    WHERE ts IS NOT NULL
) moments;"#,
            start_time
        );
        Statement::new(StatementKind::Insert, Relation::Time, self.dialect, sql)
    }
}
