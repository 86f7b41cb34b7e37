//! Songplay fact construction
//!
//! A play is a staged event with `page = 'NextSong'`. It is matched to the
//! catalog on artist name, song title and duration. Duration is compared with
//! exact floating-point equality, which is brittle: a catalog duration that
//! differs from the logged length in its last bit will not match.

use crate::config::UnmatchedPlays;
use crate::models::NEXT_SONG_PAGE;
use crate::statement::{Dialect, Relation, Statement, StatementKind, quote_literal};

/// Picks one catalog row per (artist_name, title, duration) key
pub const CATALOG_MATCH_ORDER: &str = "song_id ASC NULLS LAST, artist_id ASC NULLS LAST";

/// Builds the `songplays` fact relation
#[derive(Debug, Clone, Copy)]
pub struct FactBuilder {
    dialect: Dialect,
    unmatched: UnmatchedPlays,
}

impl FactBuilder {
    pub fn new(dialect: Dialect, unmatched: UnmatchedPlays) -> Self {
        Self { dialect, unmatched }
    }

    pub fn unmatched_policy(&self) -> UnmatchedPlays {
        self.unmatched
    }

    pub fn statements(&self) -> Vec<Statement> {
        vec![self.songplays()]
    }

    /// Insert one songplay per qualifying play event
    ///
    /// Events without `ts` or `userId` are skipped: both columns are
    /// `not null` in the fact table. The catalog is deduplicated on the match
    /// key first so a duplicated catalog entry cannot multiply a play.
    pub fn songplays(&self) -> Statement {
        let join = match self.unmatched {
            UnmatchedPlays::Drop => "JOIN",
            UnmatchedPlays::Retain => "LEFT JOIN",
        };

        let sql = format!(
            r#"INSERT INTO "songplays" (sps_ts, sps_user_id, sps_level, sps_song_id, sps_artist_id, sps_session_id, sps_artist_location, sps_user_agent)
SELECT es.ts, es.userId, es.level, ss.song_id, ss.artist_id, es.sessionId, es.location, es.userAgent
FROM events_staging es
{join} (
    SELECT artist_name, title, duration, song_id, artist_id
    FROM (
        SELECT artist_name, title, duration, song_id, artist_id,
               ROW_NUMBER() OVER (PARTITION BY artist_name, title, duration ORDER BY {order}) AS catalog_rank
        FROM songs_staging
    ) ranked_catalog
    WHERE catalog_rank = 1
) ss
    ON (es.artist = ss.artist_name)
    AND (es.song = ss.title)
    AND (es.length = ss.duration)
WHERE es.page = {page}
  AND es.ts IS NOT NULL
  AND es.userId IS NOT NULL
ORDER BY es.ts, es.sessionId, es.itemInSession;"#,
            join = join,
            order = CATALOG_MATCH_ORDER,
            page = quote_literal(NEXT_SONG_PAGE),
        );

        Statement::new(StatementKind::Insert, Relation::Songplays, self.dialect, sql)
    }
}
