//! Row types for the staging relations and the star schema
//!
//! Staging types mirror the source JSON field names (camelCase for the event
//! logs, snake_case for the catalog). Warehouse rows use the column names of
//! the warehouse DDL without their table prefix.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Page value of a play event
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// One raw application log line
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingEvent {
    pub artist: Option<String>,
    pub auth: Option<String>,
    pub first_name: Option<String>,
    pub gender: Option<String>,
    pub item_in_session: Option<i32>,
    pub last_name: Option<String>,
    pub length: Option<f64>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub method: Option<String>,
    pub page: Option<String>,
    pub registration: Option<f64>,
    pub session_id: Option<i32>,
    pub song: Option<String>,
    pub status: Option<i32>,
    /// Epoch milliseconds
    pub ts: Option<i64>,
    pub user_agent: Option<String>,
    pub user_id: Option<i32>,
}

impl StagingEvent {
    /// Whether this event is a song play
    pub fn is_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG_PAGE)
    }
}

/// One song catalog entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StagingCatalogEntry {
    pub num_songs: Option<i32>,
    pub artist_id: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub artist_location: Option<String>,
    pub artist_name: Option<String>,
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: i32,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRow {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRow {
    pub artist_id: String,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRow {
    /// Epoch milliseconds, the key of the time dimension
    pub ts: i64,
    #[serde(flatten)]
    pub parts: TimeParts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongplayRow {
    pub songplay_id: i64,
    pub ts: i64,
    pub user_id: i32,
    pub level: Option<String>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: Option<i32>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

/// Calendar decomposition of an epoch-millisecond timestamp, in UTC
///
/// Follows the warehouse's `EXTRACT` conventions: `week` is the ISO-8601 week
/// number and `day_of_week` counts from 0 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeParts {
    pub hour: u32,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub year: i32,
    pub day_of_week: u32,
}

impl TimeParts {
    /// Decompose `ts` milliseconds after the Unix epoch
    ///
    /// Sub-second precision is discarded first, as the warehouse does.
    /// Returns None when the instant is outside chrono's range.
    pub fn from_epoch_millis(ts: i64) -> Option<Self> {
        let instant: DateTime<Utc> = DateTime::from_timestamp(ts.div_euclid(1000), 0)?;
        Some(Self {
            hour: instant.hour(),
            day: instant.day(),
            week: instant.iso_week().week(),
            month: instant.month(),
            year: instant.year(),
            day_of_week: instant.weekday().num_days_from_sunday(),
        })
    }
}

impl TimeRow {
    pub fn from_epoch_millis(ts: i64) -> Option<Self> {
        TimeParts::from_epoch_millis(ts).map(|parts| Self { ts, parts })
    }
}
