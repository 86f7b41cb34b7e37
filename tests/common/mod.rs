//! Shared fixtures: JSON source files in a temp dir and a file-backed DuckDB

#![allow(dead_code)]

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use songplay_warehouse::config::{PipelineConfig, UnmatchedPlays};
use songplay_warehouse::models::StagingCatalogEntry;
use songplay_warehouse::warehouse::{DuckDbWarehouse, WarehouseBackend};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::runtime::Runtime;

pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Temp dir holding the warehouse file and the two sources
pub struct Fixture {
    pub dir: TempDir,
    pub db_path: PathBuf,
    pub events_path: PathBuf,
    pub songs_path: PathBuf,
}

impl Fixture {
    /// Write events and catalog entries as newline-delimited JSON
    pub fn new(events: &[Value], songs: &[Value]) -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("warehouse.duckdb");
        let events_path = dir.path().join("events.json");
        let songs_path = dir.path().join("songs.json");
        write_lines(&events_path, events);
        write_lines(&songs_path, songs);
        Self {
            dir,
            db_path,
            events_path,
            songs_path,
        }
    }

    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::duckdb(
            self.db_path.to_string_lossy(),
            self.songs_path.to_string_lossy(),
            self.events_path.to_string_lossy(),
        );
        config.load.quality_checks = true;
        config
    }

    pub fn config_with(&self, unmatched: UnmatchedPlays) -> PipelineConfig {
        let mut config = self.config();
        config.load.unmatched_plays = unmatched;
        config
    }

    pub fn open(&self) -> DuckDbWarehouse {
        DuckDbWarehouse::open(&self.db_path).unwrap()
    }
}

fn write_lines(path: &Path, values: &[Value]) {
    let mut file = std::fs::File::create(path).unwrap();
    for value in values {
        writeln!(file, "{}", value).unwrap();
    }
}

/// A log line; `page` decides whether it is a play
pub fn event(user_id: Option<i32>, ts: Option<i64>, page: &str) -> Value {
    json!({
        "artist": "Radiohead",
        "auth": "Logged In",
        "firstName": "Kaylee",
        "gender": "F",
        "itemInSession": 0,
        "lastName": "Summers",
        "length": 238.07955,
        "level": "free",
        "location": "Phoenix-Mesa-Scottsdale, AZ",
        "method": "PUT",
        "page": page,
        "registration": 1540344794796.0,
        "sessionId": 139,
        "song": "Karma Police",
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0",
        "userId": user_id
    })
}

/// Overwrite fields of a JSON object
pub fn with(mut value: Value, fields: Value) -> Value {
    if let (Some(target), Some(source)) = (value.as_object_mut(), fields.as_object()) {
        for (key, field) in source {
            target.insert(key.clone(), field.clone());
        }
    }
    value
}

/// A catalog entry
pub fn song(song_id: &str, artist_id: &str, artist_name: &str, title: &str, duration: f64) -> Value {
    let entry = StagingCatalogEntry {
        num_songs: Some(1),
        artist_id: Some(artist_id.to_string()),
        artist_location: Some(String::new()),
        artist_name: Some(artist_name.to_string()),
        song_id: Some(song_id.to_string()),
        title: Some(title.to_string()),
        duration: Some(duration),
        year: Some(1997),
        ..Default::default()
    };
    serde_json::to_value(entry).unwrap()
}

/// Run a query and deserialize every row
pub async fn fetch<T: DeserializeOwned>(backend: &dyn WarehouseBackend, sql: &str) -> Vec<T> {
    backend
        .query(sql)
        .await
        .unwrap()
        .rows
        .into_iter()
        .map(|row| serde_json::from_value(row).unwrap())
        .collect()
}

pub async fn count(backend: &dyn WarehouseBackend, relation: &str) -> i64 {
    backend
        .query(&format!("SELECT COUNT(*) AS n FROM {}", relation))
        .await
        .unwrap()
        .scalar_i64()
        .unwrap()
}
