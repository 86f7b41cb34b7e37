//! Staging data-quality probes
//!
//! The load resolves ambiguous rows by policy instead of failing. These probes
//! count how many rows each policy touched so the run can report them. They
//! read the staging relations only.

use serde::{Deserialize, Serialize};

use crate::config::UnmatchedPlays;
use crate::models::NEXT_SONG_PAGE;
use crate::statement::quote_literal;
use crate::warehouse::WarehouseBackend;

/// What a probe measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Plays with no catalog entry on (artist, song, length)
    UnmatchedPlays,
    /// Users whose maximum ts is shared by more than one staged row
    TiedUserStates,
    /// Plays lacking ts or userId, skipped by the fact load
    IncompletePlays,
    /// Catalog match keys carried by more than one entry
    DuplicateCatalogKeys,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 4] = [
        ProbeKind::UnmatchedPlays,
        ProbeKind::TiedUserStates,
        ProbeKind::IncompletePlays,
        ProbeKind::DuplicateCatalogKeys,
    ];

    pub fn sql(&self) -> String {
        let page = quote_literal(NEXT_SONG_PAGE);
        match self {
            ProbeKind::UnmatchedPlays => format!(
                "SELECT COUNT(*) AS n FROM events_staging es \
                 WHERE es.page = {page} AND es.ts IS NOT NULL AND es.userId IS NOT NULL \
                 AND NOT EXISTS (SELECT 1 FROM songs_staging ss \
                 WHERE ss.artist_name = es.artist AND ss.title = es.song AND ss.duration = es.length)"
            ),
            ProbeKind::TiedUserStates => "SELECT COUNT(*) AS n FROM (\
                 SELECT es.userId FROM events_staging es \
                 JOIN (SELECT userId, MAX(ts) AS max_ts FROM events_staging \
                 WHERE userId IS NOT NULL GROUP BY userId) latest \
                 ON es.userId = latest.userId AND es.ts = latest.max_ts \
                 GROUP BY es.userId HAVING COUNT(*) > 1) tied"
                .to_string(),
            ProbeKind::IncompletePlays => format!(
                "SELECT COUNT(*) AS n FROM events_staging \
                 WHERE page = {page} AND (ts IS NULL OR userId IS NULL)"
            ),
            ProbeKind::DuplicateCatalogKeys => "SELECT COUNT(*) AS n FROM (\
                 SELECT artist_name, title, duration FROM songs_staging \
                 GROUP BY artist_name, title, duration HAVING COUNT(*) > 1) dupes"
                .to_string(),
        }
    }

    fn describe(&self, count: i64, unmatched: UnmatchedPlays) -> String {
        match self {
            ProbeKind::UnmatchedPlays => match unmatched {
                UnmatchedPlays::Drop => {
                    format!("{} play events matched no catalog entry and were dropped", count)
                }
                UnmatchedPlays::Retain => format!(
                    "{} play events matched no catalog entry and were kept with null song/artist",
                    count
                ),
            },
            ProbeKind::TiedUserStates => format!(
                "{} users have several rows at their latest ts; tie-break rule applied",
                count
            ),
            ProbeKind::IncompletePlays => {
                format!("{} play events lack ts or userId and were skipped", count)
            }
            ProbeKind::DuplicateCatalogKeys => format!(
                "{} catalog (artist, title, duration) keys repeat; first by song_id used",
                count
            ),
        }
    }
}

/// One probe outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFinding {
    pub kind: ProbeKind,
    pub count: i64,
    pub message: String,
}

/// Findings of all probes that ran
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub findings: Vec<ProbeFinding>,
    /// Probes that could not run
    pub errors: Vec<String>,
}

impl DataQualityReport {
    pub fn count(&self, kind: ProbeKind) -> Option<i64> {
        self.findings
            .iter()
            .find(|f| f.kind == kind)
            .map(|f| f.count)
    }

    /// True when no probe found anything
    pub fn is_clean(&self) -> bool {
        self.findings.iter().all(|f| f.count == 0)
    }
}

/// Run every probe against the staging relations
///
/// A failing probe is recorded and logged, never propagated.
pub async fn run_probes(
    backend: &dyn WarehouseBackend,
    unmatched: UnmatchedPlays,
) -> DataQualityReport {
    let mut report = DataQualityReport::default();

    for kind in ProbeKind::ALL {
        match backend.query(&kind.sql()).await {
            Ok(result) => {
                let count = result.scalar_i64().unwrap_or(0);
                let message = kind.describe(count, unmatched);
                if count > 0 {
                    tracing::warn!("{}", message);
                }
                report.findings.push(ProbeFinding {
                    kind,
                    count,
                    message,
                });
            }
            Err(e) => {
                tracing::warn!("Data quality probe {:?} failed: {}", kind, e);
                report.errors.push(format!("{:?}: {}", kind, e));
            }
        }
    }

    report
}
