//! Score Records
//!
//! Best and running score per avatar. Running scores gate difficulty
//! escalation, best scores feed the scoreboard.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::world::entity::EntityId;

/// Scoreboard line as sent to peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    /// Name shown on the board
    pub display_name: String,
    /// Best score ever reached
    pub best_score: u64,
}

/// Per-avatar score record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreRecord {
    /// Name shown on the board
    pub display_name: String,
    /// Best score ever reached
    pub best_score: u64,
    /// Latest reported running score
    pub current_score: u64,
}

/// What a score report changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// The running score crossed at least one interval boundary.
    pub crossed: bool,
    /// The best score (or the board itself) changed.
    pub new_best: bool,
}

/// All score records.
#[derive(Clone, Debug, Default)]
pub struct Scoreboard {
    records: BTreeMap<EntityId, ScoreRecord>,
}

impl Scoreboard {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a running score for `id`.
    ///
    /// A boundary is crossed when `previous / interval < score / interval`.
    /// The first report for an avatar only establishes the baseline.
    pub fn record(&mut self, id: &EntityId, name: &str, score: u64, interval: u64) -> ScoreOutcome {
        let interval = interval.max(1);

        let Some(record) = self.records.get_mut(id) else {
            self.records.insert(id.clone(), ScoreRecord {
                display_name: name.to_string(),
                best_score: score,
                current_score: score,
            });
            return ScoreOutcome { crossed: false, new_best: true };
        };

        let crossed = record.current_score / interval < score / interval;
        record.current_score = score;

        let mut new_best = false;
        if score > record.best_score {
            record.best_score = score;
            new_best = true;
        }
        if record.display_name != name {
            record.display_name = name.to_string();
            new_best = true;
        }

        ScoreOutcome { crossed, new_best }
    }

    /// Look up a record.
    pub fn get(&self, id: &EntityId) -> Option<&ScoreRecord> {
        self.records.get(id)
    }

    /// Board as sent on the wire.
    pub fn snapshot(&self) -> BTreeMap<EntityId, ScoreEntry> {
        self.records
            .iter()
            .map(|(id, r)| {
                (id.clone(), ScoreEntry { display_name: r.display_name.clone(), best_score: r.best_score })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_report_is_baseline() {
        let mut board = Scoreboard::new();
        let outcome = board.record(&"p1".into(), "alice", 2600, 2500);

        assert!(!outcome.crossed);
        assert!(outcome.new_best);
    }

    #[test]
    fn test_crossing_once() {
        let mut board = Scoreboard::new();
        let p1 = EntityId::from("p1");

        board.record(&p1, "alice", 2400, 2500);
        assert!(board.record(&p1, "alice", 2600, 2500).crossed);
        assert!(!board.record(&p1, "alice", 2700, 2500).crossed);
        assert!(!board.record(&p1, "alice", 2600, 2500).crossed);
    }

    #[test]
    fn test_best_survives_lower_running_score() {
        let mut board = Scoreboard::new();
        let p1 = EntityId::from("p1");

        board.record(&p1, "alice", 900, 2500);
        let outcome = board.record(&p1, "alice", 100, 2500);
        assert!(!outcome.new_best);

        let record = board.get(&p1).unwrap();
        assert_eq!(record.best_score, 900);
        assert_eq!(record.current_score, 100);
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let mut board = Scoreboard::new();
        board.record(&"p1".into(), "alice", 42, 2500);

        let json = serde_json::to_value(board.snapshot()).unwrap();
        assert_eq!(json, serde_json::json!({ "p1": { "displayName": "alice", "bestScore": 42 } }));
    }
}
