pub mod http;
pub mod mlb;
pub mod nba;
pub mod nhl;

#[cfg(test)]
pub mod testing;

pub use http::{FetchError, RetryPolicy};
pub use mlb::MlbClient;
pub use nba::BalldontlieClient;
pub use nhl::NhlClient;

use serde_json::Value;
use std::collections::HashSet;

use crate::utils::json_id;

/// Flatten a StatsAPI schedule (`dates[].games[].gamePk`) into game ids.
///
/// MLB lists suspended/resumed games under every date they were played on, so
/// ids are de-duplicated keeping first appearance.
pub fn schedule_game_ids(schedule: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    let dates = match schedule["dates"].as_array() {
        Some(d) => d,
        None => return ids,
    };

    for date in dates {
        let Some(games) = date["games"].as_array() else { continue };
        for game in games {
            if let Some(pk) = json_id(&game["gamePk"]) {
                if seen.insert(pk.clone()) {
                    ids.push(pk);
                }
            }
        }
    }
    ids
}
