pub mod features;
pub mod ingest_mlb;
pub mod ingest_nba;
pub mod ingest_nhl;

pub use features::*;
pub use ingest_mlb::MlbIngestor;
pub use ingest_nba::NbaIngestor;
pub use ingest_nhl::NhlIngestor;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::config::Settings;
use crate::db::{get_or_create_league, LeagueCache};
use crate::models::{LeagueCode, PlayerRecord};
use crate::utils::{json_id, json_str, parse_nhl_season, season_window, split_full_name};

/// Outcome of one backfill run for one league.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub league: String,
    pub run_id: String,
    pub seasons_completed: Vec<String>,
    pub seasons_skipped: Vec<String>,
    pub games_processed: u32,
    pub games_skipped: u32,
    pub stats_inserted: u32,
}

impl BackfillReport {
    fn new(league: LeagueCode, cache: &LeagueCache) -> Self {
        Self {
            league: league.code().to_string(),
            run_id: cache.run_id().to_string(),
            ..Self::default()
        }
    }
}

/// Resolve the league row and build a fresh per-run cache for it.
async fn start_run(pool: &SqlitePool, league: LeagueCode) -> Result<LeagueCache> {
    let row = get_or_create_league(pool, league)
        .await
        .with_context(|| format!("could not resolve league {}", league))?;
    let cache = LeagueCache::load(pool, row.id).await?;
    tracing::info!("{} run {} started", league, cache.run_id());
    Ok(cache)
}

/// StatsAPI `person` block (MLB and NHL box scores share it) as a player record.
fn person_record(pdata: &Value, team_id: Option<i64>) -> Option<PlayerRecord> {
    let person = &pdata["person"];
    let ext_id = json_id(&person["id"])?;
    let full = json_str(&person["fullName"]).unwrap_or_default();
    let (first_name, last_name) = split_full_name(&full);
    Some(PlayerRecord {
        ext_id,
        first_name,
        last_name,
        position: json_str(&pdata["position"]["abbreviation"]),
        team_id,
    })
}

/// Backfill entry point taking raw season labels, as the CLI and scheduler do.
pub async fn backfill_league(
    pool: &SqlitePool,
    settings: &Settings,
    league: LeagueCode,
    seasons: &[String],
) -> Result<BackfillReport> {
    match league {
        LeagueCode::Nba => {
            let seasons = parse_year_seasons(seasons)?;
            NbaIngestor::from_settings(settings)?.backfill(pool, &seasons).await
        }
        LeagueCode::Mlb => {
            let seasons = parse_year_seasons(seasons)?;
            MlbIngestor::from_settings(settings)?.backfill(pool, &seasons).await
        }
        LeagueCode::Nhl => {
            for s in seasons {
                parse_nhl_season(s)?;
            }
            NhlIngestor::from_settings(settings)?.backfill(pool, seasons).await
        }
    }
}

/// Backfill the two most recent seasons of every league, one league at a time.
pub async fn backfill_two_years(
    pool: &SqlitePool,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Vec<BackfillReport>> {
    let window = season_window(now);
    let mut reports = Vec::new();

    tracing::info!("NBA seasons: {:?}", window.nba);
    reports.push(NbaIngestor::from_settings(settings)?.backfill(pool, &window.nba).await?);

    tracing::info!("MLB seasons: {:?}", window.mlb);
    reports.push(MlbIngestor::from_settings(settings)?.backfill(pool, &window.mlb).await?);

    tracing::info!("NHL seasons: {:?}", window.nhl);
    reports.push(NhlIngestor::from_settings(settings)?.backfill(pool, &window.nhl).await?);

    Ok(reports)
}

fn parse_year_seasons(seasons: &[String]) -> Result<Vec<i32>> {
    seasons
        .iter()
        .map(|s| {
            s.trim()
                .parse::<i32>()
                .with_context(|| format!("season must be a year like 2024, got '{}'", s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_person_record() {
        let pdata = json!({
            "person": {"id": 660271, "fullName": "Shohei Ohtani"},
            "position": {"abbreviation": "DH"}
        });
        let rec = person_record(&pdata, Some(3)).unwrap();
        assert_eq!(rec.ext_id, "660271");
        assert_eq!(rec.first_name, "Shohei");
        assert_eq!(rec.last_name, "Ohtani");
        assert_eq!(rec.position.as_deref(), Some("DH"));
        assert_eq!(rec.team_id, Some(3));

        assert!(person_record(&json!({"person": {"fullName": "Nobody"}}), None).is_none());
    }

    #[test]
    fn test_parse_year_seasons() {
        let ok = parse_year_seasons(&["2024".to_string(), " 2025".to_string()]).unwrap();
        assert_eq!(ok, vec![2024, 2025]);
        assert!(parse_year_seasons(&["20242025x".to_string()]).is_err());
    }
}
