use anyhow::Result;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::{person_record, start_run, BackfillReport};
use crate::config::Settings;
use crate::db::{LeagueCache, PageWriter};
use crate::models::{GameRecord, LeagueCode, MergeStrategy, StatLine, TeamRecord};
use crate::providers::NhlClient;
use crate::utils::{count_stat, json_id, json_str, nhl_placeholder_date, parse_nhl_season};

/// Hockey backfill over the NHL StatsAPI.
///
/// The box score has no game date, so every game is stamped with Oct 1 of its
/// season's first year. Points are goals + assists.
pub struct NhlIngestor {
    client: NhlClient,
    strategy: MergeStrategy,
}

impl NhlIngestor {
    pub fn new(client: NhlClient, strategy: MergeStrategy) -> Self {
        Self { client, strategy }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(NhlClient::from_settings(settings)?, settings.merge_strategy))
    }

    /// Backfill seasons labelled like `"20232024"`.
    pub async fn backfill(&self, pool: &SqlitePool, seasons: &[String]) -> Result<BackfillReport> {
        let labelled = seasons
            .iter()
            .map(|s| -> Result<(String, i32)> { Ok((s.trim().to_string(), parse_nhl_season(s)?)) })
            .collect::<Result<Vec<_>>>()?;

        let mut cache = start_run(pool, LeagueCode::Nhl).await?;
        let mut report = BackfillReport::new(LeagueCode::Nhl, &cache);

        for (season, start_year) in &labelled {
            info!("Fetching NHL {} schedule…", season);
            let game_pks = match self.client.season_game_ids(season).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("Unable to list NHL schedule for season {}: {}", season, e);
                    report.seasons_skipped.push(season.clone());
                    continue;
                }
            };
            info!("NHL {}: {} games scheduled", season, game_pks.len());

            for pk in &game_pks {
                self.ingest_game(pool, &mut cache, *start_year, pk, &mut report).await?;
            }
            report.seasons_completed.push(season.clone());
        }

        info!(
            "NHL run {} done: {} games, {} skipped, {} new stat lines",
            report.run_id, report.games_processed, report.games_skipped, report.stats_inserted
        );
        Ok(report)
    }

    async fn ingest_game(
        &self,
        pool: &SqlitePool,
        cache: &mut LeagueCache,
        start_year: i32,
        game_pk: &str,
        report: &mut BackfillReport,
    ) -> Result<()> {
        let boxscore = match self.client.boxscore(game_pk).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Skipping NHL game {}: {}", game_pk, e);
                report.games_skipped += 1;
                return Ok(());
            }
        };
        let Some(date) = nhl_placeholder_date(start_year) else {
            report.games_skipped += 1;
            return Ok(());
        };

        let teams = &boxscore["teams"];
        let mut page = PageWriter::begin(pool, cache, self.strategy).await?;
        let home_id = page.team(&map_side_team(&teams["home"], "home", game_pk)).await?;
        let away_id = page.team(&map_side_team(&teams["away"], "away", game_pk)).await?;
        let game_id = page
            .game(&GameRecord {
                ext_id: game_pk.to_string(),
                season: start_year,
                date,
                home_team_id: home_id,
                visitor_team_id: away_id,
                status: "Final".to_string(),
            })
            .await?;

        for (side, team_id) in [("home", home_id), ("away", away_id)] {
            for pdata in skaters(&teams[side]) {
                let Some(rec) = person_record(pdata, Some(team_id)) else {
                    continue;
                };
                let player_id = page.player(&rec).await?;
                page.stat(game_id, player_id, &StatLine::proxy_points(skater_points(pdata)))
                    .await?;
            }
        }

        report.stats_inserted += page.commit().await?;
        report.games_processed += 1;
        Ok(())
    }
}

/// Team block of one side, with positional placeholders when the feed omits it.
fn map_side_team(side: &Value, label: &str, game_pk: &str) -> TeamRecord {
    let team = &side["team"];
    TeamRecord {
        ext_id: json_id(&team["id"]).unwrap_or_else(|| format!("{}-{}", label, game_pk)),
        name: json_str(&team["name"]).unwrap_or_else(|| label.to_uppercase()),
        abbreviation: json_str(&team["abbreviation"]),
    }
}

/// Player entries listed under `skaters`, resolved through `players["ID{id}"]`.
fn skaters(side: &Value) -> Vec<&Value> {
    let Some(ids) = side["skaters"].as_array() else {
        return Vec::new();
    };
    ids.iter()
        .filter_map(json_id)
        .filter_map(|id| side["players"].get(format!("ID{}", id)))
        .collect()
}

/// Goals + assists.
fn skater_points(pdata: &Value) -> f64 {
    let sk = &pdata["stats"]["skaterStats"];
    count_stat(&sk["goals"]) + count_stat(&sk["assists"])
}
