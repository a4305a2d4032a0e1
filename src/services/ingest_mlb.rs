use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::{person_record, start_run, BackfillReport};
use crate::config::Settings;
use crate::db::{LeagueCache, PageWriter};
use crate::models::{GameRecord, LeagueCode, MergeStrategy, StatLine, TeamRecord};
use crate::providers::MlbClient;
use crate::utils::{count_stat, json_id, json_str, parse_provider_date};

/// Baseball backfill over the MLB StatsAPI.
///
/// The live feed supplies date, teams and status; the box score supplies
/// players. Points are approximated as runs + RBI.
pub struct MlbIngestor {
    client: MlbClient,
    strategy: MergeStrategy,
}

#[derive(Debug, Clone, PartialEq)]
struct FeedHeader {
    date: DateTime<Utc>,
    status: String,
    home: TeamRecord,
    away: TeamRecord,
}

impl MlbIngestor {
    pub fn new(client: MlbClient, strategy: MergeStrategy) -> Self {
        Self { client, strategy }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(MlbClient::from_settings(settings)?, settings.merge_strategy))
    }

    pub async fn backfill(&self, pool: &SqlitePool, seasons: &[i32]) -> Result<BackfillReport> {
        let mut cache = start_run(pool, LeagueCode::Mlb).await?;
        let mut report = BackfillReport::new(LeagueCode::Mlb, &cache);

        for &season in seasons {
            info!("Fetching MLB {} schedule…", season);
            let game_pks = match self.client.season_game_ids(season).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("Unable to load MLB schedule for {}: {}", season, e);
                    report.seasons_skipped.push(season.to_string());
                    continue;
                }
            };
            info!("MLB {}: {} games scheduled", season, game_pks.len());

            for pk in &game_pks {
                self.ingest_game(pool, &mut cache, season, pk, &mut report).await?;
            }
            report.seasons_completed.push(season.to_string());
        }

        info!(
            "MLB run {} done: {} games, {} skipped, {} new stat lines",
            report.run_id, report.games_processed, report.games_skipped, report.stats_inserted
        );
        Ok(report)
    }

    async fn ingest_game(
        &self,
        pool: &SqlitePool,
        cache: &mut LeagueCache,
        season: i32,
        game_pk: &str,
        report: &mut BackfillReport,
    ) -> Result<()> {
        let fetched = async {
            let feed = self.client.game_feed(game_pk).await?;
            let boxscore = self.client.boxscore(game_pk).await?;
            Ok::<_, crate::providers::FetchError>((feed, boxscore))
        }
        .await;
        let (feed, boxscore) = match fetched {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Skipping MLB game {}: {}", game_pk, e);
                report.games_skipped += 1;
                return Ok(());
            }
        };

        let Some(header) = map_feed_header(&feed, game_pk) else {
            warn!("Skipping MLB game {}: feed has no usable date", game_pk);
            report.games_skipped += 1;
            return Ok(());
        };

        let mut page = PageWriter::begin(pool, cache, self.strategy).await?;
        let home_id = page.team(&header.home).await?;
        let away_id = page.team(&header.away).await?;
        let game_id = page
            .game(&GameRecord {
                ext_id: game_pk.to_string(),
                season,
                date: header.date,
                home_team_id: home_id,
                visitor_team_id: away_id,
                status: header.status.clone(),
            })
            .await?;

        for (side, team_id) in [("home", home_id), ("away", away_id)] {
            let Some(players) = boxscore["teams"][side]["players"].as_object() else {
                continue;
            };
            for pdata in players.values() {
                let Some(rec) = person_record(pdata, Some(team_id)) else {
                    continue;
                };
                let player_id = page.player(&rec).await?;
                page.stat(game_id, player_id, &StatLine::proxy_points(batting_points(pdata)))
                    .await?;
            }
        }

        report.stats_inserted += page.commit().await?;
        report.games_processed += 1;
        Ok(())
    }
}

fn map_feed_team(raw: &Value, fallback_ext: String, fallback_name: &str) -> TeamRecord {
    TeamRecord {
        ext_id: json_id(&raw["id"]).unwrap_or(fallback_ext),
        name: json_str(&raw["name"]).unwrap_or_else(|| fallback_name.to_string()),
        abbreviation: json_str(&raw["abbreviation"]),
    }
}

fn map_feed_header(feed: &Value, game_pk: &str) -> Option<FeedHeader> {
    let game_data = &feed["gameData"];
    let date = parse_provider_date(game_data["datetime"]["dateTime"].as_str()?)?;
    Some(FeedHeader {
        date,
        status: json_str(&game_data["status"]["detailedState"])
            .unwrap_or_else(|| "Final".to_string()),
        home: map_feed_team(&game_data["teams"]["home"], format!("home-{}", game_pk), "HOME"),
        away: map_feed_team(&game_data["teams"]["away"], format!("away-{}", game_pk), "AWAY"),
    })
}

/// Runs + RBI.
fn batting_points(pdata: &Value) -> f64 {
    let batting = &pdata["stats"]["batting"];
    count_stat(&batting["runs"]) + count_stat(&batting["rbi"])
}
