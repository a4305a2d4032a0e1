use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::{start_run, BackfillReport};
use crate::config::Settings;
use crate::db::{EntityKind, LeagueCache, PageWriter};
use crate::models::{GameRecord, LeagueCode, MergeStrategy, PlayerRecord, StatLine, TeamRecord};
use crate::providers::BalldontlieClient;
use crate::utils::{json_id, json_str, parse_provider_date, stat_value};

/// Basketball backfill over balldontlie.
pub struct NbaIngestor {
    client: BalldontlieClient,
    strategy: MergeStrategy,
}

/// Game header as listed by the games endpoint.
#[derive(Debug, Clone, PartialEq)]
struct GameHeader {
    ext_id: String,
    season: i32,
    date: DateTime<Utc>,
    status: String,
    home: TeamRecord,
    visitor: TeamRecord,
}

impl NbaIngestor {
    pub fn new(client: BalldontlieClient, strategy: MergeStrategy) -> Self {
        Self { client, strategy }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            BalldontlieClient::from_settings(settings)?,
            settings.merge_strategy,
        ))
    }

    /// Backfill the given seasons. Safe to re-run: stored rows are skipped.
    pub async fn backfill(&self, pool: &SqlitePool, seasons: &[i32]) -> Result<BackfillReport> {
        let mut cache = start_run(pool, LeagueCode::Nba).await?;
        let mut report = BackfillReport::new(LeagueCode::Nba, &cache);

        self.bootstrap(pool, &mut cache).await?;

        for &season in seasons {
            info!("Fetching NBA {} games from balldontlie.io…", season);
            let mut pager = self.client.games(season);

            loop {
                let games = match pager.next_page().await {
                    Ok(Some(games)) => games,
                    Ok(None) => {
                        info!("NBA {} listing done in {} requests", season, pager.requests());
                        report.seasons_completed.push(season.to_string());
                        break;
                    }
                    Err(e) => {
                        warn!("Unable to list NBA games for season {}: {}", season, e);
                        report.seasons_skipped.push(season.to_string());
                        break;
                    }
                };

                for game in &games {
                    self.ingest_game(pool, &mut cache, season, game, &mut report).await?;
                }
            }
        }

        info!(
            "NBA run {} done: {} games, {} skipped, {} new stat lines",
            report.run_id, report.games_processed, report.games_skipped, report.stats_inserted
        );
        Ok(report)
    }

    /// Pre-populate teams and players so roster existence does not depend on box-score appearances.
    pub async fn bootstrap(&self, pool: &SqlitePool, cache: &mut LeagueCache) -> Result<()> {
        let mut teams = self.client.teams();
        let mut stored_teams = 0usize;
        loop {
            let page_items = match teams.next_page().await {
                Ok(Some(items)) => items,
                Ok(None) => break,
                Err(e) => {
                    warn!("NBA team bootstrap stopped early: {}", e);
                    break;
                }
            };
            let mut page = PageWriter::begin(pool, cache, self.strategy).await?;
            for t in &page_items {
                if let Some(rec) = map_team(t) {
                    page.team(&rec).await?;
                    stored_teams += 1;
                }
            }
            page.commit().await?;
        }

        let mut players = self.client.players();
        let mut stored_players = 0usize;
        loop {
            let page_items = match players.next_page().await {
                Ok(Some(items)) => items,
                Ok(None) => break,
                Err(e) => {
                    warn!("NBA player bootstrap stopped early: {}", e);
                    break;
                }
            };
            let mut page = PageWriter::begin(pool, cache, self.strategy).await?;
            for p in &page_items {
                let team_id = json_id(&p["team"]["id"])
                    .and_then(|ext| page.cached(EntityKind::Team, &ext));
                if let Some(rec) = map_player(p, team_id) {
                    page.player(&rec).await?;
                    stored_players += 1;
                }
            }
            page.commit().await?;
        }

        info!(
            "NBA bootstrap: {} teams, {} players seen",
            stored_teams, stored_players
        );
        Ok(())
    }

    async fn ingest_game(
        &self,
        pool: &SqlitePool,
        cache: &mut LeagueCache,
        season: i32,
        raw: &Value,
        report: &mut BackfillReport,
    ) -> Result<()> {
        let Some(header) = map_game_header(raw, season) else {
            warn!("Skipping NBA game with unusable header: {}", raw["id"]);
            report.games_skipped += 1;
            return Ok(());
        };

        // fetch everything before opening the page so a failure leaves no rows
        let stats = match self.client.game_stats(&header.ext_id).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Skipping NBA game {}: {}", header.ext_id, e);
                report.games_skipped += 1;
                return Ok(());
            }
        };

        let mut page = PageWriter::begin(pool, cache, self.strategy).await?;
        let home_id = page.team(&header.home).await?;
        let visitor_id = page.team(&header.visitor).await?;
        let game_id = page
            .game(&GameRecord {
                ext_id: header.ext_id.clone(),
                season: header.season,
                date: header.date,
                home_team_id: home_id,
                visitor_team_id: visitor_id,
                status: header.status.clone(),
            })
            .await?;

        for stat in &stats {
            let team_id = match map_team(&stat["team"]) {
                Some(team) => Some(page.team(&team).await?),
                None => None,
            };
            let Some(player) = map_player(&stat["player"], team_id) else {
                continue;
            };
            let player_id = page.player(&player).await?;
            page.stat(game_id, player_id, &map_stat_line(stat)).await?;
        }

        report.stats_inserted += page.commit().await?;
        report.games_processed += 1;
        Ok(())
    }
}

// ── Mapping ──────────────────────────────────────────────────────────────────

fn map_team(raw: &Value) -> Option<TeamRecord> {
    let ext_id = json_id(&raw["id"])?;
    let name = json_str(&raw["full_name"])
        .or_else(|| json_str(&raw["name"]))
        .unwrap_or_else(|| format!("Team {}", ext_id));
    Some(TeamRecord {
        ext_id,
        name,
        abbreviation: json_str(&raw["abbreviation"]),
    })
}

fn map_player(raw: &Value, team_id: Option<i64>) -> Option<PlayerRecord> {
    Some(PlayerRecord {
        ext_id: json_id(&raw["id"])?,
        first_name: json_str(&raw["first_name"]).unwrap_or_default(),
        last_name: json_str(&raw["last_name"]).unwrap_or_default(),
        position: json_str(&raw["position"]),
        team_id,
    })
}

fn map_game_header(raw: &Value, season: i32) -> Option<GameHeader> {
    Some(GameHeader {
        ext_id: json_id(&raw["id"])?,
        season: raw["season"]
            .as_i64()
            .and_then(|s| i32::try_from(s).ok())
            .unwrap_or(season),
        date: parse_provider_date(raw["date"].as_str()?)?,
        status: json_str(&raw["status"]).unwrap_or_else(|| "Final".to_string()),
        home: map_team(&raw["home_team"])?,
        visitor: map_team(&raw["visitor_team"])?,
    })
}

/// balldontlie stat lines map 1:1 onto the shared columns.
fn map_stat_line(raw: &Value) -> StatLine {
    StatLine {
        minutes: stat_value(&raw["min"]),
        pts: stat_value(&raw["pts"]),
        reb: stat_value(&raw["reb"]),
        ast: stat_value(&raw["ast"]),
        stl: stat_value(&raw["stl"]),
        blk: stat_value(&raw["blk"]),
        fga: stat_value(&raw["fga"]),
        fgm: stat_value(&raw["fgm"]),
        fg3a: stat_value(&raw["fg3a"]),
        fg3m: stat_value(&raw["fg3m"]),
        fta: stat_value(&raw["fta"]),
        ftm: stat_value(&raw["ftm"]),
        turnovers: stat_value(&raw["turnover"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{list_games, list_players, list_stats, list_teams, memory_pool};
    use crate::providers::testing::{fast_fetcher, spawn_server};
    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn team_json(id: u32, name: &str, abbr: &str) -> Value {
        json!({ "id": id, "full_name": name, "abbreviation": abbr })
    }

    fn game_json(id: u32, date: &str) -> Value {
        json!({
            "id": id,
            "date": date,
            "season": 2023,
            "status": "Final",
            "home_team": team_json(1, "Atlanta Hawks", "ATL"),
            "visitor_team": team_json(2, "Boston Celtics", "BOS")
        })
    }

    fn stat_json(player: u32, team: u32, pts: u32) -> Value {
        json!({
            "player": { "id": player, "first_name": "P", "last_name": format!("{}", player), "position": "G" },
            "team": team_json(team, if team == 1 { "Atlanta Hawks" } else { "Boston Celtics" }, ""),
            "min": "30:30", "pts": pts, "reb": 5, "ast": 3, "stl": 1, "blk": 0,
            "fga": 10, "fgm": 5, "fg3a": 4, "fg3m": 2, "fta": 2, "ftm": 2, "turnover": 1
        })
    }

    /// Fake balldontlie: 3 games over 2 pages; `/stats` for `broken_game` always 500s.
    fn fake_api(broken_game: Option<&'static str>) -> Router {
        Router::new()
            .route(
                "/teams",
                get(|| async {
                    Json(json!({
                        "data": [team_json(1, "Atlanta Hawks", "ATL"), team_json(2, "Boston Celtics", "BOS")],
                        "meta": { "total_pages": 1 }
                    }))
                }),
            )
            .route(
                "/players",
                get(|| async {
                    Json(json!({
                        "data": [{ "id": 10, "first_name": "Trae", "last_name": "Young", "position": "G", "team": { "id": 1 } }],
                        "meta": { "total_pages": 1 }
                    }))
                }),
            )
            .route(
                "/games",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    match q.get("page").map(String::as_str) {
                        Some("2") => Json(json!({
                            "data": [game_json(102, "2024-01-20")],
                            "meta": { "total_pages": 2 }
                        })),
                        _ => Json(json!({
                            "data": [game_json(100, "2024-01-10"), game_json(101, "2024-01-15")],
                            "meta": { "total_pages": 2 }
                        })),
                    }
                }),
            )
            .route(
                "/stats",
                get(move |Query(q): Query<HashMap<String, String>>| async move {
                    let game = q.get("game_ids[]").cloned().unwrap_or_default();
                    if Some(game.as_str()) == broken_game {
                        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({
                            "data": [stat_json(10, 1, 25), stat_json(20, 2, 18)],
                            "meta": { "total_pages": 1 }
                        })),
                    )
                }),
            )
    }

    async fn ingestor(router: Router) -> NbaIngestor {
        let base = spawn_server(router).await;
        let client = BalldontlieClient::new(fast_fetcher(), &base, 100, Duration::ZERO);
        NbaIngestor::new(client, MergeStrategy::FirstWriteWins)
    }

    #[test]
    fn test_map_stat_line() {
        let line = map_stat_line(&stat_json(10, 1, 25));
        assert_eq!(line.minutes, Some(30.5));
        assert_eq!(line.pts, Some(25.0));
        assert_eq!(line.turnovers, Some(1.0));
        assert_eq!(line.fg3m, Some(2.0));
    }

    #[test]
    fn test_map_game_header() {
        let header = map_game_header(&game_json(100, "2024-01-10T00:00:00.000Z"), 1999).unwrap();
        assert_eq!(header.ext_id, "100");
        assert_eq!(header.season, 2023);
        assert_eq!(header.home.abbreviation.as_deref(), Some("ATL"));
        assert_eq!(header.visitor.name, "Boston Celtics");

        let mut no_date = game_json(1, "x");
        no_date["date"] = Value::Null;
        assert!(map_game_header(&no_date, 2023).is_none());
    }

    #[tokio::test]
    async fn test_backfill_stores_everything() {
        let pool = memory_pool().await;
        let ingestor = ingestor(fake_api(None)).await;

        let report = ingestor.backfill(&pool, &[2023]).await.unwrap();

        assert_eq!(report.seasons_completed, vec!["2023"]);
        assert_eq!(report.games_processed, 3);
        assert_eq!(report.stats_inserted, 6);

        let league_id = 1;
        assert_eq!(list_teams(&pool, league_id).await.unwrap().len(), 2);
        assert_eq!(list_games(&pool, league_id).await.unwrap().len(), 3);
        let players = list_players(&pool, league_id).await.unwrap();
        assert_eq!(players.len(), 2);
        // bootstrap attached Trae Young to the Hawks
        assert_eq!(players[0].last_name, "Young");
        assert!(players[0].team_id.is_some());
        assert_eq!(list_stats(&pool, league_id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_backfill_twice_is_idempotent() {
        let pool = memory_pool().await;
        let ingestor = ingestor(fake_api(None)).await;

        ingestor.backfill(&pool, &[2023]).await.unwrap();
        let teams = list_teams(&pool, 1).await.unwrap();
        let players = list_players(&pool, 1).await.unwrap();
        let games = list_games(&pool, 1).await.unwrap();
        let stats = list_stats(&pool, 1).await.unwrap();

        let second = ingestor.backfill(&pool, &[2023]).await.unwrap();
        assert_eq!(second.stats_inserted, 0);
        assert_eq!(list_teams(&pool, 1).await.unwrap(), teams);
        assert_eq!(list_players(&pool, 1).await.unwrap(), players);
        assert_eq!(list_games(&pool, 1).await.unwrap(), games);
        assert_eq!(list_stats(&pool, 1).await.unwrap(), stats);
    }

    #[tokio::test]
    async fn test_failed_box_score_skips_only_that_game() {
        let pool = memory_pool().await;
        let ingestor = ingestor(fake_api(Some("101"))).await;

        let report = ingestor.backfill(&pool, &[2023]).await.unwrap();

        assert_eq!(report.games_processed, 2);
        assert_eq!(report.games_skipped, 1);
        let games = list_games(&pool, 1).await.unwrap();
        let ids: Vec<&str> = games.iter().map(|g| g.ext_id.as_str()).collect();
        assert_eq!(ids, vec!["100", "102"]);
        assert_eq!(list_stats(&pool, 1).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_season_listing_is_skipped() {
        let pool = memory_pool().await;
        let router = Router::new()
            .route("/teams", get(|| async { Json(json!({ "data": [] })) }))
            .route("/players", get(|| async { Json(json!({ "data": [] })) }))
            .route(
                "/games",
                get(|| async { (StatusCode::FORBIDDEN, Json(json!({}))) }),
            );
        let ingestor = ingestor(router).await;

        let report = ingestor.backfill(&pool, &[2022, 2023]).await.unwrap();
        assert_eq!(report.seasons_skipped, vec!["2022", "2023"]);
        assert!(report.seasons_completed.is_empty());
    }
}
