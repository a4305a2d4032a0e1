use serde_json::Value;

use super::http::{FetchError, HttpFetcher};
use super::schedule_game_ids;
use crate::config::Settings;

// ── MLB StatsAPI ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MlbClient {
    http: HttpFetcher,
    base_url: String,
}

impl MlbClient {
    pub fn new(http: HttpFetcher, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, FetchError> {
        let http = HttpFetcher::new(settings.http_timeout, settings.retry)?;
        Ok(Self::new(http, &settings.mlb_base_url))
    }

    /// `gamePk`s of every regular-season MLB game in `season`.
    pub async fn season_game_ids(&self, season: i32) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/schedule", self.base_url);
        let query = [("sportId", "1".to_string()), ("season", season.to_string())];
        let schedule = self.http.get_json(&url, &query).await?;
        Ok(schedule_game_ids(&schedule))
    }

    /// Live feed: carries game date, teams and status under `gameData`.
    pub async fn game_feed(&self, game_pk: &str) -> Result<Value, FetchError> {
        let url = format!("{}/game/{}/feed/live", self.base_url, game_pk);
        self.http.get_json(&url, &[]).await
    }

    pub async fn boxscore(&self, game_pk: &str) -> Result<Value, FetchError> {
        let url = format!("{}/game/{}/boxscore", self.base_url, game_pk);
        self.http.get_json(&url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{fast_fetcher, spawn_server};
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_season_game_ids() {
        let router = Router::new().route(
            "/schedule",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("sportId").map(String::as_str), Some("1"));
                assert_eq!(q.get("season").map(String::as_str), Some("2025"));
                Json(json!({"dates": [{"games": [{"gamePk": 111}, {"gamePk": 222}]}]}))
            }),
        );
        let base = spawn_server(router).await;
        let client = MlbClient::new(fast_fetcher(), &base);

        assert_eq!(client.season_game_ids(2025).await.unwrap(), vec!["111", "222"]);
    }

    #[tokio::test]
    async fn test_feed_and_boxscore_paths() {
        let router = Router::new()
            .route("/game/111/feed/live", get(|| async { Json(json!({"gameData": {}})) }))
            .route("/game/111/boxscore", get(|| async { Json(json!({"teams": {}})) }));
        let base = spawn_server(router).await;
        let client = MlbClient::new(fast_fetcher(), &format!("{}/", base));

        assert!(client.game_feed("111").await.unwrap().get("gameData").is_some());
        assert!(client.boxscore("111").await.unwrap().get("teams").is_some());
        assert!(client.boxscore("999").await.is_err());
    }
}
