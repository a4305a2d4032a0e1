use serde_json::Value;

use super::http::{FetchError, HttpFetcher};
use super::schedule_game_ids;
use crate::config::Settings;

// ── NHL StatsAPI ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NhlClient {
    http: HttpFetcher,
    base_url: String,
}

impl NhlClient {
    pub fn new(http: HttpFetcher, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, FetchError> {
        let http = HttpFetcher::new(settings.http_timeout, settings.retry)?;
        Ok(Self::new(http, &settings.nhl_base_url))
    }

    /// `gamePk`s for a season label such as `"20242025"`.
    pub async fn season_game_ids(&self, season: &str) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/schedule", self.base_url);
        let schedule = self.http.get_json(&url, &[("season", season.to_string())]).await?;
        Ok(schedule_game_ids(&schedule))
    }

    pub async fn boxscore(&self, game_pk: &str) -> Result<Value, FetchError> {
        let url = format!("{}/game/{}/boxscore", self.base_url, game_pk);
        self.http.get_json(&url, &[]).await
    }
}
