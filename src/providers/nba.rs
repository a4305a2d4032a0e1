use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::http::{FetchError, HttpFetcher};
use crate::config::Settings;

// ── balldontlie.io ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BalldontlieClient {
    http: HttpFetcher,
    base_url: String,
    page_size: u32,
    page_delay: Duration,
}

impl BalldontlieClient {
    pub fn new(http: HttpFetcher, base_url: &str, page_size: u32, page_delay: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
            page_delay,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, FetchError> {
        let http = HttpFetcher::new(settings.http_timeout, settings.retry)?;
        Ok(Self::new(
            http,
            &settings.nba_base_url,
            settings.page_size,
            settings.page_delay,
        ))
    }

    pub fn games(&self, season: i32) -> Pager<'_> {
        self.pager("games", vec![("seasons[]", season.to_string())])
    }

    pub fn teams(&self) -> Pager<'_> {
        self.pager("teams", Vec::new())
    }

    pub fn players(&self) -> Pager<'_> {
        self.pager("players", Vec::new())
    }

    /// Every stat line of one game, across all pages.
    pub async fn game_stats(&self, game_id: &str) -> Result<Vec<Value>, FetchError> {
        self.pager("stats", vec![("game_ids[]", game_id.to_string())])
            .collect_all()
            .await
    }

    fn pager(&self, endpoint: &'static str, params: Vec<(&'static str, String)>) -> Pager<'_> {
        Pager {
            client: self,
            endpoint,
            params,
            page: 1,
            cursor: None,
            requests: 0,
            done: false,
        }
    }
}

/// Lazy walk over a paginated balldontlie endpoint.
///
/// Follows `meta.total_pages` when the server reports it, otherwise
/// `meta.next_cursor`; with neither, the first page is the only page.
pub struct Pager<'a> {
    client: &'a BalldontlieClient,
    endpoint: &'static str,
    params: Vec<(&'static str, String)>,
    page: u32,
    cursor: Option<u64>,
    requests: u32,
    done: bool,
}

impl Pager<'_> {
    /// Next page of `data` items, or `None` once the server reported the last page.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, FetchError> {
        if self.done {
            return Ok(None);
        }

        if self.requests > 0 && !self.client.page_delay.is_zero() {
            tokio::time::sleep(self.client.page_delay).await;
        }

        let mut query = self.params.clone();
        query.push(("per_page", self.client.page_size.to_string()));
        match self.cursor {
            Some(c) => query.push(("cursor", c.to_string())),
            None => query.push(("page", self.page.to_string())),
        }

        let url = format!("{}/{}", self.client.base_url, self.endpoint);
        let body = self.client.http.get_json(&url, &query).await?;
        self.requests += 1;

        let items = body["data"].as_array().cloned().unwrap_or_default();
        let meta = &body["meta"];

        if let Some(total_pages) = meta["total_pages"].as_u64() {
            self.done = u64::from(self.page) >= total_pages;
            self.page += 1;
        } else if let Some(next) = meta["next_cursor"].as_u64() {
            self.cursor = Some(next);
            self.done = items.is_empty();
        } else {
            self.done = true;
        }

        debug!(
            "{} page {} → {} items (done: {})",
            self.endpoint,
            self.requests,
            items.len(),
            self.done
        );
        Ok(Some(items))
    }

    pub async fn collect_all(mut self) -> Result<Vec<Value>, FetchError> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }

    /// Requests issued so far.
    pub fn requests(&self) -> u32 {
        self.requests
    }
}
