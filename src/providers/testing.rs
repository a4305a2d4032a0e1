//! Local stand-ins for the provider APIs.

use axum::Router;
use std::time::Duration;

use super::http::{HttpFetcher, RetryPolicy};

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Production retry bound, no backoff sleeps.
pub fn fast_fetcher() -> HttpFetcher {
    HttpFetcher::new(
        Duration::from_secs(5),
        RetryPolicy {
            max_attempts: 5,
            backoff_factor: Duration::ZERO,
        },
    )
    .unwrap()
}
