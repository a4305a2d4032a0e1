use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Settings;
use crate::db::{
    get_league, init_database, insert_prop_line, league_summaries, list_games, list_players, list_stats,
    list_teams, prop_lines_for_game,
};
use crate::models::{
    ApiResponse, Game, League, LeagueCode, LeagueSummary, Player, PlayerGameStat, PropLine, RollingFeature, Team,
};
use crate::services::rolling_points;
use crate::utils::{season_window, SeasonWindow};

const DEFAULT_WINDOW: usize = 10;

type ApiError<T> = (StatusCode, Json<ApiResponse<T>>);

pub async fn serve(settings: &Settings, port: u16) -> anyhow::Result<()> {
    let pool = init_database(&settings.database_url).await?;

    let app = create_router().with_state(pool);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("StatLine API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router() -> Router<SqlitePool> {
    Router::new()
        .route("/health", get(health_check))
        .route("/features/rolling", get(rolling_features_handler))
        .route("/seasons/current", get(current_seasons_handler))
        .route("/leagues/summary", get(league_summary_handler))
        .route("/leagues/{code}/teams", get(league_teams_handler))
        .route("/leagues/{code}/players", get(league_players_handler))
        .route("/leagues/{code}/games", get(league_games_handler))
        .route("/leagues/{code}/stats", get(league_stats_handler))
        .route("/props", post(create_prop_handler))
        .route("/games/{id}/props", get(game_props_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("StatLine API is running"))
}

// GET /features/rolling?window=10&league=NBA
#[derive(Deserialize)]
struct RollingQuery {
    window: Option<usize>,
    league: Option<String>,
}

async fn rolling_features_handler(
    State(pool): State<SqlitePool>,
    Query(params): Query<RollingQuery>,
) -> Result<Json<ApiResponse<Vec<RollingFeature>>>, ApiError<Vec<RollingFeature>>> {
    let window = params.window.unwrap_or(DEFAULT_WINDOW);
    if window == 0 {
        return Err(bad_request("window must be at least 1".to_string()));
    }
    let league = match params.league.as_deref().map(str::parse::<LeagueCode>) {
        Some(Ok(l)) => Some(l),
        Some(Err(e)) => return Err(bad_request(e.to_string())),
        None => None,
    };

    match rolling_points(&pool, window, league).await {
        Ok(features) => Ok(Json(ApiResponse::success(features))),
        Err(e) => {
            tracing::error!("Failed to build rolling features: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("failed to build features".to_string())),
            ))
        }
    }
}

fn bad_request<T>(message: String) -> ApiError<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)))
}

// GET /seasons/current
async fn current_seasons_handler() -> Json<ApiResponse<SeasonWindow>> {
    Json(ApiResponse::success(season_window(Utc::now())))
}

// GET /leagues/summary
async fn league_summary_handler(
    State(pool): State<SqlitePool>,
) -> Result<Json<ApiResponse<Vec<LeagueSummary>>>, StatusCode> {
    match league_summaries(&pool).await {
        Ok(summaries) => Ok(Json(ApiResponse::success(summaries))),
        Err(e) => {
            tracing::error!("Failed to summarize leagues: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// GET /leagues/{code}/{teams,players,games,stats}
async fn resolve_league<T>(pool: &SqlitePool, code: &str) -> Result<League, ApiError<T>> {
    let code = code.parse::<LeagueCode>().map_err(|e| bad_request(e.to_string()))?;
    match get_league(pool, code).await {
        Ok(Some(league)) => Ok(league),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("{} has not been ingested", code))),
        )),
        Err(e) => {
            tracing::error!("Failed to resolve league {}: {}", code, e);
            Err(internal_error())
        }
    }
}

fn listing<T>(what: &str, rows: anyhow::Result<Vec<T>>) -> Result<Json<ApiResponse<Vec<T>>>, ApiError<Vec<T>>> {
    match rows {
        Ok(rows) => Ok(Json(ApiResponse::success(rows))),
        Err(e) => {
            tracing::error!("Failed to list {}: {}", what, e);
            Err(internal_error())
        }
    }
}

fn internal_error<T>() -> ApiError<T> {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error("database error".to_string())),
    )
}

async fn league_teams_handler(
    State(pool): State<SqlitePool>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<Vec<Team>>>, ApiError<Vec<Team>>> {
    let league = resolve_league(&pool, &code).await?;
    listing("teams", list_teams(&pool, league.id).await)
}

async fn league_players_handler(
    State(pool): State<SqlitePool>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<Vec<Player>>>, ApiError<Vec<Player>>> {
    let league = resolve_league(&pool, &code).await?;
    listing("players", list_players(&pool, league.id).await)
}

async fn league_games_handler(
    State(pool): State<SqlitePool>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<Vec<Game>>>, ApiError<Vec<Game>>> {
    let league = resolve_league(&pool, &code).await?;
    listing("games", list_games(&pool, league.id).await)
}

async fn league_stats_handler(
    State(pool): State<SqlitePool>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<Vec<PlayerGameStat>>>, ApiError<Vec<PlayerGameStat>>> {
    let league = resolve_league(&pool, &code).await?;
    listing("stat lines", list_stats(&pool, league.id).await)
}

// POST /props - record a sportsbook line for a stored player and game
#[derive(Deserialize)]
struct NewPropLine {
    league: String,
    player_id: i64,
    game_id: i64,
    market: String,
    line: f64,
    source: String,
}

async fn create_prop_handler(
    State(pool): State<SqlitePool>,
    Json(body): Json<NewPropLine>,
) -> Result<Json<ApiResponse<i64>>, ApiError<i64>> {
    let code = body.league.parse::<LeagueCode>().map_err(|e| bad_request(e.to_string()))?;
    let league = match get_league(&pool, code).await {
        Ok(Some(league)) => league,
        Ok(None) => return Err(bad_request(format!("{} has not been ingested", code))),
        Err(e) => {
            tracing::error!("Failed to resolve league {}: {}", code, e);
            return Err(internal_error());
        }
    };

    let prop = PropLine {
        league_id: league.id,
        player_id: body.player_id,
        game_id: body.game_id,
        market: body.market,
        line: body.line,
        source: body.source,
        fetched_at: Utc::now(),
    };
    match insert_prop_line(&pool, &prop).await {
        Ok(id) => Ok(Json(ApiResponse::success(id))),
        // unknown player or game ids fail the foreign keys
        Err(e) => Err(bad_request(e.to_string())),
    }
}

// GET /games/{id}/props
async fn game_props_handler(
    State(pool): State<SqlitePool>,
    Path(game_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<PropLine>>>, StatusCode> {
    match prop_lines_for_game(&pool, game_id).await {
        Ok(props) => Ok(Json(ApiResponse::success(props))),
        Err(e) => {
            tracing::error!("Failed to load props for game {}: {}", game_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
