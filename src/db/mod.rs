pub mod cache;
pub mod store;

pub use cache::{EntityKind, LeagueCache};
pub use store::PageWriter;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use crate::models::*;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if !file_path.starts_with(":memory:") {
        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    init_database_with_pool(&pool).await.unwrap();
    pool
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let pool = create_pool(database_url).await?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}

/// Idempotent schema creation.
pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leagues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id INTEGER NOT NULL REFERENCES leagues (id) ON DELETE CASCADE,
            ext_id TEXT NOT NULL,
            name TEXT NOT NULL,
            abbreviation TEXT,
            CONSTRAINT uq_team_league_ext UNIQUE (league_id, ext_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id INTEGER NOT NULL REFERENCES leagues (id) ON DELETE CASCADE,
            ext_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            position TEXT,
            team_id INTEGER REFERENCES teams (id) ON DELETE SET NULL,
            CONSTRAINT uq_player_league_ext UNIQUE (league_id, ext_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS games (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id INTEGER NOT NULL REFERENCES leagues (id) ON DELETE CASCADE,
            ext_id TEXT NOT NULL,
            season INTEGER NOT NULL,
            date TEXT NOT NULL,
            home_team_id INTEGER NOT NULL REFERENCES teams (id) ON DELETE CASCADE,
            visitor_team_id INTEGER NOT NULL REFERENCES teams (id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'Final',
            CONSTRAINT uq_game_league_ext UNIQUE (league_id, ext_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS player_game_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id INTEGER NOT NULL REFERENCES leagues (id) ON DELETE CASCADE,
            game_id INTEGER NOT NULL REFERENCES games (id) ON DELETE CASCADE,
            player_id INTEGER NOT NULL REFERENCES players (id) ON DELETE CASCADE,
            minutes REAL,
            pts REAL,
            reb REAL,
            ast REAL,
            stl REAL,
            blk REAL,
            fga REAL,
            fgm REAL,
            fg3a REAL,
            fg3m REAL,
            fta REAL,
            ftm REAL,
            turnovers REAL,
            CONSTRAINT uq_stat_game_player UNIQUE (league_id, game_id, player_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // prop_lines: written by the sportsbook collaborator, read by backtests
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prop_lines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            league_id INTEGER NOT NULL REFERENCES leagues (id) ON DELETE CASCADE,
            player_id INTEGER NOT NULL REFERENCES players (id) ON DELETE CASCADE,
            game_id INTEGER NOT NULL REFERENCES games (id) ON DELETE CASCADE,
            market TEXT NOT NULL,
            line REAL NOT NULL,
            source TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS ix_games_league_date ON games(league_id, date)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS ix_stats_player ON player_game_stats(player_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS ix_players_team ON players(team_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

// League operations

/// Leagues are created once; concurrent callers rely on the unique code.
pub async fn get_or_create_league(pool: &SqlitePool, league: LeagueCode) -> Result<League> {
    sqlx::query("INSERT INTO leagues (code, name) VALUES (?, ?) ON CONFLICT(code) DO NOTHING")
        .bind(league.code())
        .bind(league.display_name())
        .execute(pool)
        .await?;

    let row = sqlx::query_as::<_, League>("SELECT id, code, name FROM leagues WHERE code = ?")
        .bind(league.code())
        .fetch_one(pool)
        .await?;
    Ok(row)
}

pub async fn get_league(pool: &SqlitePool, league: LeagueCode) -> Result<Option<League>> {
    let row = sqlx::query_as::<_, League>("SELECT id, code, name FROM leagues WHERE code = ?")
        .bind(league.code())
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

// Entity listings

pub async fn list_teams(pool: &SqlitePool, league_id: i64) -> Result<Vec<Team>> {
    let teams = sqlx::query_as::<_, Team>("SELECT * FROM teams WHERE league_id = ? ORDER BY id")
        .bind(league_id)
        .fetch_all(pool)
        .await?;
    Ok(teams)
}

pub async fn list_players(pool: &SqlitePool, league_id: i64) -> Result<Vec<Player>> {
    let players = sqlx::query_as::<_, Player>("SELECT * FROM players WHERE league_id = ? ORDER BY id")
        .bind(league_id)
        .fetch_all(pool)
        .await?;
    Ok(players)
}

pub async fn list_games(pool: &SqlitePool, league_id: i64) -> Result<Vec<Game>> {
    let rows = sqlx::query("SELECT * FROM games WHERE league_id = ? ORDER BY id")
        .bind(league_id)
        .fetch_all(pool)
        .await?;

    let mut games = Vec::new();
    for row in rows {
        games.push(game_from_row(&row)?);
    }
    Ok(games)
}

pub async fn list_stats(pool: &SqlitePool, league_id: i64) -> Result<Vec<PlayerGameStat>> {
    let stats = sqlx::query_as::<_, PlayerGameStat>(
        "SELECT * FROM player_game_stats WHERE league_id = ? ORDER BY id",
    )
    .bind(league_id)
    .fetch_all(pool)
    .await?;
    Ok(stats)
}

fn game_from_row(row: &SqliteRow) -> Result<Game> {
    Ok(Game {
        id: row.get("id"),
        league_id: row.get("league_id"),
        ext_id: row.get("ext_id"),
        season: row.get("season"),
        date: parse_ts(&row.get::<String, _>("date"))?,
        home_team_id: row.get("home_team_id"),
        visitor_team_id: row.get("visitor_team_id"),
        status: row.get("status"),
    })
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Row counts per league, for status output.
pub async fn league_summaries(pool: &SqlitePool) -> Result<Vec<LeagueSummary>> {
    let rows = sqlx::query(
        r#"SELECT l.code AS league,
                  (SELECT COUNT(*) FROM teams t WHERE t.league_id = l.id) AS teams,
                  (SELECT COUNT(*) FROM players p WHERE p.league_id = l.id) AS players,
                  (SELECT COUNT(*) FROM games g WHERE g.league_id = l.id) AS games,
                  (SELECT COUNT(*) FROM player_game_stats s WHERE s.league_id = l.id) AS stats
           FROM leagues l ORDER BY l.code"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| LeagueSummary {
            league: r.get("league"),
            teams: r.get("teams"),
            players: r.get("players"),
            games: r.get("games"),
            stats: r.get("stats"),
        })
        .collect())
}

/// Non-null points joined with game dates, ordered by (player, date).
pub async fn points_by_player_date(
    pool: &SqlitePool,
    league: Option<LeagueCode>,
) -> Result<Vec<(i64, i64, DateTime<Utc>, f64)>> {
    let rows = sqlx::query(
        r#"SELECT s.player_id, s.game_id, g.date, s.pts
           FROM player_game_stats s
           JOIN games g ON g.id = s.game_id
           JOIN leagues l ON l.id = s.league_id
           WHERE s.pts IS NOT NULL AND (? IS NULL OR l.code = ?)
           ORDER BY s.player_id ASC, g.date ASC, s.game_id ASC"#,
    )
    .bind(league.map(|l| l.code()))
    .bind(league.map(|l| l.code()))
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push((
            row.get("player_id"),
            row.get("game_id"),
            parse_ts(&row.get::<String, _>("date"))?,
            row.get("pts"),
        ));
    }
    Ok(out)
}

// Prop line operations

pub async fn insert_prop_line(pool: &SqlitePool, prop: &PropLine) -> Result<i64> {
    let id = sqlx::query(
        r#"INSERT INTO prop_lines (league_id, player_id, game_id, market, line, source, fetched_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(prop.league_id)
    .bind(prop.player_id)
    .bind(prop.game_id)
    .bind(&prop.market)
    .bind(prop.line)
    .bind(&prop.source)
    .bind(prop.fetched_at.to_rfc3339())
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn prop_lines_for_game(pool: &SqlitePool, game_id: i64) -> Result<Vec<PropLine>> {
    let rows = sqlx::query("SELECT * FROM prop_lines WHERE game_id = ? ORDER BY id")
        .bind(game_id)
        .fetch_all(pool)
        .await?;

    let mut props = Vec::new();
    for row in rows {
        props.push(PropLine {
            league_id: row.get("league_id"),
            player_id: row.get("player_id"),
            game_id: row.get("game_id"),
            market: row.get("market"),
            line: row.get("line"),
            source: row.get("source"),
            fetched_at: parse_ts(&row.get::<String, _>("fetched_at"))?,
        });
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_schema_init_is_idempotent() {
        let pool = memory_pool().await;
        init_database_with_pool(&pool).await.unwrap();
        assert!(league_summaries(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_league_created_once() {
        let pool = memory_pool().await;
        let a = get_or_create_league(&pool, LeagueCode::Nba).await.unwrap();
        let b = get_or_create_league(&pool, LeagueCode::Nba).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, "National Basketball Association");

        let mlb = get_or_create_league(&pool, LeagueCode::Mlb).await.unwrap();
        assert_ne!(mlb.id, a.id);
        assert!(get_league(&pool, LeagueCode::Nhl).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prop_line_roundtrip_requires_parents() {
        let pool = memory_pool().await;
        let league = get_or_create_league(&pool, LeagueCode::Nba).await.unwrap();
        let fetched_at = Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap();

        let orphan = PropLine {
            league_id: league.id,
            player_id: 1,
            game_id: 1,
            market: "pts".to_string(),
            line: 24.5,
            source: "book".to_string(),
            fetched_at,
        };
        // no such player/game yet
        assert!(insert_prop_line(&pool, &orphan).await.is_err());

        sqlx::query("INSERT INTO teams (id, league_id, ext_id, name) VALUES (1, ?, '1', 'Home'), (2, ?, '2', 'Away')")
            .bind(league.id)
            .bind(league.id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO players (id, league_id, ext_id, first_name, last_name) VALUES (1, ?, '9', 'A', 'B')")
            .bind(league.id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO games (id, league_id, ext_id, season, date, home_team_id, visitor_team_id) VALUES (1, ?, '5', 2023, ?, 1, 2)")
            .bind(league.id)
            .bind(fetched_at.to_rfc3339())
            .execute(&pool)
            .await
            .unwrap();

        insert_prop_line(&pool, &orphan).await.unwrap();
        let props = prop_lines_for_game(&pool, 1).await.unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].line, 24.5);
        assert_eq!(props[0].fetched_at, fetched_at);
    }
}
