use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Leagues with an ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum LeagueCode {
    Nba,
    Mlb,
    Nhl,
}

impl LeagueCode {
    pub fn code(self) -> &'static str {
        match self {
            LeagueCode::Nba => "NBA",
            LeagueCode::Mlb => "MLB",
            LeagueCode::Nhl => "NHL",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            LeagueCode::Nba => "National Basketball Association",
            LeagueCode::Mlb => "Major League Baseball",
            LeagueCode::Nhl => "National Hockey League",
        }
    }
}

impl fmt::Display for LeagueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LeagueCode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NBA" => Ok(LeagueCode::Nba),
            "MLB" => Ok(LeagueCode::Mlb),
            "NHL" => Ok(LeagueCode::Nhl),
            other => Err(anyhow::anyhow!("League {} not implemented", other)),
        }
    }
}

/// How get-or-create treats a row that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Attributes are frozen at first insert.
    #[default]
    FirstWriteWins,
    /// Every sighting overwrites team/player/game attributes.
    LastWriteWins,
}

impl FromStr for MergeStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first-write-wins" | "first" => Ok(MergeStrategy::FirstWriteWins),
            "last-write-wins" | "last" => Ok(MergeStrategy::LastWriteWins),
            other => Err(anyhow::anyhow!("unknown merge strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct League {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: i64,
    pub league_id: i64,
    pub ext_id: String,
    pub name: String,
    pub abbreviation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Player {
    pub id: i64,
    pub league_id: i64,
    pub ext_id: String,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub team_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub league_id: i64,
    pub ext_id: String,
    pub season: i32,
    pub date: DateTime<Utc>,
    pub home_team_id: i64,
    pub visitor_team_id: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PlayerGameStat {
    pub id: i64,
    pub league_id: i64,
    pub game_id: i64,
    pub player_id: i64,
    pub minutes: Option<f64>,
    pub pts: Option<f64>,
    pub reb: Option<f64>,
    pub ast: Option<f64>,
    pub stl: Option<f64>,
    pub blk: Option<f64>,
    pub fga: Option<f64>,
    pub fgm: Option<f64>,
    pub fg3a: Option<f64>,
    pub fg3m: Option<f64>,
    pub fta: Option<f64>,
    pub ftm: Option<f64>,
    pub turnovers: Option<f64>,
}

/// Sportsbook line written by the prop-line collaborator, never by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropLine {
    pub league_id: i64,
    pub player_id: i64,
    pub game_id: i64,
    pub market: String,
    pub line: f64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

// ── Records handed to the entity store by the orchestrators ──────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecord {
    pub ext_id: String,
    pub name: String,
    pub abbreviation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub ext_id: String,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub team_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub ext_id: String,
    pub season: i32,
    pub date: DateTime<Utc>,
    pub home_team_id: i64,
    pub visitor_team_id: i64,
    pub status: String,
}

/// Sparse stat line. Basketball fills every field, the other sports only `pts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub minutes: Option<f64>,
    pub pts: Option<f64>,
    pub reb: Option<f64>,
    pub ast: Option<f64>,
    pub stl: Option<f64>,
    pub blk: Option<f64>,
    pub fga: Option<f64>,
    pub fgm: Option<f64>,
    pub fg3a: Option<f64>,
    pub fg3m: Option<f64>,
    pub fta: Option<f64>,
    pub ftm: Option<f64>,
    pub turnovers: Option<f64>,
}

impl StatLine {
    /// Line carrying only a sport-specific points proxy (runs+RBI, goals+assists).
    pub fn proxy_points(pts: f64) -> Self {
        Self {
            pts: Some(pts),
            ..Self::default()
        }
    }
}

// ── Feature output ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingFeature {
    pub player_id: i64,
    pub game_id: i64,
    pub date: DateTime<Utc>,
    pub pts: f64,
    pub rolling_pts_avg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueSummary {
    pub league: String,
    pub teams: i64,
    pub players: i64,
    pub games: i64,
    pub stats: i64,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_league_code_parse() {
        assert_eq!("nba".parse::<LeagueCode>().unwrap(), LeagueCode::Nba);
        assert_eq!(" NHL ".parse::<LeagueCode>().unwrap(), LeagueCode::Nhl);
        assert!("NFL".parse::<LeagueCode>().is_err());
    }

    #[test]
    fn test_merge_strategy_parse() {
        assert_eq!(
            "last-write-wins".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::LastWriteWins
        );
        assert_eq!(MergeStrategy::default(), MergeStrategy::FirstWriteWins);
        assert!("merge".parse::<MergeStrategy>().is_err());
    }

    #[test]
    fn test_proxy_points_leaves_rest_empty() {
        let line = StatLine::proxy_points(3.0);
        assert_eq!(line.pts, Some(3.0));
        assert_eq!(line.reb, None);
        assert_eq!(line.minutes, None);
    }
}
