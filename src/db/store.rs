//! Get-or-create and insert-if-absent primitives, one transaction per page.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use thiserror::Error;

use super::cache::{EntityKind, LeagueCache};
use crate::models::{GameRecord, MergeStrategy, PlayerRecord, StatLine, TeamRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A (league, ext_id) insert collided with an existing row. Get-or-create
    /// never issues such an insert, so this means another writer raced us.
    #[error("integrity violation: {kind} '{ext_id}' already exists in league {league_id}")]
    Integrity {
        kind: EntityKind,
        league_id: i64,
        ext_id: String,
    },

    #[error("page writer already committed")]
    Finished,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// All writes for one page (one game's box score) inside a single transaction.
///
/// Dropping the writer without `commit` rolls the transaction back and forgets
/// every id it staged in the cache.
pub struct PageWriter<'c> {
    tx: Option<Transaction<'static, Sqlite>>,
    cache: &'c mut LeagueCache,
    strategy: MergeStrategy,
    stats_inserted: u32,
}

impl<'c> PageWriter<'c> {
    pub async fn begin(
        pool: &SqlitePool,
        cache: &'c mut LeagueCache,
        strategy: MergeStrategy,
    ) -> Result<Self, StoreError> {
        let tx = pool.begin().await?;
        Ok(Self {
            tx: Some(tx),
            cache,
            strategy,
            stats_inserted: 0,
        })
    }

    /// Row id known to this run, including rows staged by this page.
    pub fn cached(&self, kind: EntityKind, ext_id: &str) -> Option<i64> {
        self.cache.get(kind, ext_id)
    }

    pub async fn team(&mut self, rec: &TeamRecord) -> Result<i64, StoreError> {
        let league_id = self.cache.league_id();
        let tx = self.tx.as_mut().ok_or(StoreError::Finished)?;

        let existing = match self.cache.get(EntityKind::Team, &rec.ext_id) {
            Some(id) => Some(id),
            None => {
                let found = find_id(tx, EntityKind::Team, league_id, &rec.ext_id).await?;
                if let Some(id) = found {
                    self.cache.remember(EntityKind::Team, &rec.ext_id, id);
                }
                found
            }
        };

        match existing {
            Some(id) => {
                if self.strategy == MergeStrategy::LastWriteWins {
                    sqlx::query(
                        "UPDATE teams SET name = ?, abbreviation = COALESCE(?, abbreviation) WHERE id = ?",
                    )
                    .bind(&rec.name)
                    .bind(&rec.abbreviation)
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                }
                Ok(id)
            }
            None => {
                let id = insert_team(tx, league_id, rec).await?;
                self.cache.stage(EntityKind::Team, &rec.ext_id, id);
                Ok(id)
            }
        }
    }

    pub async fn player(&mut self, rec: &PlayerRecord) -> Result<i64, StoreError> {
        let league_id = self.cache.league_id();
        let tx = self.tx.as_mut().ok_or(StoreError::Finished)?;

        let existing = match self.cache.get(EntityKind::Player, &rec.ext_id) {
            Some(id) => Some(id),
            None => {
                let found = find_id(tx, EntityKind::Player, league_id, &rec.ext_id).await?;
                if let Some(id) = found {
                    self.cache.remember(EntityKind::Player, &rec.ext_id, id);
                }
                found
            }
        };

        match existing {
            Some(id) => {
                if self.strategy == MergeStrategy::LastWriteWins {
                    sqlx::query(
                        r#"UPDATE players SET first_name = ?, last_name = ?,
                               position = COALESCE(?, position),
                               team_id = COALESCE(?, team_id)
                           WHERE id = ?"#,
                    )
                    .bind(&rec.first_name)
                    .bind(&rec.last_name)
                    .bind(&rec.position)
                    .bind(rec.team_id)
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                }
                Ok(id)
            }
            None => {
                let id = insert_player(tx, league_id, rec).await?;
                self.cache.stage(EntityKind::Player, &rec.ext_id, id);
                Ok(id)
            }
        }
    }

    pub async fn game(&mut self, rec: &GameRecord) -> Result<i64, StoreError> {
        let league_id = self.cache.league_id();
        let tx = self.tx.as_mut().ok_or(StoreError::Finished)?;

        let existing = match self.cache.get(EntityKind::Game, &rec.ext_id) {
            Some(id) => Some(id),
            None => {
                let found = find_id(tx, EntityKind::Game, league_id, &rec.ext_id).await?;
                if let Some(id) = found {
                    self.cache.remember(EntityKind::Game, &rec.ext_id, id);
                }
                found
            }
        };

        match existing {
            Some(id) => {
                if self.strategy == MergeStrategy::LastWriteWins {
                    sqlx::query(
                        r#"UPDATE games SET season = ?, date = ?, home_team_id = ?,
                               visitor_team_id = ?, status = ?
                           WHERE id = ?"#,
                    )
                    .bind(rec.season)
                    .bind(rec.date.to_rfc3339())
                    .bind(rec.home_team_id)
                    .bind(rec.visitor_team_id)
                    .bind(&rec.status)
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
                }
                Ok(id)
            }
            None => {
                let id = insert_game(tx, league_id, rec).await?;
                self.cache.stage(EntityKind::Game, &rec.ext_id, id);
                Ok(id)
            }
        }
    }

    /// Record a stat line unless one exists for (league, game, player).
    /// Returns whether a row was written.
    pub async fn stat(
        &mut self,
        game_id: i64,
        player_id: i64,
        line: &StatLine,
    ) -> Result<bool, StoreError> {
        let league_id = self.cache.league_id();
        let tx = self.tx.as_mut().ok_or(StoreError::Finished)?;
        let inserted = insert_stat(tx, league_id, game_id, player_id, line).await?;
        if inserted {
            self.stats_inserted += 1;
        }
        Ok(inserted)
    }

    /// Commit the page and publish its staged ids. Returns stat rows written.
    pub async fn commit(mut self) -> Result<u32, StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        if let Err(e) = tx.commit().await {
            self.cache.discard();
            return Err(e.into());
        }
        self.cache.promote();
        Ok(self.stats_inserted)
    }
}

impl Drop for PageWriter<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let dropped = self.cache.discard();
            tracing::debug!("page rolled back, {} staged rows discarded", dropped);
        }
    }
}

// ── Statements ───────────────────────────────────────────────────────────────

pub async fn find_id(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    league_id: i64,
    ext_id: &str,
) -> Result<Option<i64>, StoreError> {
    let sql = format!("SELECT id FROM {} WHERE league_id = ? AND ext_id = ?", kind.table());
    let id = sqlx::query_scalar::<_, i64>(&sql)
        .bind(league_id)
        .bind(ext_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

pub async fn insert_team(
    conn: &mut SqliteConnection,
    league_id: i64,
    rec: &TeamRecord,
) -> Result<i64, StoreError> {
    let result = sqlx::query(
        "INSERT INTO teams (league_id, ext_id, name, abbreviation) VALUES (?, ?, ?, ?)",
    )
    .bind(league_id)
    .bind(&rec.ext_id)
    .bind(&rec.name)
    .bind(&rec.abbreviation)
    .execute(&mut *conn)
    .await;
    inserted_id(result, EntityKind::Team, league_id, &rec.ext_id)
}

pub async fn insert_player(
    conn: &mut SqliteConnection,
    league_id: i64,
    rec: &PlayerRecord,
) -> Result<i64, StoreError> {
    let result = sqlx::query(
        r#"INSERT INTO players (league_id, ext_id, first_name, last_name, position, team_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(league_id)
    .bind(&rec.ext_id)
    .bind(&rec.first_name)
    .bind(&rec.last_name)
    .bind(&rec.position)
    .bind(rec.team_id)
    .execute(&mut *conn)
    .await;
    inserted_id(result, EntityKind::Player, league_id, &rec.ext_id)
}

pub async fn insert_game(
    conn: &mut SqliteConnection,
    league_id: i64,
    rec: &GameRecord,
) -> Result<i64, StoreError> {
    let result = sqlx::query(
        r#"INSERT INTO games (league_id, ext_id, season, date, home_team_id, visitor_team_id, status)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(league_id)
    .bind(&rec.ext_id)
    .bind(rec.season)
    .bind(rec.date.to_rfc3339())
    .bind(rec.home_team_id)
    .bind(rec.visitor_team_id)
    .bind(&rec.status)
    .execute(&mut *conn)
    .await;
    inserted_id(result, EntityKind::Game, league_id, &rec.ext_id)
}

pub async fn insert_stat(
    conn: &mut SqliteConnection,
    league_id: i64,
    game_id: i64,
    player_id: i64,
    line: &StatLine,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"INSERT INTO player_game_stats
           (league_id, game_id, player_id, minutes, pts, reb, ast, stl, blk,
            fga, fgm, fg3a, fg3m, fta, ftm, turnovers)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT (league_id, game_id, player_id) DO NOTHING"#,
    )
    .bind(league_id)
    .bind(game_id)
    .bind(player_id)
    .bind(line.minutes)
    .bind(line.pts)
    .bind(line.reb)
    .bind(line.ast)
    .bind(line.stl)
    .bind(line.blk)
    .bind(line.fga)
    .bind(line.fgm)
    .bind(line.fg3a)
    .bind(line.fg3m)
    .bind(line.fta)
    .bind(line.ftm)
    .bind(line.turnovers)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

fn inserted_id(
    result: Result<sqlx::sqlite::SqliteQueryResult, sqlx::Error>,
    kind: EntityKind,
    league_id: i64,
    ext_id: &str,
) -> Result<i64, StoreError> {
    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(StoreError::Integrity {
                kind,
                league_id,
                ext_id: ext_id.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_or_create_league, list_games, list_players, list_stats, list_teams, memory_pool};
    use crate::models::LeagueCode;
    use chrono::{TimeZone, Utc};

    fn team(ext: &str, name: &str) -> TeamRecord {
        TeamRecord {
            ext_id: ext.to_string(),
            name: name.to_string(),
            abbreviation: None,
        }
    }

    fn player(ext: &str, first: &str, team_id: Option<i64>) -> PlayerRecord {
        PlayerRecord {
            ext_id: ext.to_string(),
            first_name: first.to_string(),
            last_name: "Doe".to_string(),
            position: None,
            team_id,
        }
    }

    fn game(ext: &str, home: i64, away: i64, status: &str) -> GameRecord {
        GameRecord {
            ext_id: ext.to_string(),
            season: 2023,
            date: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            home_team_id: home,
            visitor_team_id: away,
            status: status.to_string(),
        }
    }

    async fn setup() -> (SqlitePool, LeagueCache) {
        let pool = memory_pool().await;
        let league = get_or_create_league(&pool, LeagueCode::Nba).await.unwrap();
        let cache = LeagueCache::load(&pool, league.id).await.unwrap();
        (pool, cache)
    }

    #[tokio::test]
    async fn test_same_team_twice_is_one_row() {
        let (pool, mut cache) = setup().await;

        let mut page = PageWriter::begin(&pool, &mut cache, MergeStrategy::FirstWriteWins).await.unwrap();
        let first = page.team(&team("1", "Hawks")).await.unwrap();
        let second = page.team(&team("1", "Atlanta Hawks")).await.unwrap();
        page.commit().await.unwrap();

        assert_eq!(first, second);
        let teams = list_teams(&pool, cache.league_id()).await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].name, "Hawks");
    }

    #[tokio::test]
    async fn test_fresh_cache_finds_committed_rows() {
        let (pool, mut cache) = setup().await;
        let league_id = cache.league_id();

        let mut page = PageWriter::begin(&pool, &mut cache, MergeStrategy::FirstWriteWins).await.unwrap();
        let id = page.team(&team("1", "Hawks")).await.unwrap();
        page.commit().await.unwrap();

        // a cache that never saw the insert falls back to the table
        let mut stale = LeagueCache::empty(league_id);
        let mut page = PageWriter::begin(&pool, &mut stale, MergeStrategy::FirstWriteWins).await.unwrap();
        assert_eq!(page.team(&team("1", "Hawks")).await.unwrap(), id);
        page.commit().await.unwrap();
        assert_eq!(stale.get(EntityKind::Team, "1"), Some(id));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_integrity_error() {
        let (pool, cache) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        insert_team(&mut conn, cache.league_id(), &team("1", "Hawks")).await.unwrap();
        let err = insert_team(&mut conn, cache.league_id(), &team("1", "Hawks")).await.unwrap_err();

        assert!(matches!(err, StoreError::Integrity { kind: EntityKind::Team, .. }));
    }

    #[tokio::test]
    async fn test_dropped_page_rolls_back() {
        let (pool, mut cache) = setup().await;
        let league_id = cache.league_id();

        {
            let mut page = PageWriter::begin(&pool, &mut cache, MergeStrategy::FirstWriteWins).await.unwrap();
            let home = page.team(&team("1", "Hawks")).await.unwrap();
            let away = page.team(&team("2", "Celtics")).await.unwrap();
            let game_id = page.game(&game("100", home, away, "Final")).await.unwrap();
            let player_id = page.player(&player("7", "Jane", Some(home))).await.unwrap();
            page.stat(game_id, player_id, &StatLine::proxy_points(10.0)).await.unwrap();
            // dropped without commit
        }

        assert_eq!(cache.get(EntityKind::Team, "1"), None);
        assert_eq!(cache.get(EntityKind::Game, "100"), None);
        assert!(list_teams(&pool, league_id).await.unwrap().is_empty());
        assert!(list_games(&pool, league_id).await.unwrap().is_empty());
        assert!(list_stats(&pool, league_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stat_is_written_once() {
        let (pool, mut cache) = setup().await;
        let league_id = cache.league_id();

        let mut page = PageWriter::begin(&pool, &mut cache, MergeStrategy::FirstWriteWins).await.unwrap();
        let home = page.team(&team("1", "Hawks")).await.unwrap();
        let away = page.team(&team("2", "Celtics")).await.unwrap();
        let game_id = page.game(&game("100", home, away, "Final")).await.unwrap();
        let player_id = page.player(&player("7", "Jane", None)).await.unwrap();
        assert!(page.stat(game_id, player_id, &StatLine::proxy_points(10.0)).await.unwrap());
        assert!(!page.stat(game_id, player_id, &StatLine::proxy_points(99.0)).await.unwrap());
        assert_eq!(page.commit().await.unwrap(), 1);

        let stats = list_stats(&pool, league_id).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].pts, Some(10.0));
    }

    #[tokio::test]
    async fn test_first_write_wins_freezes_attributes() {
        let (pool, mut cache) = setup().await;
        let league_id = cache.league_id();

        let mut page = PageWriter::begin(&pool, &mut cache, MergeStrategy::FirstWriteWins).await.unwrap();
        let home = page.team(&team("1", "Hawks")).await.unwrap();
        let away = page.team(&team("2", "Celtics")).await.unwrap();
        page.game(&game("100", home, away, "Scheduled")).await.unwrap();
        page.player(&player("7", "Jane", None)).await.unwrap();
        page.commit().await.unwrap();

        let mut page = PageWriter::begin(&pool, &mut cache, MergeStrategy::FirstWriteWins).await.unwrap();
        page.game(&game("100", home, away, "Final")).await.unwrap();
        page.player(&player("7", "Janet", Some(home))).await.unwrap();
        page.commit().await.unwrap();

        let games = list_games(&pool, league_id).await.unwrap();
        assert_eq!(games[0].status, "Scheduled");
        let players = list_players(&pool, league_id).await.unwrap();
        assert_eq!(players[0].first_name, "Jane");
        assert_eq!(players[0].team_id, None);
    }

    #[tokio::test]
    async fn test_last_write_wins_updates_attributes() {
        let (pool, mut cache) = setup().await;
        let league_id = cache.league_id();

        let mut page = PageWriter::begin(&pool, &mut cache, MergeStrategy::LastWriteWins).await.unwrap();
        let home = page.team(&team("1", "Hawks")).await.unwrap();
        let away = page.team(&team("2", "Celtics")).await.unwrap();
        page.game(&game("100", home, away, "Scheduled")).await.unwrap();
        page.player(&player("7", "Jane", Some(home))).await.unwrap();
        page.commit().await.unwrap();

        let mut page = PageWriter::begin(&pool, &mut cache, MergeStrategy::LastWriteWins).await.unwrap();
        page.team(&team("1", "Atlanta Hawks")).await.unwrap();
        page.game(&game("100", home, away, "Final")).await.unwrap();
        // a sighting without team context keeps the known team
        page.player(&player("7", "Janet", None)).await.unwrap();
        page.commit().await.unwrap();

        assert_eq!(list_teams(&pool, league_id).await.unwrap()[0].name, "Atlanta Hawks");
        assert_eq!(list_games(&pool, league_id).await.unwrap()[0].status, "Final");
        let players = list_players(&pool, league_id).await.unwrap();
        assert_eq!(players[0].first_name, "Janet");
        assert_eq!(players[0].team_id, Some(home));
    }

    #[tokio::test]
    async fn test_game_requires_persisted_teams() {
        let (pool, mut cache) = setup().await;

        let mut page = PageWriter::begin(&pool, &mut cache, MergeStrategy::FirstWriteWins).await.unwrap();
        let err = page.game(&game("100", 41, 42, "Final")).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
