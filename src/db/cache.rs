//! Per-run ext-id → row-id index for one league.
//!
//! An orchestrator loads a fresh `LeagueCache` at the start of every run and
//! owns it until the run ends; it is never shared between leagues or runs.
//! Ids of rows inserted inside an open page are staged and only become
//! visible to later pages once that page commits.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Team,
    Player,
    Game,
}

impl EntityKind {
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Team => "teams",
            EntityKind::Player => "players",
            EntityKind::Game => "games",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Team => "team",
            EntityKind::Player => "player",
            EntityKind::Game => "game",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct LeagueCache {
    run_id: Uuid,
    league_id: i64,
    committed: HashMap<(EntityKind, String), i64>,
    staged: HashMap<(EntityKind, String), i64>,
}

impl LeagueCache {
    pub fn empty(league_id: i64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            league_id,
            committed: HashMap::new(),
            staged: HashMap::new(),
        }
    }

    /// Index every team, player and game already stored for `league_id`.
    pub async fn load(pool: &SqlitePool, league_id: i64) -> Result<Self, StoreError> {
        let mut cache = Self::empty(league_id);

        for kind in [EntityKind::Team, EntityKind::Player, EntityKind::Game] {
            let sql = format!("SELECT ext_id, id FROM {} WHERE league_id = ?", kind.table());
            let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
                .bind(league_id)
                .fetch_all(pool)
                .await?;
            for (ext_id, id) in rows {
                cache.committed.insert((kind, ext_id), id);
            }
        }

        tracing::debug!(
            "run {}: cached {} teams, {} players, {} games for league {}",
            cache.run_id,
            cache.len(EntityKind::Team),
            cache.len(EntityKind::Player),
            cache.len(EntityKind::Game),
            league_id
        );
        Ok(cache)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn league_id(&self) -> i64 {
        self.league_id
    }

    pub fn get(&self, kind: EntityKind, ext_id: &str) -> Option<i64> {
        let key = (kind, ext_id.to_string());
        self.staged
            .get(&key)
            .or_else(|| self.committed.get(&key))
            .copied()
    }

    /// Committed entries of one kind.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.committed.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Row that is already committed in the store (found by a fallback lookup).
    pub(crate) fn remember(&mut self, kind: EntityKind, ext_id: &str, id: i64) {
        self.committed.insert((kind, ext_id.to_string()), id);
    }

    /// Row inserted by the open page.
    pub(crate) fn stage(&mut self, kind: EntityKind, ext_id: &str, id: i64) {
        self.staged.insert((kind, ext_id.to_string()), id);
    }

    pub(crate) fn promote(&mut self) {
        self.committed.extend(self.staged.drain());
    }

    pub(crate) fn discard(&mut self) -> usize {
        let n = self.staged.len();
        self.staged.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_entries_need_promotion() {
        let mut cache = LeagueCache::empty(1);
        cache.stage(EntityKind::Team, "10", 5);
        assert_eq!(cache.get(EntityKind::Team, "10"), Some(5));
        assert_eq!(cache.len(EntityKind::Team), 0);

        cache.promote();
        assert_eq!(cache.len(EntityKind::Team), 1);
        assert_eq!(cache.get(EntityKind::Team, "10"), Some(5));
    }

    #[test]
    fn test_discard_drops_only_staged() {
        let mut cache = LeagueCache::empty(1);
        cache.remember(EntityKind::Player, "7", 1);
        cache.stage(EntityKind::Player, "8", 2);

        assert_eq!(cache.discard(), 1);
        assert_eq!(cache.get(EntityKind::Player, "7"), Some(1));
        assert_eq!(cache.get(EntityKind::Player, "8"), None);
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let mut cache = LeagueCache::empty(1);
        cache.remember(EntityKind::Team, "1", 10);
        cache.remember(EntityKind::Game, "1", 20);
        assert_eq!(cache.get(EntityKind::Team, "1"), Some(10));
        assert_eq!(cache.get(EntityKind::Game, "1"), Some(20));
        assert_eq!(cache.get(EntityKind::Player, "1"), None);
    }

    #[test]
    fn test_each_run_gets_its_own_id() {
        assert_ne!(LeagueCache::empty(1).run_id(), LeagueCache::empty(1).run_id());
    }
}
