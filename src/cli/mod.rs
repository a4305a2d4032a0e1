use anyhow::Result;
use chrono::Utc;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use crate::config::Settings;
use crate::db::{init_database, league_summaries};
use crate::models::LeagueCode;
use crate::services::{backfill_league, backfill_two_years, rolling_points, write_csv, BackfillReport};
use crate::utils::season_window;

pub async fn init_db(settings: &Settings) -> Result<()> {
    init_database(&settings.database_url).await?;
    println!("✅ Database initialized at {}", settings.database_url);
    Ok(())
}

/// Backfill one league; with no seasons given, its two most recent ones.
pub async fn run_ingest(settings: &Settings, league: LeagueCode, seasons: Vec<String>) -> Result<()> {
    let pool = init_database(&settings.database_url).await?;

    let seasons = if seasons.is_empty() {
        let window = season_window(Utc::now());
        match league {
            LeagueCode::Nba => window.nba.iter().map(|s| s.to_string()).collect(),
            LeagueCode::Mlb => window.mlb.iter().map(|s| s.to_string()).collect(),
            LeagueCode::Nhl => window.nhl,
        }
    } else {
        seasons
    };

    println!("📥 Ingesting {} seasons {:?}...", league.display_name(), seasons);
    let report = backfill_league(&pool, settings, league, &seasons).await?;
    print_report(&report);
    Ok(())
}

pub async fn ingest_two_years(settings: &Settings) -> Result<()> {
    let pool = init_database(&settings.database_url).await?;
    let window = season_window(Utc::now());

    println!("📅 NBA seasons: {:?}", window.nba);
    println!("📅 MLB seasons: {:?}", window.mlb);
    println!("📅 NHL seasons: {:?}", window.nhl);

    for report in backfill_two_years(&pool, settings, Utc::now()).await? {
        print_report(&report);
    }
    println!("✅ Two-year backfill complete!");
    Ok(())
}

pub async fn show_features(
    settings: &Settings,
    window: usize,
    league: Option<LeagueCode>,
    csv_path: Option<&Path>,
) -> Result<()> {
    let pool = init_database(&settings.database_url).await?;
    let features = rolling_points(&pool, window, league).await?;

    if features.is_empty() {
        println!("📭 No stat lines with points yet. Try: statline ingest-two-years");
        return Ok(());
    }

    if let Some(path) = csv_path {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        write_csv(&features, File::create(path)?)?;
        println!("💾 Wrote {} rows to {}", features.len(), path.display());
        return Ok(());
    }

    println!("📈 Rolling points (window {}), last 20 rows:", window);
    let skip = features.len().saturating_sub(20);
    for f in features.iter().skip(skip) {
        println!(
            "   player {:>6} | game {:>6} | {} | pts {:>5.1} | avg {}",
            f.player_id,
            f.game_id,
            f.date.format("%Y-%m-%d"),
            f.pts,
            f.rolling_pts_avg
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!("✅ {} feature rows", features.len());
    Ok(())
}

pub async fn show_status(settings: &Settings) -> Result<()> {
    let pool = init_database(&settings.database_url).await?;
    let summaries = league_summaries(&pool).await?;

    if summaries.is_empty() {
        println!("📭 Nothing ingested yet.");
        return Ok(());
    }

    println!("📊 {}", settings.database_url);
    for s in summaries {
        println!(
            "   {:<4} teams {:>5} | players {:>6} | games {:>6} | stat lines {:>8}",
            s.league, s.teams, s.players, s.games, s.stats
        );
    }
    Ok(())
}

/// Runs `run_days + 1` times: once now, then once a day until `run_days` days have passed.
pub fn scheduled_runs(run_days: u32) -> u32 {
    run_days.saturating_add(1)
}

/// Run the two-year backfill now and then daily for `run_days` days.
pub async fn run_scheduler(settings: &Settings, run_days: u32) -> Result<()> {
    let pool = init_database(&settings.database_url).await?;
    let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
    let runs = scheduled_runs(run_days);

    println!("⏰ Scheduling {} backfill runs over {} day(s)", runs, run_days);
    for run in 1..=runs {
        // first tick completes immediately
        interval.tick().await;
        tracing::info!("Scheduled backfill {} of {}", run, runs);

        match backfill_two_years(&pool, settings, Utc::now()).await {
            Ok(reports) => reports.iter().for_each(print_report),
            // a failed run does not cancel the remaining ones
            Err(e) => tracing::error!("Scheduled backfill {} failed: {:#}", run, e),
        }
    }
    println!("✅ Scheduler finished");
    Ok(())
}

fn print_report(report: &BackfillReport) {
    println!(
        "✅ {} run {}: {} games stored, {} skipped, {} new stat lines",
        report.league,
        report.run_id,
        report.games_processed,
        report.games_skipped,
        report.stats_inserted
    );
    if !report.seasons_skipped.is_empty() {
        println!("⚠️  {} seasons skipped: {:?}", report.league, report.seasons_skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_runs_once_now_and_once_per_day() {
        assert_eq!(scheduled_runs(0), 1);
        assert_eq!(scheduled_runs(7), 8);
        assert_eq!(scheduled_runs(u32::MAX), u32::MAX);
    }
}
