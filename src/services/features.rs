use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::io::Write;

use crate::db::points_by_player_date;
use crate::models::{LeagueCode, RollingFeature};

/// Minimum observations before a rolling mean is reported.
pub fn min_periods_for(window: usize) -> usize {
    (window / 2).max(1)
}

/// Trailing mean over the last `window` values, current one included.
/// Positions with fewer than `min_periods` values so far yield `None`.
pub fn rolling_mean(values: &[f64], window: usize, min_periods: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut buf: VecDeque<f64> = VecDeque::with_capacity(window);
    let mut sum = 0.0;

    for &v in values {
        buf.push_back(v);
        sum += v;
        if buf.len() > window {
            if let Some(old) = buf.pop_front() {
                sum -= old;
            }
        }
        if window > 0 && buf.len() >= min_periods {
            out.push(Some(sum / buf.len() as f64));
        } else {
            out.push(None);
        }
    }
    out
}

/// Attach a per-player rolling points mean to rows sorted by (player, date).
pub fn rolling_features(
    rows: &[(i64, i64, DateTime<Utc>, f64)],
    window: usize,
) -> Vec<RollingFeature> {
    let min_periods = min_periods_for(window);
    let mut features = Vec::with_capacity(rows.len());

    for group in rows.chunk_by(|a, b| a.0 == b.0) {
        let pts: Vec<f64> = group.iter().map(|r| r.3).collect();
        let means = rolling_mean(&pts, window, min_periods);
        for (&(player_id, game_id, date, pts), avg) in group.iter().zip(means) {
            features.push(RollingFeature {
                player_id,
                game_id,
                date,
                pts,
                rolling_pts_avg: avg,
            });
        }
    }
    features
}

/// Rolling points feature for every stored stat line with points.
pub async fn rolling_points(
    pool: &SqlitePool,
    window: usize,
    league: Option<LeagueCode>,
) -> Result<Vec<RollingFeature>> {
    if window == 0 {
        bail!("rolling window must be at least 1");
    }
    let rows = points_by_player_date(pool, league).await?;
    Ok(rolling_features(&rows, window))
}

pub fn write_csv<W: Write>(features: &[RollingFeature], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["player_id", "game_id", "date", "pts", "rolling_pts_avg"])?;
    for f in features {
        writer.write_record([
            f.player_id.to_string(),
            f.game_id.to_string(),
            f.date.format("%Y-%m-%d").to_string(),
            f.pts.to_string(),
            f.rolling_pts_avg.map(|v| format!("{:.3}", v)).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
