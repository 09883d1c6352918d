//! Release scoring and selection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::task::{Release, ReleaseStatus, ReleaseStore, TaskError, TaskStore};

/// Bonus for a release that carries a magnet link.
pub const MAGNET_BONUS: f64 = 50.0;
/// Freshness bonus on the day of publication; decays to zero over a week.
pub const FRESHNESS_MAX: f64 = 20.0;
const FRESHNESS_DAYS: f64 = 7.0;

/// Score one release at `now`.
///
/// `max(0, seeders) + magnet bonus + freshness + external score`.
pub fn score_release(release: &Release, now: DateTime<Utc>) -> f64 {
    let seeders = release.seeders.unwrap_or(0).max(0) as f64;
    let magnet = if release.magnet.is_some() {
        MAGNET_BONUS
    } else {
        0.0
    };
    let external = release.external_score.filter(|s| s.is_finite()).unwrap_or(0.0);

    seeders + magnet + freshness_bonus(release.published_at, now) + external
}

fn freshness_bonus(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published_at) = published_at else {
        return 0.0;
    };

    let days = (now - published_at).num_milliseconds() as f64 / 86_400_000.0;
    if days > FRESHNESS_DAYS {
        return 0.0;
    }

    (FRESHNESS_MAX - (days * (FRESHNESS_MAX / FRESHNESS_DAYS)).floor())
        .clamp(0.0, FRESHNESS_MAX)
}

/// Result of `ReleaseSelector::pick_best`.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Chosen { release: Release, score: f64 },
    NoCandidates,
}

impl Selection {
    pub fn release(&self) -> Option<&Release> {
        match self {
            Selection::Chosen { release, .. } => Some(release),
            Selection::NoCandidates => None,
        }
    }
}

/// Picks the best candidate release of a task.
pub struct ReleaseSelector {
    tasks: Arc<dyn TaskStore>,
    releases: Arc<dyn ReleaseStore>,
    clock: Arc<dyn Clock>,
}

impl ReleaseSelector {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        releases: Arc<dyn ReleaseStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            releases,
            clock,
        }
    }

    /// Score every non-rejected release of `task_id` and return the best.
    ///
    /// Releases below the task's `min_seeders` are not candidates. Ties go to
    /// the release discovered first. With `commit` the winner becomes `queued`.
    pub fn pick_best(&self, task_id: &str, commit: bool) -> Result<Selection, TaskError> {
        let task = self
            .tasks
            .get(task_id)?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        let now = self.clock.now();
        let min_seeders = task.min_seeders.map(i64::from);

        let candidates: Vec<Release> = self
            .releases
            .list_for_task(task_id)?
            .into_iter()
            .filter(|r| r.status != ReleaseStatus::Rejected)
            .filter(|r| match min_seeders {
                Some(min) => r.seeders.unwrap_or(0) >= min,
                None => true,
            })
            .collect();

        let scored: Vec<(Release, f64)> = candidates
            .into_iter()
            .map(|r| {
                let score = score_release(&r, now);
                (r, score)
            })
            .collect();

        if scored.is_empty() {
            return Ok(Selection::NoCandidates);
        }

        self.releases.set_scores(
            &scored
                .iter()
                .map(|(r, score)| (r.id.clone(), *score))
                .collect::<Vec<_>>(),
        )?;

        // Releases arrive in discovery order; strict `>` keeps the earliest on ties.
        let mut best: Option<(Release, f64)> = None;
        for (release, score) in scored {
            match &best {
                Some((_, best_score)) if score <= *best_score => {}
                _ => best = Some((release, score)),
            }
        }

        let Some((mut release, score)) = best else {
            return Ok(Selection::NoCandidates);
        };

        if commit {
            self.releases
                .set_release_status(&release.id, ReleaseStatus::Queued)?;
            release.status = ReleaseStatus::Queued;
        }
        release.score = Some(score);

        debug!(
            task_id = %task_id,
            release_id = %release.id,
            title = %release.title,
            score,
            "Picked best release"
        );

        Ok(Selection::Chosen { release, score })
    }
}
