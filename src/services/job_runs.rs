//! Run audit for the pipelines
//!
//! Every tick outcome lands in `job_runs`. Periodic side jobs (donation
//! snapshots) consult [`is_due`] so their cadence survives restarts instead
//! of living in process memory.

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Set};

use crate::entities::job_runs::{self, Entity as JobRuns};

const FAILURE_STREAK_WARN: i32 = 5;

/// Job name prefixes. Per-clan jobs are suffixed with the clan tag.
pub mod jobs {
    pub const WAR_ARCHIVER: &str = "war_archiver";
    pub const WAR_LOG_SWEEP: &str = "war_log_sweep";
    pub const BUILDING_MONITOR: &str = "building_monitor";
    pub const DONATION_SNAPSHOT: &str = "donation_snapshot";

    pub fn for_clan(job: &str, clan_tag: &str) -> String {
        format!("{}:{}", job, clan_tag)
    }
}

/// Default intervals (in seconds)
pub mod intervals {
    pub const WAR_ARCHIVER: u64 = 900;        // 15 minutes
    pub const BUILDING_MONITOR: u64 = 90;     // upstream fairness policy
    pub const DONATION_SNAPSHOT: i64 = 21600; // 6 hours
    pub const FAILURE_BACKOFF: u64 = 60;
}

/// True when `job_name` has never succeeded or its last success is at least
/// `min_interval_secs` old. Failed attempts do not push the next run back.
pub async fn is_due(db: &DatabaseConnection, job_name: &str, min_interval_secs: i64) -> Result<bool, DbErr> {
    let last_success = JobRuns::find_by_id(job_name.to_string())
        .one(db)
        .await?
        .and_then(|run| run.last_success_at);

    let Some(last_success) = last_success else {
        return Ok(true);
    };

    let elapsed = Utc::now().signed_duration_since(last_success);
    let due = elapsed >= Duration::seconds(min_interval_secs);
    if !due {
        tracing::debug!(
            "[{}] Not due, last success {}s ago (interval {}s)",
            job_name,
            elapsed.num_seconds(),
            min_interval_secs
        );
    }
    Ok(due)
}

/// Folds one tick outcome into the job's row, creating it on first use.
pub async fn record_outcome(
    db: &DatabaseConnection,
    job_name: &str,
    outcome: Result<(), &str>,
) -> Result<(), DbErr> {
    let now = Utc::now();

    let Some(run) = JobRuns::find_by_id(job_name.to_string()).one(db).await? else {
        let (last_success_at, last_error) = match outcome {
            Ok(()) => (Some(now), None),
            Err(e) => (None, Some(e.to_string())),
        };
        job_runs::ActiveModel {
            job_name: Set(job_name.to_string()),
            last_attempt_at: Set(now),
            last_success_at: Set(last_success_at),
            last_error: Set(last_error),
            success_count: Set(i64::from(outcome.is_ok())),
            failure_count: Set(i64::from(outcome.is_err())),
            consecutive_failures: Set(i32::from(outcome.is_err())),
        }
        .insert(db)
        .await?;
        return Ok(());
    };

    let (success_count, failure_count, streak) =
        (run.success_count, run.failure_count, run.consecutive_failures);
    let mut active: job_runs::ActiveModel = run.into();
    active.last_attempt_at = Set(now);

    match outcome {
        Ok(()) => {
            active.last_success_at = Set(Some(now));
            active.last_error = Set(None);
            active.success_count = Set(success_count + 1);
            active.consecutive_failures = Set(0);
        }
        Err(e) => {
            active.last_error = Set(Some(e.to_string()));
            active.failure_count = Set(failure_count + 1);
            active.consecutive_failures = Set(streak + 1);
            if streak + 1 >= FAILURE_STREAK_WARN {
                tracing::warn!("[{}] {} consecutive failures, last: {}", job_name, streak + 1, e);
            }
        }
    }

    active.update(db).await?;
    Ok(())
}

/// All job rows ordered by name, for the ops status endpoint
pub async fn list_all(db: &DatabaseConnection) -> Result<Vec<job_runs::Model>, DbErr> {
    JobRuns::find()
        .order_by_asc(job_runs::Column::JobName)
        .all(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_names() {
        assert_eq!(jobs::for_clan(jobs::WAR_ARCHIVER, "#2PP"), "war_archiver:#2PP");
        assert_eq!(jobs::BUILDING_MONITOR, "building_monitor");
    }

    #[test]
    fn test_default_intervals() {
        assert_eq!(intervals::WAR_ARCHIVER, 900);
        assert_eq!(intervals::BUILDING_MONITOR, 90);
        assert_eq!(intervals::DONATION_SNAPSHOT, 6 * 3600);
    }
}
