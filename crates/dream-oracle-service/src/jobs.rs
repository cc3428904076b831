//! Single-shot batch jobs triggered by an external scheduler.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use dream_oracle_core::{SubscriptionStatus, Tier, User, UserId};
use dream_oracle_store::{Result, Store};

/// Result of the trial-expiration job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpireTrialsReport {
    /// Users downgraded to FREE.
    pub downgraded: usize,
}

/// Result of the usage-log retention job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Usage logs deleted.
    pub deleted: usize,
}

/// Downgrade every lapsed trial (PREMIUM, trial ended, no paid subscription)
/// to FREE and start a fresh metering window, in one batch.
///
/// Candidates are re-checked against their current record when the batch is
/// written, so a subscription applied after the scan is never overwritten.
pub fn expire_trials(store: &dyn Store, now: DateTime<Utc>) -> Result<ExpireTrialsReport> {
    let candidates: Vec<UserId> = store
        .list_users()?
        .into_iter()
        .filter(|user| user.trial_expired(now))
        .map(|user| user.id)
        .collect();

    let downgraded = store
        .modify_users(&candidates, &mut |user: &mut User| {
            if !user.trial_expired(now) {
                return false;
            }
            user.subscription_tier = Tier::Free;
            user.subscription_status = SubscriptionStatus::Expired;
            user.credits_reset_at = Some(now);
            user.updated_at = now;
            true
        })?
        .len();

    if downgraded < candidates.len() {
        tracing::debug!(
            candidates = candidates.len(),
            downgraded,
            "Some lapsed trials changed before the downgrade"
        );
    }
    tracing::info!(downgraded, "Trial expiration job finished");
    Ok(ExpireTrialsReport { downgraded })
}

/// Delete usage logs older than `retention_days`.
pub fn cleanup_usage_logs(
    store: &dyn Store,
    now: DateTime<Utc>,
    retention_days: i64,
) -> Result<CleanupReport> {
    let cutoff = now - Duration::days(retention_days);
    let deleted = store.delete_usage_logs_before(cutoff)?;

    tracing::info!(deleted, cutoff = %cutoff, "Usage log cleanup finished");
    Ok(CleanupReport { deleted })
}
