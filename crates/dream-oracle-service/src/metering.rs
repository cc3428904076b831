//! Usage metering: gate a metered action before it runs, record it after it succeeds.
//!
//! The check is read-only and the record is post-hoc, so two concurrent
//! requests may both pass the check for the last remaining slot. This is an
//! accepted soft limit. Metering never blocks or rolls back the action it
//! meters: a failed record is logged and swallowed by [`UsageMeter::metered`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use dream_oracle_core::{
    period_start, DomainError, LimitCheck, MeteredAction, Result, Tier, TierLimits, UsageLog, User,
    UserId,
};
use dream_oracle_store::Store;

use crate::error::ApiError;

/// Checks and records metered actions against the tier limit table.
#[derive(Clone)]
pub struct UsageMeter {
    store: Arc<dyn Store>,
    limits: Arc<TierLimits>,
}

/// Usage of every metered action in the current window.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    /// Effective tier.
    pub tier: Tier,
    /// Start of the current metering window.
    pub period_start: DateTime<Utc>,
    /// One check per action.
    pub actions: BTreeMap<MeteredAction, LimitCheck>,
}

/// Failure of a metered action run through [`UsageMeter::metered`].
#[derive(Debug, thiserror::Error)]
pub enum MeteredError<E> {
    /// The quota denied the action; it was not run.
    #[error("usage limit reached for {} tier", .0.tier)]
    LimitReached(LimitCheck),

    /// The check itself failed (unknown user, storage); the action was not run.
    #[error("metering failed: {0}")]
    Metering(DomainError),

    /// The action ran and failed; nothing was recorded.
    #[error("action failed: {0}")]
    Action(E),
}

impl<E: Into<ApiError>> From<MeteredError<E>> for ApiError {
    fn from(err: MeteredError<E>) -> Self {
        match err {
            MeteredError::LimitReached(check) => Self::UpgradeRequired(check),
            MeteredError::Metering(e) => e.into(),
            MeteredError::Action(e) => e.into(),
        }
    }
}

impl UsageMeter {
    /// Create a meter over a store and a limit table.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, limits: TierLimits) -> Self {
        Self {
            store,
            limits: Arc::new(limits),
        }
    }

    /// The limit table in use.
    #[must_use]
    pub fn limits(&self) -> &TierLimits {
        &self.limits
    }

    fn load_user(&self, user_id: &UserId) -> Result<User> {
        self.store
            .get_user(user_id)?
            .ok_or_else(|| DomainError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Check whether `user_id` may perform `action` now.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UserNotFound`] for unknown users and
    /// [`DomainError::Storage`] if the store fails.
    pub fn check_limit(&self, user_id: &UserId, action: MeteredAction) -> Result<LimitCheck> {
        let user = self.load_user(user_id)?;
        self.check_user(&user, action, Utc::now())
    }

    /// Check an already loaded user at `now`.
    ///
    /// Unlimited and zero-limit pairs are answered without counting usage.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Storage`] if counting fails.
    pub fn check_user(
        &self,
        user: &User,
        action: MeteredAction,
        now: DateTime<Utc>,
    ) -> Result<LimitCheck> {
        let tier = user.effective_tier(now);
        let quota = self.limits.get(tier, action);

        if quota.unlimited {
            return Ok(LimitCheck::unlimited(tier));
        }
        if quota.limit == 0 {
            return Ok(LimitCheck::no_access(tier));
        }

        let used = self
            .store
            .count_usage_since(&user.id, action, period_start(user, now))?;

        Ok(LimitCheck::counted(tier, quota.limit, used))
    }

    /// Append one usage log entry stamped now.
    ///
    /// Call only after the metered action has been durably persisted.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UserNotFound`] for unknown users and
    /// [`DomainError::Storage`] if the write fails.
    pub fn record_usage(
        &self,
        user_id: &UserId,
        action: MeteredAction,
        metadata: Option<String>,
    ) -> Result<UsageLog> {
        self.load_user(user_id)?;

        let log = UsageLog::new(*user_id, action, Utc::now(), metadata);
        self.store.append_usage_log(&log)?;

        tracing::debug!(user_id = %user_id, action = %action, log_id = %log.id, "Usage recorded");
        Ok(log)
    }

    /// Record usage, logging instead of returning a failure.
    pub fn record_usage_best_effort(
        &self,
        user_id: &UserId,
        action: MeteredAction,
        metadata: Option<String>,
    ) -> Option<UsageLog> {
        match self.record_usage(user_id, action, metadata) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    action = %action,
                    error = %e,
                    "Failed to record usage, action already completed"
                );
                None
            }
        }
    }

    /// Run `op` as a metered action: check, run, then record.
    ///
    /// The action is not run when the check denies it or fails. Once the action
    /// has succeeded its value is returned even if recording fails.
    pub async fn metered<T, E, F, Fut>(
        &self,
        user_id: &UserId,
        action: MeteredAction,
        metadata: Option<String>,
        op: F,
    ) -> std::result::Result<T, MeteredError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let check = self
            .check_limit(user_id, action)
            .map_err(MeteredError::Metering)?;

        if !check.allowed {
            tracing::info!(
                user_id = %user_id,
                action = %action,
                tier = %check.tier,
                used = check.used,
                limit = check.limit,
                "Metered action denied"
            );
            return Err(MeteredError::LimitReached(check));
        }

        let value = op().await.map_err(MeteredError::Action)?;
        self.record_usage_best_effort(user_id, action, metadata);

        Ok(value)
    }

    /// Check every metered action for a user.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UserNotFound`] for unknown users and
    /// [`DomainError::Storage`] if counting fails.
    pub fn summary(&self, user_id: &UserId) -> Result<UsageSummary> {
        let user = self.load_user(user_id)?;
        let now = Utc::now();

        let actions = MeteredAction::ALL
            .into_iter()
            .map(|action| Ok((action, self.check_user(&user, action, now)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(UsageSummary {
            tier: user.effective_tier(now),
            period_start: period_start(&user, now),
            actions,
        })
    }
}
