//! User billing state and effective-tier resolution.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{SubscriptionStatus, Tier, UserId};

/// Default length of the free Premium trial granted at registration.
pub const DEFAULT_TRIAL_DAYS: i64 = 7;

/// The subset of a user's record that metering and billing depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user ID.
    pub id: UserId,

    /// Persisted tier. May lag behind reality for lapsed trials; use
    /// [`User::effective_tier`] for access decisions.
    pub subscription_tier: Tier,

    /// Persisted subscription status.
    pub subscription_status: SubscriptionStatus,

    /// End of the current paid period, if any.
    pub subscription_ends: Option<DateTime<Utc>>,

    /// End of the registration trial, if one was granted.
    pub trial_ends_at: Option<DateTime<Utc>>,

    /// Whether the user has already consumed their trial.
    pub trial_used: bool,

    /// Payment-processor customer ID.
    pub stripe_customer_id: Option<String>,

    /// Payment-processor subscription ID. Present only for paid subscriptions.
    pub stripe_subscription_id: Option<String>,

    /// Start of the current metering window.
    pub credits_reset_at: Option<DateTime<Utc>>,

    /// Birth date, required for biorhythm calculations.
    pub birth_date: Option<NaiveDate>,

    /// When the user was created.
    pub created_at: DateTime<Utc>,

    /// When the billing state was last changed.
    pub updated_at: DateTime<Utc>,
}

/// Trial state as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TrialState {
    /// No trial running (never granted, or superseded by a paid subscription).
    None,
    /// Trial running.
    Active {
        /// Whole days left, rounded up.
        days_left: i64,
    },
    /// Trial lapsed without a paid subscription.
    Expired,
}

impl User {
    /// Create a freshly registered user on a Premium trial.
    #[must_use]
    pub fn register(id: UserId, now: DateTime<Utc>, trial_days: i64) -> Self {
        Self {
            id,
            subscription_tier: Tier::Premium,
            subscription_status: SubscriptionStatus::Active,
            subscription_ends: None,
            trial_ends_at: Some(now + Duration::days(trial_days)),
            trial_used: true,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            credits_reset_at: Some(now),
            birth_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a paid subscription is attached.
    #[must_use]
    pub fn has_paid_subscription(&self) -> bool {
        self.stripe_subscription_id.is_some()
    }

    /// Whether the user is on a trial: stored Premium, a trial end date, no paid subscription.
    fn on_trial(&self) -> bool {
        self.subscription_tier == Tier::Premium
            && self.trial_ends_at.is_some()
            && !self.has_paid_subscription()
    }

    /// Resolve the trial state at `now`.
    #[must_use]
    pub fn trial_state(&self, now: DateTime<Utc>) -> TrialState {
        match self.trial_ends_at {
            Some(ends) if self.on_trial() => {
                if ends > now {
                    let seconds = (ends - now).num_seconds();
                    TrialState::Active {
                        days_left: (seconds + 86_399) / 86_400,
                    }
                } else {
                    TrialState::Expired
                }
            }
            _ => TrialState::None,
        }
    }

    /// The tier that governs access at `now`.
    ///
    /// A lapsed trial resolves to [`Tier::Free`] even if the stored tier has not
    /// been corrected yet by the expiration job.
    #[must_use]
    pub fn effective_tier(&self, now: DateTime<Utc>) -> Tier {
        effective_tier(self, now)
    }

    /// Whether this user should be downgraded by the trial-expiration job.
    #[must_use]
    pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
        self.trial_state(now) == TrialState::Expired
    }
}

/// The tier that governs access for `user` at `now`.
#[must_use]
pub fn effective_tier(user: &User, now: DateTime<Utc>) -> Tier {
    match user.trial_state(now) {
        TrialState::Expired => Tier::Free,
        TrialState::Active { .. } | TrialState::None => user.subscription_tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn registration_starts_premium_trial() {
        let user = User::register(UserId::generate(), now(), DEFAULT_TRIAL_DAYS);
        assert_eq!(user.subscription_tier, Tier::Premium);
        assert!(user.trial_used);
        assert_eq!(user.credits_reset_at, Some(now()));
        assert_eq!(user.trial_state(now()), TrialState::Active { days_left: 7 });
        assert_eq!(user.effective_tier(now()), Tier::Premium);
    }

    #[test]
    fn lapsed_trial_resolves_to_free() {
        let user = User::register(UserId::generate(), now(), DEFAULT_TRIAL_DAYS);
        let later = now() + Duration::days(8);

        assert_eq!(user.subscription_tier, Tier::Premium);
        assert_eq!(user.effective_tier(later), Tier::Free);
        assert!(user.trial_expired(later));
    }

    #[test]
    fn paid_subscription_ignores_trial_end() {
        let mut user = User::register(UserId::generate(), now(), DEFAULT_TRIAL_DAYS);
        user.stripe_subscription_id = Some("sub_123".into());
        let later = now() + Duration::days(30);

        assert_eq!(user.effective_tier(later), Tier::Premium);
        assert_eq!(user.trial_state(later), TrialState::None);
    }

    #[test]
    fn essential_with_old_trial_date_is_not_a_trial() {
        let mut user = User::register(UserId::generate(), now(), DEFAULT_TRIAL_DAYS);
        user.subscription_tier = Tier::Essential;
        let later = now() + Duration::days(30);

        assert_eq!(user.effective_tier(later), Tier::Essential);
        assert!(!user.trial_expired(later));
    }

    #[test]
    fn trial_days_left_rounds_up() {
        let user = User::register(UserId::generate(), now(), DEFAULT_TRIAL_DAYS);
        let later = now() + Duration::days(6) + Duration::hours(1);
        assert_eq!(user.trial_state(later), TrialState::Active { days_left: 1 });
    }

    #[test]
    fn trial_ending_exactly_now_is_expired() {
        let user = User::register(UserId::generate(), now(), DEFAULT_TRIAL_DAYS);
        let end = user.trial_ends_at.unwrap();
        assert_eq!(user.effective_tier(end), Tier::Free);
    }
}
