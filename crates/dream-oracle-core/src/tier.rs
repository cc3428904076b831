//! Subscription tiers and statuses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Subscription level governing feature access and quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// No paid subscription.
    Free,
    /// Entry-level paid plan.
    Essential,
    /// Full access. Also granted during the registration trial.
    Premium,
}

impl Tier {
    /// All tiers, cheapest first.
    pub const ALL: [Self; 3] = [Self::Free, Self::Essential, Self::Premium];

    /// Get the tier name as stored and displayed.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Essential => "ESSENTIAL",
            Self::Premium => "PREMIUM",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "ESSENTIAL" => Ok(Self::Essential),
            "PREMIUM" => Ok(Self::Premium),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Internal subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// In good standing (includes upstream trials).
    Active,
    /// Canceled upstream.
    Canceled,
    /// A payment failed; tier access is kept as a grace period.
    PastDue,
    /// Ran out without renewal.
    Expired,
}

impl SubscriptionStatus {
    /// Map a payment-processor subscription status to the internal status.
    ///
    /// Unrecognized values map to [`SubscriptionStatus::Canceled`].
    #[must_use]
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "trialing" | "active" => Self::Active,
            "past_due" | "incomplete" => Self::PastDue,
            _ => Self::Canceled,
        }
    }

    /// Get the status name as stored and displayed.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::PastDue => "past_due",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
