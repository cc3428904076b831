//! Metered actions, usage logs and limit check results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Tier, UsageLogId, User, UserId};

/// An action counted against a tier's per-period quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeteredAction {
    /// Creating a dream journal entry.
    Dream,
    /// Requesting an AI interpretation.
    Interpretation,
    /// Transcribing a voice recording.
    Transcription,
    /// Exporting the journal.
    Export,
}

impl MeteredAction {
    /// All metered actions.
    pub const ALL: [Self; 4] = [
        Self::Dream,
        Self::Interpretation,
        Self::Transcription,
        Self::Export,
    ];

    /// Get the action name as stored and displayed.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dream => "dream",
            Self::Interpretation => "interpretation",
            Self::Transcription => "transcription",
            Self::Export => "export",
        }
    }

    /// Stable one-byte code used in storage keys.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Dream => 1,
            Self::Interpretation => 2,
            Self::Transcription => 3,
            Self::Export => 4,
        }
    }
}

impl fmt::Display for MeteredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeteredAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown metered action: {s}"))
    }
}

/// An append-only record of one successful metered action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLog {
    /// Log entry ID.
    pub id: UsageLogId,
    /// The user who performed the action.
    pub user_id: UserId,
    /// What was done.
    pub action: MeteredAction,
    /// When it was recorded.
    pub created_at: DateTime<Utc>,
    /// Free-form reference to the resource acted upon (usually JSON).
    pub metadata: Option<String>,
}

impl UsageLog {
    /// Create a new log entry stamped at `created_at`.
    #[must_use]
    pub fn new(
        user_id: UserId,
        action: MeteredAction,
        created_at: DateTime<Utc>,
        metadata: Option<String>,
    ) -> Self {
        Self {
            id: UsageLogId::generate(),
            user_id,
            action,
            created_at,
            metadata,
        }
    }
}

/// Outcome of a quota check. A denied check is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCheck {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Per-period limit (0 when unlimited).
    pub limit: u32,
    /// Usage counted in the current period (0 when not counted).
    pub used: u32,
    /// Remaining allowance, never negative.
    pub remaining: u32,
    /// Whether the action is unmetered for this tier.
    pub is_unlimited: bool,
    /// The effective tier the check was made against.
    pub tier: Tier,
}

impl LimitCheck {
    /// An always-allowed, uncounted result.
    #[must_use]
    pub const fn unlimited(tier: Tier) -> Self {
        Self {
            allowed: true,
            limit: 0,
            used: 0,
            remaining: 0,
            is_unlimited: true,
            tier,
        }
    }

    /// A result for a tier with no access to the action at all.
    #[must_use]
    pub const fn no_access(tier: Tier) -> Self {
        Self {
            allowed: false,
            limit: 0,
            used: 0,
            remaining: 0,
            is_unlimited: false,
            tier,
        }
    }

    /// A result computed from a counted usage.
    #[must_use]
    pub const fn counted(tier: Tier, limit: u32, used: u32) -> Self {
        Self {
            allowed: used < limit,
            limit,
            used,
            remaining: limit.saturating_sub(used),
            is_unlimited: false,
            tier,
        }
    }
}

/// Start of the current metering window for `user`.
///
/// Uses `credits_reset_at` when set, otherwise the first instant of the
/// current calendar month (UTC).
#[must_use]
pub fn period_start(user: &User, now: DateTime<Utc>) -> DateTime<Utc> {
    user.credits_reset_at.unwrap_or_else(|| month_start(now))
}

/// First instant of the calendar month containing `now`.
#[must_use]
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}
