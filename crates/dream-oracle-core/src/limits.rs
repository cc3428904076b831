//! Per-tier quotas for metered actions.
//!
//! The table is static configuration: built from code defaults and optionally
//! overridden by an operator-supplied JSON document at startup. Nothing here is
//! persisted or cached, so a changed table takes effect on the next request.
//!
//! # Default Table
//!
//! | Tier | Dream | Interpretation | Transcription | Export |
//! |------|-------|----------------|---------------|--------|
//! | FREE | 5 | 3 | 0 | 0 |
//! | ESSENTIAL | unlimited | 30 | 20 | 5 |
//! | PREMIUM | unlimited | unlimited | unlimited | unlimited |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{MeteredAction, Tier};

/// Quota for one `(tier, action)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLimit {
    /// Allowed uses per metering window. Ignored when `unlimited`.
    #[serde(default)]
    pub limit: u32,
    /// Never counted when set.
    #[serde(default)]
    pub unlimited: bool,
}

impl ActionLimit {
    /// A finite quota.
    #[must_use]
    pub const fn limited(limit: u32) -> Self {
        Self {
            limit,
            unlimited: false,
        }
    }

    /// No quota.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            limit: 0,
            unlimited: true,
        }
    }

    /// No access at all.
    #[must_use]
    pub const fn denied() -> Self {
        Self::limited(0)
    }
}

/// Maps `(tier, action)` to its quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierLimits {
    table: BTreeMap<Tier, BTreeMap<MeteredAction, ActionLimit>>,
}

impl Default for TierLimits {
    fn default() -> Self {
        use MeteredAction::{Dream, Export, Interpretation, Transcription};

        let mut limits = Self {
            table: BTreeMap::new(),
        };

        limits.set(Tier::Free, Dream, ActionLimit::limited(5));
        limits.set(Tier::Free, Interpretation, ActionLimit::limited(3));
        limits.set(Tier::Free, Transcription, ActionLimit::denied());
        limits.set(Tier::Free, Export, ActionLimit::denied());

        limits.set(Tier::Essential, Dream, ActionLimit::unlimited());
        limits.set(Tier::Essential, Interpretation, ActionLimit::limited(30));
        limits.set(Tier::Essential, Transcription, ActionLimit::limited(20));
        limits.set(Tier::Essential, Export, ActionLimit::limited(5));

        for action in MeteredAction::ALL {
            limits.set(Tier::Premium, action, ActionLimit::unlimited());
        }

        limits
    }
}

impl TierLimits {
    /// Look up the quota for a pair. Pairs absent from the table deny access.
    #[must_use]
    pub fn get(&self, tier: Tier, action: MeteredAction) -> ActionLimit {
        self.table
            .get(&tier)
            .and_then(|actions| actions.get(&action))
            .copied()
            .unwrap_or_else(ActionLimit::denied)
    }

    /// Set the quota for a pair.
    pub fn set(&mut self, tier: Tier, action: MeteredAction, limit: ActionLimit) {
        self.table.entry(tier).or_default().insert(action, limit);
    }

    /// Apply every entry of `overrides` on top of this table.
    #[must_use]
    pub fn merged_with(mut self, overrides: &Self) -> Self {
        for (tier, actions) in &overrides.table {
            for (action, limit) in actions {
                self.set(*tier, *action, *limit);
            }
        }
        self
    }

    /// Parse a (possibly partial) table from JSON of the form
    /// `{"FREE": {"dream": {"limit": 5}}, "PREMIUM": {"export": {"unlimited": true}}}`
    /// and merge it over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the table shape.
    pub fn from_json_overrides(json: &str) -> Result<Self, serde_json::Error> {
        let overrides: Self = serde_json::from_str(json)?;
        Ok(Self::default().merged_with(&overrides))
    }
}
