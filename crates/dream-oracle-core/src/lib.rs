//! Core types and utilities for DreamOracle.
//!
//! This crate holds the two self-contained pieces of the product:
//!
//! - **Usage metering**: `Tier`, `User`, `MeteredAction`, `UsageLog`, `LimitCheck`
//!   and the static `TierLimits` table. Effective-tier resolution lives in
//!   [`effective_tier`] and is the only place trial lapses are interpreted.
//! - **Biorhythms**: the pure [`biorhythm`] engine.
//!
//! Invoices mirrored from the payment processor are defined in [`invoice`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod biorhythm;
pub mod error;
pub mod ids;
pub mod invoice;
pub mod limits;
pub mod tier;
pub mod usage;
pub mod user;

pub use biorhythm::{
    calculate_biorhythm, calculate_biorhythm_range, cycle_value, days_between, find_critical_days,
    phase_of, Biorhythm, CriticalDay, Cycle, CycleReading, DailyBiorhythm, Phase,
};
pub use error::{DomainError, Result};
pub use ids::{IdError, InvoiceId, UsageLogId, UserId};
pub use invoice::{invoice_number, split_tva, Invoice, InvoiceDraft, TVA_RATE_PERCENT};
pub use limits::{ActionLimit, TierLimits};
pub use tier::{SubscriptionStatus, Tier};
pub use usage::{month_start, period_start, LimitCheck, MeteredAction, UsageLog};
pub use user::{effective_tier, TrialState, User, DEFAULT_TRIAL_DAYS};
