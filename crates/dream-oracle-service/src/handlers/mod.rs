//! HTTP request handlers.

pub mod accounts;
pub mod biorhythm;
pub mod health;
pub mod invoices;
pub mod jobs;
pub mod usage;
pub mod webhooks;
