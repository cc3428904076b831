//! Invoices mirrored from payment-processor events.
//!
//! Amounts are tax-inclusive (TTC) minor units as charged by the processor. The
//! tax-exclusive amount (HT) and the VAT are derived at the French standard rate.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{InvoiceId, UserId};

/// VAT rate applied to every invoice, in percent.
pub const TVA_RATE_PERCENT: f64 = 20.0;

/// Prefix of every invoice number.
pub const INVOICE_PREFIX: &str = "DO";

/// A paid invoice as mirrored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Local ID.
    pub id: InvoiceId,
    /// Sequential, year-scoped number: `DO-<year>-<NNNN>`.
    pub invoice_number: String,
    /// The billed user.
    pub user_id: UserId,
    /// Upstream invoice ID; the deduplication key.
    pub stripe_invoice_id: String,
    /// Amount charged, tax included, in minor units.
    pub amount: i64,
    /// Amount before tax, in minor units.
    pub amount_ht: i64,
    /// Tax amount, in minor units.
    pub tva: i64,
    /// Tax rate in percent.
    pub tva_rate: f64,
    /// Currency code as reported upstream.
    pub currency: String,
    /// Invoice status (`paid`).
    pub status: String,
    /// When the payment succeeded.
    pub paid_at: DateTime<Utc>,
    /// When the local record was created.
    pub created_at: DateTime<Utc>,
}

/// The fields of an invoice known before a number is allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    /// The billed user.
    pub user_id: UserId,
    /// Upstream invoice ID.
    pub stripe_invoice_id: String,
    /// Amount paid, tax included, in minor units.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// When the payment succeeded.
    pub paid_at: DateTime<Utc>,
}

impl InvoiceDraft {
    /// The year whose sequence numbers this invoice.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.paid_at.year()
    }

    /// Allocate the final invoice with the given sequence number.
    #[must_use]
    pub fn into_invoice(self, sequence: u32, created_at: DateTime<Utc>) -> Invoice {
        let (amount_ht, tva) = split_tva(self.amount);
        Invoice {
            id: InvoiceId::generate(),
            invoice_number: invoice_number(self.year(), sequence),
            user_id: self.user_id,
            stripe_invoice_id: self.stripe_invoice_id,
            amount: self.amount,
            amount_ht,
            tva,
            tva_rate: TVA_RATE_PERCENT,
            currency: self.currency,
            status: "paid".to_string(),
            paid_at: self.paid_at,
            created_at,
        }
    }
}

/// Format an invoice number, e.g. `DO-2024-0042`.
#[must_use]
pub fn invoice_number(year: i32, sequence: u32) -> String {
    format!("{INVOICE_PREFIX}-{year}-{sequence:04}")
}

/// Split a tax-inclusive amount into `(amount_ht, tva)`.
///
/// The HT amount is rounded to the nearest minor unit; the VAT takes the
/// remainder so that `amount_ht + tva == amount_ttc` always holds.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn split_tva(amount_ttc: i64) -> (i64, i64) {
    let divisor = 1.0 + TVA_RATE_PERCENT / 100.0;
    let amount_ht = (amount_ttc as f64 / divisor).round() as i64;
    (amount_ht, amount_ttc - amount_ht)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn invoice_number_is_zero_padded() {
        assert_eq!(invoice_number(2024, 1), "DO-2024-0001");
        assert_eq!(invoice_number(2025, 1234), "DO-2025-1234");
        assert_eq!(invoice_number(2025, 12345), "DO-2025-12345");
    }

    #[test]
    fn tva_split_sums_to_total() {
        assert_eq!(split_tva(1199), (999, 200));
        assert_eq!(split_tva(1200), (1000, 200));
        assert_eq!(split_tva(0), (0, 0));

        for amount in [1, 99, 499, 999, 4788] {
            let (ht, tva) = split_tva(amount);
            assert_eq!(ht + tva, amount);
        }
    }

    #[test]
    fn draft_uses_payment_year() {
        let draft = InvoiceDraft {
            user_id: UserId::generate(),
            stripe_invoice_id: "in_1".into(),
            amount: 999,
            currency: "eur".into(),
            paid_at: Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap(),
        };

        let invoice = draft.into_invoice(7, Utc::now());
        assert_eq!(invoice.invoice_number, "DO-2023-0007");
        assert_eq!(invoice.amount_ht + invoice.tva, 999);
        assert_eq!(invoice.status, "paid");
    }
}
