//! Time gate for consent enforcement.
//!
//! Enforcement of the regulation starts at a fixed effective date; before
//! that instant every vendor is treated as allowed regardless of any consent
//! record, after it the record (if present) decides.

use crate::consent::VendorConsent;
use std::time::{SystemTime, UNIX_EPOCH};

/// 2018-05-25 00:00:00 CEST, the instant the regulation took effect,
/// as epoch milliseconds (2018-05-24T22:00:00Z).
pub const GDPR_EFFECTIVE_MILLIS: i64 = 1_527_199_200_000;

/// The enforcement gate.
///
/// Instance-based with an explicit clock so tests can pick both sides of the
/// effective date; [`GdprSwitch::default`] uses the real regulation date.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GdprSwitch {
    effective_millis: i64,
}

impl Default for GdprSwitch {
    fn default() -> Self {
        Self::new(GDPR_EFFECTIVE_MILLIS)
    }
}

impl GdprSwitch {
    pub fn new(effective_millis: i64) -> Self {
        Self { effective_millis }
    }

    /// Whether enforcement applies at the given instant (strictly after the
    /// effective date).
    pub fn is_on(&self, now_millis: i64) -> bool {
        now_millis > self.effective_millis
    }

    /// Whether the vendor may process data at the given instant.
    ///
    /// Before the effective date, always true. After it, the consent record
    /// decides; a missing record denies.
    pub fn vendor_allowed(
        &self,
        consent: Option<&VendorConsent>,
        vendor_id: u16,
        now_millis: i64,
    ) -> bool {
        !self.is_on(now_millis)
            || consent
                .map(|c| c.is_vendor_allowed(vendor_id))
                .unwrap_or(false)
    }
}

/// The current instant in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
