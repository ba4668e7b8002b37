//! This crate is an implementation of the IAB Transparency and Consent
//! Framework (TCF) v1
//! [consent string format](https://github.com/InteractiveAdvertisingBureau/GDPR-Transparency-and-Consent-Framework),
//! the bit-packed record which carries a user's GDPR privacy-consent
//! decisions between advertising systems.
//!
//! NOTE: This is not an official IAB library.
//!
//! # Parsing consent strings
//!
//! A consent string is a URL-safe base64 encoding of a fixed-layout binary
//! record. [`VendorConsent`] parses it (padded or unpadded) and answers the
//! two questions consumers ask: is a purpose permitted, and is a vendor
//! permitted.
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! use iab_tcf::VendorConsent;
//!
//! let s = "BN5lERiOMYEdiAKAWXEND1HoSBE6CAFAApAMgBkIDIgM0AgOJxAnQA==";
//! let consent = VendorConsent::from_base64_str(s)?;
//!
//! assert_eq!(consent.consent_language(), "EN");
//! assert!(consent.is_vendor_allowed(225));
//! assert!(!consent.is_vendor_allowed(411));
//! # Ok(())
//! # }
//! ```
//!
//! # Building consent strings
//!
//! [`VendorConsentBuilder`] assembles a record from field values, validates
//! them in one pass, and serializes at construction time. Records are
//! immutable; updating consent means building a new record.
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! use iab_tcf::{RangeEntry, VendorConsentBuilder};
//!
//! let consent = VendorConsentBuilder::new()
//!     .with_version(1)
//!     .with_created(1_510_082_155_400)
//!     .with_last_updated(1_510_082_155_400)
//!     .with_cmp_id(7)
//!     .with_cmp_version(1)
//!     .with_consent_screen(3)
//!     .with_consent_language("EN")
//!     .with_vendor_list_version(8)
//!     .with_allowed_purposes([1, 2, 3])
//!     .with_max_vendor_id(2011)
//!     .with_range_vendors(true, vec![RangeEntry::single(9)])
//!     .build()?;
//!
//! assert_eq!(
//!     consent.to_base64_str(),
//!     "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Error handling
//!
//! This crate is conservative with regard to how it handles failures. A
//! string that cannot be fully decoded is an error, never a partially filled
//! record, to avoid acting on erroneous consent information from corrupted
//! payloads. Likewise a build fails before any byte is written if a field
//! does not fit its wire width.
//!
pub mod consent;
pub mod core;
pub mod switch;
pub mod vendor_list;

pub use crate::consent::builder::{ConsentBuildError, VendorConsentBuilder};
pub use crate::consent::{
    ConsentParseError, InvalidRangeEntry, RangeEntry, VendorConsent, VendorSection,
};
pub use crate::core::base64::Base64Padding;
