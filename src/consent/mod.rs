//! The TCF v1 consent record.
//!
//! A record is parsed once from its base64 transport form (or built once via
//! [`VendorConsentBuilder`](builder::VendorConsentBuilder)) and is immutable
//! afterwards. "Updating" consent means building a new record.
//!
//! ```
//! use iab_tcf::VendorConsent;
//!
//! # fn main() -> Result<(), iab_tcf::ConsentParseError> {
//! let consent =
//!     VendorConsent::from_base64_str("BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA")?;
//!
//! assert_eq!(consent.cmp_id(), 7);
//! assert_eq!(consent.consent_language(), "EN");
//! assert!(consent.is_purpose_allowed(1));
//! assert!(consent.is_vendor_allowed(2011));
//! assert!(!consent.is_vendor_allowed(9));
//! # Ok(())
//! # }
//! ```

use crate::core::base64::{self, Base64Padding};
use crate::core::{BitBuffer, BitBufferError};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

pub mod builder;
pub mod range;

pub use range::{InvalidRangeEntry, RangeEntry, VendorSection};

/// Bit offsets and widths of the consent record wire format.
///
/// The tail starting at bit 173 depends on the encoding type flag: a range
/// section reuses bit 173 as the default consent flag, a bitmap section
/// starts its packed vendor bits there.
pub(crate) mod layout {
    pub const VERSION_OFFSET: usize = 0;
    pub const VERSION_SIZE: usize = 6;
    pub const CREATED_OFFSET: usize = 6;
    pub const CREATED_SIZE: usize = 36;
    pub const UPDATED_OFFSET: usize = 42;
    pub const UPDATED_SIZE: usize = 36;
    pub const CMP_ID_OFFSET: usize = 78;
    pub const CMP_ID_SIZE: usize = 12;
    pub const CMP_VERSION_OFFSET: usize = 90;
    pub const CMP_VERSION_SIZE: usize = 12;
    pub const CONSENT_SCREEN_OFFSET: usize = 102;
    pub const CONSENT_SCREEN_SIZE: usize = 6;
    pub const CONSENT_LANGUAGE_OFFSET: usize = 108;
    pub const CONSENT_LANGUAGE_SIZE: usize = 12;
    pub const VENDOR_LIST_VERSION_OFFSET: usize = 120;
    pub const VENDOR_LIST_VERSION_SIZE: usize = 12;
    pub const PURPOSES_OFFSET: usize = 132;
    pub const PURPOSES_SIZE: usize = 24;
    pub const MAX_VENDOR_ID_OFFSET: usize = 156;
    pub const MAX_VENDOR_ID_SIZE: usize = 16;
    pub const ENCODING_TYPE_OFFSET: usize = 172;
    pub const VENDOR_BITFIELD_OFFSET: usize = 173;
    pub const DEFAULT_CONSENT_OFFSET: usize = 173;
    pub const NUM_ENTRIES_OFFSET: usize = 174;
    pub const NUM_ENTRIES_SIZE: usize = 12;
    pub const RANGE_ENTRY_OFFSET: usize = 186;
    pub const VENDOR_ID_SIZE: usize = 16;
}

/// The error type for consent string parsing.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConsentParseError {
    /// The consent string is empty.
    #[error("consent string is empty")]
    Empty,
    /// The consent string is not valid URL-safe base64.
    #[error("unable to decode consent string: {0}")]
    Base64(#[from] base64::DecodeError),
    /// A field could not be read at its expected offset, usually because the
    /// buffer is truncated.
    #[error("unable to read {field}: {source}")]
    Field {
        field: &'static str,
        source: BitBufferError,
    },
    /// The buffer is shorter than the declared max vendor ID implies.
    #[error("buffer too short for vendor bitmap (need {needed} bits, have {available})")]
    BufferTooShort { needed: usize, available: usize },
    /// A range entry declares a minimum vendor ID above its maximum.
    #[error(transparent)]
    InvalidRangeEntry(#[from] InvalidRangeEntry),
}

fn field<T>(
    r: Result<T, BitBufferError>,
    field: &'static str,
) -> Result<T, ConsentParseError> {
    r.map_err(|source| ConsentParseError::Field { field, source })
}

/// An immutable, parsed or built consent record.
///
/// Field accessors mirror the wire format; [`is_purpose_allowed`] and
/// [`is_vendor_allowed`] answer the two questions consumers actually ask.
///
/// The record is fully immutable and safe to share across threads; the only
/// derived value, the allowed purpose ID list, is memoized behind a
/// [`OnceLock`].
///
/// [`is_purpose_allowed`]: VendorConsent::is_purpose_allowed
/// [`is_vendor_allowed`]: VendorConsent::is_vendor_allowed
#[derive(Debug)]
pub struct VendorConsent {
    pub(crate) version: u8,
    pub(crate) created: i64,
    pub(crate) last_updated: i64,
    pub(crate) cmp_id: u16,
    pub(crate) cmp_version: u16,
    pub(crate) consent_screen: u8,
    pub(crate) consent_language: String,
    pub(crate) vendor_list_version: u16,
    pub(crate) max_vendor_id: u16,
    pub(crate) allowed_purposes: [bool; layout::PURPOSES_SIZE],
    pub(crate) vendors: VendorSection,
    pub(crate) bytes: Vec<u8>,
    pub(crate) consent_string: String,
    pub(crate) purpose_ids: OnceLock<Vec<u8>>,
}

impl VendorConsent {
    /// Parses a URL-safe base64 consent string, padded or unpadded.
    pub fn from_base64_str(s: &str) -> Result<Self, ConsentParseError> {
        if s.is_empty() {
            return Err(ConsentParseError::Empty);
        }
        Self::from_bytes(base64::decode(s)?)
    }

    /// Parses raw, already base64-decoded record bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ConsentParseError> {
        use layout::*;

        let bits = BitBuffer::from_bytes(bytes);

        let version = field(bits.get_integer(VERSION_OFFSET, VERSION_SIZE), "version")?;
        let created = field(bits.get_epoch_millis(CREATED_OFFSET, CREATED_SIZE), "created")?;
        let last_updated = field(
            bits.get_epoch_millis(UPDATED_OFFSET, UPDATED_SIZE),
            "last updated",
        )?;
        let cmp_id = field(bits.get_integer(CMP_ID_OFFSET, CMP_ID_SIZE), "cmp id")?;
        let cmp_version = field(
            bits.get_integer(CMP_VERSION_OFFSET, CMP_VERSION_SIZE),
            "cmp version",
        )?;
        let consent_screen = field(
            bits.get_integer(CONSENT_SCREEN_OFFSET, CONSENT_SCREEN_SIZE),
            "consent screen",
        )?;
        let consent_language = field(
            bits.get_letters(CONSENT_LANGUAGE_OFFSET, CONSENT_LANGUAGE_SIZE),
            "consent language",
        )?;
        let vendor_list_version = field(
            bits.get_integer(VENDOR_LIST_VERSION_OFFSET, VENDOR_LIST_VERSION_SIZE),
            "vendor list version",
        )?;

        let mut allowed_purposes = [false; PURPOSES_SIZE];
        for (i, purpose) in allowed_purposes.iter_mut().enumerate() {
            *purpose = field(bits.get_bit(PURPOSES_OFFSET + i), "allowed purposes")?;
        }

        let max_vendor_id: u16 = field(
            bits.get_integer(MAX_VENDOR_ID_OFFSET, MAX_VENDOR_ID_SIZE),
            "max vendor id",
        )?;
        let is_range = field(bits.get_bit(ENCODING_TYPE_OFFSET), "encoding type")?;

        let vendors = if is_range {
            Self::parse_range_section(&bits)?
        } else {
            Self::parse_bitmap_section(&bits, max_vendor_id)?
        };

        let bytes = bits.into_bytes();
        let consent_string = base64::encode(&bytes, Base64Padding::Unpadded);

        Ok(Self {
            version,
            created,
            last_updated,
            cmp_id,
            cmp_version,
            consent_screen,
            consent_language,
            vendor_list_version,
            max_vendor_id,
            allowed_purposes,
            vendors,
            bytes,
            consent_string,
            purpose_ids: OnceLock::new(),
        })
    }

    fn parse_range_section(bits: &BitBuffer) -> Result<VendorSection, ConsentParseError> {
        use layout::*;

        let default_consent = field(bits.get_bit(DEFAULT_CONSENT_OFFSET), "default consent")?;
        let num_entries: u16 = field(
            bits.get_integer(NUM_ENTRIES_OFFSET, NUM_ENTRIES_SIZE),
            "number of entries",
        )?;

        let mut entries = Vec::with_capacity(num_entries as usize);
        let mut offset = RANGE_ENTRY_OFFSET;
        for _ in 0..num_entries {
            let is_range = field(bits.get_bit(offset), "range entries")?;
            offset += 1;
            let entry = if is_range {
                let min = field(bits.get_integer(offset, VENDOR_ID_SIZE), "range entries")?;
                offset += VENDOR_ID_SIZE;
                let max = field(bits.get_integer(offset, VENDOR_ID_SIZE), "range entries")?;
                offset += VENDOR_ID_SIZE;
                RangeEntry::range(min, max)?
            } else {
                let id = field(bits.get_integer(offset, VENDOR_ID_SIZE), "range entries")?;
                offset += VENDOR_ID_SIZE;
                RangeEntry::single(id)
            };
            entries.push(entry);
        }

        Ok(VendorSection::Range {
            default_consent,
            entries,
        })
    }

    fn parse_bitmap_section(
        bits: &BitBuffer,
        max_vendor_id: u16,
    ) -> Result<VendorSection, ConsentParseError> {
        use layout::*;

        // A declared max vendor id beyond the buffer would otherwise only
        // surface on first query; reject the record up front instead.
        let needed = VENDOR_BITFIELD_OFFSET + max_vendor_id as usize;
        if bits.bit_len() < needed {
            return Err(ConsentParseError::BufferTooShort {
                needed,
                available: bits.bit_len(),
            });
        }

        let mut bitmap = Vec::with_capacity(max_vendor_id as usize);
        for i in 0..max_vendor_id as usize {
            bitmap.push(field(
                bits.get_bit(VENDOR_BITFIELD_OFFSET + i),
                "vendor bitmap",
            )?);
        }
        Ok(VendorSection::Bitmap(bitmap))
    }

    /// Format revision of the record.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Creation instant, in epoch milliseconds (decisecond resolution).
    pub fn created(&self) -> i64 {
        self.created
    }

    /// Last update instant, in epoch milliseconds (decisecond resolution).
    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    /// ID of the consent management platform that collected the consent.
    pub fn cmp_id(&self) -> u16 {
        self.cmp_id
    }

    pub fn cmp_version(&self) -> u16 {
        self.cmp_version
    }

    /// ID of the CMP UI screen on which consent was given.
    pub fn consent_screen(&self) -> u8 {
        self.consent_screen
    }

    /// Two-letter ISO 639-1 language code of the consent UI.
    pub fn consent_language(&self) -> &str {
        &self.consent_language
    }

    /// Version of the vendor catalog in effect when consent was recorded.
    pub fn vendor_list_version(&self) -> u16 {
        self.vendor_list_version
    }

    /// Highest vendor ID the vendor section can address.
    pub fn max_vendor_id(&self) -> u16 {
        self.max_vendor_id
    }

    /// The vendor tail, either a bitmap or a default plus range entries.
    pub fn vendor_section(&self) -> &VendorSection {
        &self.vendors
    }

    /// The serialized record bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The canonical base64 form of this record.
    pub fn to_base64_str(&self) -> &str {
        &self.consent_string
    }

    /// Whether the given 1-based purpose ID is permitted.
    ///
    /// IDs outside 1..=24 return `false` rather than an error.
    pub fn is_purpose_allowed(&self, purpose_id: u8) -> bool {
        match purpose_id {
            1..=24 => self.allowed_purposes[purpose_id as usize - 1],
            _ => false,
        }
    }

    /// Whether every listed purpose ID is permitted.
    ///
    /// Vacuously true for an empty list.
    pub fn are_purposes_allowed(&self, purpose_ids: &[u8]) -> bool {
        purpose_ids.iter().all(|&id| self.is_purpose_allowed(id))
    }

    /// The ascending list of permitted 1-based purpose IDs.
    ///
    /// Computed on first access and memoized.
    pub fn allowed_purposes(&self) -> &[u8] {
        self.purpose_ids.get_or_init(|| {
            self.allowed_purposes
                .iter()
                .enumerate()
                .filter_map(|(i, &allowed)| allowed.then_some(i as u8 + 1))
                .collect()
        })
    }

    /// Whether the given vendor ID is permitted.
    ///
    /// For a bitmap section, IDs outside 1..=max vendor ID return `false`.
    /// For a range section, listed vendors get the opposite of the default
    /// consent: the entries are exceptions, not an allow-list.
    pub fn is_vendor_allowed(&self, vendor_id: u16) -> bool {
        match &self.vendors {
            VendorSection::Bitmap(bitmap) => {
                vendor_id >= 1 && bitmap.get(vendor_id as usize - 1).copied().unwrap_or(false)
            }
            VendorSection::Range {
                default_consent,
                entries,
            } => {
                let present = entries.iter().any(|e| e.contains(vendor_id));
                present ^ default_consent
            }
        }
    }
}

impl FromStr for VendorConsent {
    type Err = ConsentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64_str(s)
    }
}

/// Records are equal iff their serialized bytes are equal; every field is a
/// pure function of those bytes.
impl PartialEq for VendorConsent {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for VendorConsent {}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // default consent true, vendor 9 excluded, purposes 1-3
    const RANGE_STR: &str = "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA";
    // max vendor id 32, vendors 1, 5 and 32 set
    const BITMAP_STR: &str = "BOEFEAyOEFEAyAHABDENAI4AAAACBEAAAAg";

    #[test]
    fn parse_range_record() {
        let c = VendorConsent::from_base64_str(RANGE_STR).unwrap();

        assert_eq!(c.version(), 1);
        assert_eq!(c.created(), 1_510_082_155_400);
        assert_eq!(c.last_updated(), 1_510_082_155_400);
        assert_eq!(c.cmp_id(), 7);
        assert_eq!(c.cmp_version(), 1);
        assert_eq!(c.consent_screen(), 3);
        assert_eq!(c.consent_language(), "EN");
        assert_eq!(c.vendor_list_version(), 8);
        assert_eq!(c.max_vendor_id(), 2011);
        assert_eq!(
            c.vendor_section(),
            &VendorSection::Range {
                default_consent: true,
                entries: vec![RangeEntry::single(9)],
            }
        );
    }

    #[test]
    fn parse_bitmap_record() {
        let c = VendorConsent::from_base64_str(BITMAP_STR).unwrap();

        assert_eq!(c.max_vendor_id(), 32);
        let expected: Vec<bool> = (1..=32).map(|id| [1, 5, 32].contains(&id)).collect();
        assert_eq!(c.vendor_section(), &VendorSection::Bitmap(expected));
        assert!(c.is_vendor_allowed(1));
        assert!(c.is_vendor_allowed(5));
        assert!(c.is_vendor_allowed(32));
        assert!(!c.is_vendor_allowed(2));
    }

    #[test]
    fn parse_known_vector() {
        let c = VendorConsent::from_base64_str(
            "BN5lERiOMYEdiAKAWXEND1HoSBE6CAFAApAMgBkIDIgM0AgOJxAnQA==",
        )
        .unwrap();

        assert!(c.is_vendor_allowed(225));
        assert!(!c.is_vendor_allowed(411));
    }

    #[test_case(0 => false)]
    #[test_case(1 => true)]
    #[test_case(3 => true)]
    #[test_case(4 => false)]
    #[test_case(24 => false)]
    #[test_case(25 => false)]
    fn purpose_bounds(id: u8) -> bool {
        VendorConsent::from_base64_str(RANGE_STR)
            .unwrap()
            .is_purpose_allowed(id)
    }

    #[test]
    fn purposes_combined_and_memoized() {
        let c = VendorConsent::from_base64_str(RANGE_STR).unwrap();
        assert_eq!(c.allowed_purposes(), &[1, 2, 3]);
        assert_eq!(c.allowed_purposes(), &[1, 2, 3]);
        assert!(c.are_purposes_allowed(&[1, 2, 3]));
        assert!(c.are_purposes_allowed(&[]));
        assert!(!c.are_purposes_allowed(&[1, 4]));
    }

    #[test]
    fn bitmap_bounds_return_false() {
        let c = VendorConsent::from_base64_str(BITMAP_STR).unwrap();
        assert!(!c.is_vendor_allowed(0));
        assert!(!c.is_vendor_allowed(33));
        assert!(!c.is_vendor_allowed(u16::MAX));
    }

    #[test]
    fn range_default_consent_xor() {
        // default true: the single entry 9 is the only denied vendor
        let c = VendorConsent::from_base64_str(RANGE_STR).unwrap();
        assert!(!c.is_vendor_allowed(9));
        assert!(c.is_vendor_allowed(8));
        assert!(c.is_vendor_allowed(2011));
    }

    #[test]
    fn empty_string_rejected() {
        assert!(matches!(
            VendorConsent::from_base64_str(""),
            Err(ConsentParseError::Empty)
        ));
    }

    #[test]
    fn malformed_base64_rejected() {
        assert!(matches!(
            VendorConsent::from_base64_str("not!base64!"),
            Err(ConsentParseError::Base64(_))
        ));
    }

    #[test]
    fn truncated_header_names_field() {
        // 4 bytes: enough for version, far too short for the timestamps
        let err = VendorConsent::from_bytes(vec![0x04, 0xE1, 0x05, 0x10]).unwrap_err();
        assert!(
            matches!(err, ConsentParseError::Field { field: "created", .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn bitmap_shorter_than_max_vendor_id_rejected() {
        // take the valid bitmap record and chop off its final byte
        let mut bytes = crate::core::base64::decode(BITMAP_STR).unwrap();
        bytes.pop();
        let err = VendorConsent::from_bytes(bytes).unwrap_err();
        assert!(
            matches!(
                err,
                ConsentParseError::BufferTooShort {
                    needed: 205,
                    available: 200,
                }
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn canonical_string_is_unpadded() {
        let padded = "BN5lERiOMYEdiAKAWXEND1HoSBE6CAFAApAMgBkIDIgM0AgOJxAnQA==";
        let c = VendorConsent::from_base64_str(padded).unwrap();
        assert_eq!(c.to_base64_str(), padded.trim_end_matches('='));
    }

    #[test]
    fn send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VendorConsent>();
    }
}
