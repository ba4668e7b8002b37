//! Construction of consent records from field values.

use super::layout;
use super::range::{InvalidRangeEntry, RangeEntry, VendorSection};
use super::VendorConsent;
use crate::core::base64::{self, Base64Padding};
use crate::core::{BitBuffer, BitBufferError};
use std::sync::OnceLock;
use thiserror::Error;

/// The error type for consent record construction.
///
/// Every variant is raised during validation or sizing, before any byte of
/// the record is written; a failed build leaves nothing observable.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConsentBuildError {
    /// A field value does not fit its wire width.
    #[error("{field} value {value} exceeds the field maximum {max}")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },
    /// A timestamp predates the epoch.
    #[error("{field} timestamp {millis} is negative")]
    NegativeTimestamp { field: &'static str, millis: i64 },
    /// The consent language is not exactly two letters A-Z.
    #[error("consent language {0:?} is not two letters A-Z")]
    InvalidLanguage(String),
    /// An allowed purpose ID lies outside 1..=24.
    #[error("purpose id {0} outside 1..=24")]
    InvalidPurposeId(u8),
    /// A bitmap vendor ID lies outside 1..=max vendor ID.
    #[error("vendor id {vendor_id} outside 1..={max_vendor_id}")]
    VendorIdOutOfRange {
        vendor_id: u16,
        max_vendor_id: u16,
    },
    /// More range entries than the 12-bit entry count can hold.
    #[error("{count} range entries exceed the 12 bit entry count field")]
    TooManyRangeEntries { count: usize },
    /// Neither a bitmap nor a range section was provided.
    #[error("no vendor section was provided")]
    MissingVendorSection,
    /// A range entry declares a minimum vendor ID above its maximum.
    #[error(transparent)]
    InvalidRangeEntry(#[from] InvalidRangeEntry),
    /// A field write failed; validation should make this unreachable.
    #[error("unable to write {field}: {source}")]
    Write {
        field: &'static str,
        source: BitBufferError,
    },
}

fn written(
    r: Result<(), BitBufferError>,
    field: &'static str,
) -> Result<(), ConsentBuildError> {
    r.map_err(|source| ConsentBuildError::Write { field, source })
}

fn check_width(field: &'static str, value: u64, width: usize) -> Result<(), ConsentBuildError> {
    let max = (1u64 << width) - 1;
    if value > max {
        return Err(ConsentBuildError::FieldOverflow { field, value, max });
    }
    Ok(())
}

fn check_timestamp(field: &'static str, millis: i64) -> Result<(), ConsentBuildError> {
    if millis < 0 {
        return Err(ConsentBuildError::NegativeTimestamp { field, millis });
    }
    check_width(field, millis as u64 / 100, layout::CREATED_SIZE)
}

enum Tail {
    Bitmap(Vec<u16>),
    Range {
        default_consent: bool,
        entries: Vec<RangeEntry>,
    },
}

/// Builder for [`VendorConsent`] records.
///
/// Fields are assigned stepwise and validated in one pass by
/// [`build`](Self::build), which also serializes the record. The consent
/// language and one vendor section are mandatory; everything else defaults
/// to zero.
///
/// ```
/// use iab_tcf::{RangeEntry, VendorConsentBuilder};
///
/// # fn main() -> Result<(), iab_tcf::ConsentBuildError> {
/// let consent = VendorConsentBuilder::new()
///     .with_version(1)
///     .with_created(1_510_082_155_400)
///     .with_last_updated(1_510_082_155_400)
///     .with_cmp_id(7)
///     .with_consent_language("EN")
///     .with_vendor_list_version(8)
///     .with_allowed_purposes([1, 2, 3])
///     .with_max_vendor_id(2011)
///     .with_range_vendors(true, vec![RangeEntry::single(9)])
///     .build()?;
///
/// assert!(consent.is_vendor_allowed(10));
/// assert!(!consent.is_vendor_allowed(9));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct VendorConsentBuilder {
    version: u8,
    created: i64,
    last_updated: i64,
    cmp_id: u16,
    cmp_version: u16,
    consent_screen: u8,
    consent_language: String,
    vendor_list_version: u16,
    max_vendor_id: u16,
    purpose_ids: Vec<u8>,
    tail: Option<Tail>,
    padding: Base64Padding,
}

impl VendorConsentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Creation instant in epoch milliseconds; floored to deciseconds on the
    /// wire.
    pub fn with_created(mut self, millis: i64) -> Self {
        self.created = millis;
        self
    }

    /// Last update instant in epoch milliseconds; floored to deciseconds on
    /// the wire.
    pub fn with_last_updated(mut self, millis: i64) -> Self {
        self.last_updated = millis;
        self
    }

    pub fn with_cmp_id(mut self, cmp_id: u16) -> Self {
        self.cmp_id = cmp_id;
        self
    }

    pub fn with_cmp_version(mut self, cmp_version: u16) -> Self {
        self.cmp_version = cmp_version;
        self
    }

    pub fn with_consent_screen(mut self, screen_id: u8) -> Self {
        self.consent_screen = screen_id;
        self
    }

    /// Two-letter ISO 639-1 language code, uppercase.
    pub fn with_consent_language(mut self, language: impl Into<String>) -> Self {
        self.consent_language = language.into();
        self
    }

    pub fn with_vendor_list_version(mut self, version: u16) -> Self {
        self.vendor_list_version = version;
        self
    }

    pub fn with_max_vendor_id(mut self, max_vendor_id: u16) -> Self {
        self.max_vendor_id = max_vendor_id;
        self
    }

    /// The 1-based purpose IDs the user consented to.
    pub fn with_allowed_purposes(mut self, purpose_ids: impl IntoIterator<Item = u8>) -> Self {
        self.purpose_ids = purpose_ids.into_iter().collect();
        self
    }

    /// Uses the bitmap tail encoding, consenting exactly the given vendor
    /// IDs. Replaces any previously chosen vendor section.
    pub fn with_bitmap_vendors(mut self, vendor_ids: impl IntoIterator<Item = u16>) -> Self {
        self.tail = Some(Tail::Bitmap(vendor_ids.into_iter().collect()));
        self
    }

    /// Uses the range tail encoding: `default_consent` applies to every
    /// vendor not covered by an entry, listed vendors get the opposite.
    /// Replaces any previously chosen vendor section.
    pub fn with_range_vendors(
        mut self,
        default_consent: bool,
        entries: Vec<RangeEntry>,
    ) -> Self {
        self.tail = Some(Tail::Range {
            default_consent,
            entries,
        });
        self
    }

    /// Padding mode of the serialized base64 form; unpadded by default, per
    /// the framework guidelines.
    pub fn with_base64_padding(mut self, padding: Base64Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Validates all fields, serializes, and returns the immutable record.
    pub fn build(self) -> Result<VendorConsent, ConsentBuildError> {
        use layout::*;

        check_width("version", self.version as u64, VERSION_SIZE)?;
        check_timestamp("created", self.created)?;
        check_timestamp("last updated", self.last_updated)?;
        check_width("cmp id", self.cmp_id as u64, CMP_ID_SIZE)?;
        check_width("cmp version", self.cmp_version as u64, CMP_VERSION_SIZE)?;
        check_width(
            "consent screen",
            self.consent_screen as u64,
            CONSENT_SCREEN_SIZE,
        )?;
        check_width(
            "vendor list version",
            self.vendor_list_version as u64,
            VENDOR_LIST_VERSION_SIZE,
        )?;

        let language_ok = self.consent_language.len() == 2
            && self
                .consent_language
                .chars()
                .all(|c| c.is_ascii_uppercase());
        if !language_ok {
            return Err(ConsentBuildError::InvalidLanguage(self.consent_language));
        }

        let mut allowed_purposes = [false; PURPOSES_SIZE];
        for &id in &self.purpose_ids {
            match id {
                1..=24 => allowed_purposes[id as usize - 1] = true,
                _ => return Err(ConsentBuildError::InvalidPurposeId(id)),
            }
        }

        let vendors = match self.tail.ok_or(ConsentBuildError::MissingVendorSection)? {
            Tail::Bitmap(vendor_ids) => {
                let mut bitmap = vec![false; self.max_vendor_id as usize];
                for vendor_id in vendor_ids {
                    if vendor_id < 1 || vendor_id > self.max_vendor_id {
                        return Err(ConsentBuildError::VendorIdOutOfRange {
                            vendor_id,
                            max_vendor_id: self.max_vendor_id,
                        });
                    }
                    bitmap[vendor_id as usize - 1] = true;
                }
                VendorSection::Bitmap(bitmap)
            }
            Tail::Range {
                default_consent,
                entries,
            } => {
                if entries.len() >= 1 << NUM_ENTRIES_SIZE {
                    return Err(ConsentBuildError::TooManyRangeEntries {
                        count: entries.len(),
                    });
                }
                VendorSection::Range {
                    default_consent,
                    entries,
                }
            }
        };

        // Exact size: the range tail counts the per-entry type flag bit, the
        // bitmap tail one bit per addressable vendor.
        let bit_size = match &vendors {
            VendorSection::Bitmap(_) => VENDOR_BITFIELD_OFFSET + self.max_vendor_id as usize,
            VendorSection::Range { entries, .. } => {
                RANGE_ENTRY_OFFSET + entries.iter().map(|e| e.bit_width()).sum::<usize>()
            }
        };
        let mut bits = BitBuffer::new(bit_size.div_ceil(8));

        written(
            bits.set_integer(VERSION_OFFSET, VERSION_SIZE, self.version),
            "version",
        )?;
        written(
            bits.set_epoch_millis(CREATED_OFFSET, CREATED_SIZE, self.created),
            "created",
        )?;
        written(
            bits.set_epoch_millis(UPDATED_OFFSET, UPDATED_SIZE, self.last_updated),
            "last updated",
        )?;
        written(
            bits.set_integer(CMP_ID_OFFSET, CMP_ID_SIZE, self.cmp_id),
            "cmp id",
        )?;
        written(
            bits.set_integer(CMP_VERSION_OFFSET, CMP_VERSION_SIZE, self.cmp_version),
            "cmp version",
        )?;
        written(
            bits.set_integer(CONSENT_SCREEN_OFFSET, CONSENT_SCREEN_SIZE, self.consent_screen),
            "consent screen",
        )?;
        written(
            bits.set_letters(
                CONSENT_LANGUAGE_OFFSET,
                CONSENT_LANGUAGE_SIZE,
                &self.consent_language,
            ),
            "consent language",
        )?;
        written(
            bits.set_integer(
                VENDOR_LIST_VERSION_OFFSET,
                VENDOR_LIST_VERSION_SIZE,
                self.vendor_list_version,
            ),
            "vendor list version",
        )?;
        for (i, &allowed) in allowed_purposes.iter().enumerate() {
            if allowed {
                written(bits.set_bit(PURPOSES_OFFSET + i), "allowed purposes")?;
            }
        }
        written(
            bits.set_integer(MAX_VENDOR_ID_OFFSET, MAX_VENDOR_ID_SIZE, self.max_vendor_id),
            "max vendor id",
        )?;

        match &vendors {
            VendorSection::Bitmap(bitmap) => {
                written(bits.clear_bit(ENCODING_TYPE_OFFSET), "encoding type")?;
                for (i, &bit) in bitmap.iter().enumerate() {
                    if bit {
                        written(bits.set_bit(VENDOR_BITFIELD_OFFSET + i), "vendor bitmap")?;
                    }
                }
            }
            VendorSection::Range {
                default_consent,
                entries,
            } => {
                written(bits.set_bit(ENCODING_TYPE_OFFSET), "encoding type")?;
                if *default_consent {
                    written(bits.set_bit(DEFAULT_CONSENT_OFFSET), "default consent")?;
                }
                written(
                    bits.set_integer(NUM_ENTRIES_OFFSET, NUM_ENTRIES_SIZE, entries.len() as u16),
                    "number of entries",
                )?;

                let mut offset = RANGE_ENTRY_OFFSET;
                for entry in entries {
                    if entry.is_single() {
                        written(bits.clear_bit(offset), "range entries")?;
                        offset += 1;
                        written(
                            bits.set_integer(offset, VENDOR_ID_SIZE, entry.min()),
                            "range entries",
                        )?;
                        offset += VENDOR_ID_SIZE;
                    } else {
                        written(bits.set_bit(offset), "range entries")?;
                        offset += 1;
                        written(
                            bits.set_integer(offset, VENDOR_ID_SIZE, entry.min()),
                            "range entries",
                        )?;
                        offset += VENDOR_ID_SIZE;
                        written(
                            bits.set_integer(offset, VENDOR_ID_SIZE, entry.max()),
                            "range entries",
                        )?;
                        offset += VENDOR_ID_SIZE;
                    }
                }
            }
        }

        let bytes = bits.into_bytes();
        let consent_string = base64::encode(&bytes, self.padding);

        Ok(VendorConsent {
            version: self.version,
            created: self.created / 100 * 100,
            last_updated: self.last_updated / 100 * 100,
            cmp_id: self.cmp_id,
            cmp_version: self.cmp_version,
            consent_screen: self.consent_screen,
            consent_language: self.consent_language,
            vendor_list_version: self.vendor_list_version,
            max_vendor_id: self.max_vendor_id,
            allowed_purposes,
            vendors,
            bytes,
            consent_string,
            purpose_ids: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn base() -> VendorConsentBuilder {
        VendorConsentBuilder::new()
            .with_version(1)
            .with_created(1_510_082_155_400)
            .with_last_updated(1_510_082_155_400)
            .with_cmp_id(7)
            .with_cmp_version(1)
            .with_consent_screen(3)
            .with_consent_language("EN")
            .with_vendor_list_version(8)
            .with_allowed_purposes([1, 2, 3])
    }

    #[test]
    fn build_matches_known_range_record() {
        let consent = base()
            .with_max_vendor_id(2011)
            .with_range_vendors(true, vec![RangeEntry::single(9)])
            .build()
            .unwrap();

        assert_eq!(consent.to_base64_str(), "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA");
    }

    #[test]
    fn build_matches_known_bitmap_record() {
        let consent = base()
            .with_max_vendor_id(32)
            .with_bitmap_vendors([1, 5, 32])
            .build()
            .unwrap();

        assert_eq!(consent.to_base64_str(), "BOEFEAyOEFEAyAHABDENAI4AAAACBEAAAAg");
    }

    #[test]
    fn padded_output_mode() {
        let consent = base()
            .with_max_vendor_id(2011)
            .with_range_vendors(true, vec![RangeEntry::single(9)])
            .with_base64_padding(Base64Padding::Padded)
            .build()
            .unwrap();

        assert_eq!(
            consent.to_base64_str(),
            "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA="
        );
    }

    #[test]
    fn created_is_floored_to_deciseconds() {
        let consent = base()
            .with_created(1_510_082_155_499)
            .with_max_vendor_id(10)
            .with_bitmap_vendors([1])
            .build()
            .unwrap();

        assert_eq!(consent.created(), 1_510_082_155_400);
    }

    #[test]
    fn version_overflow() {
        let err = base()
            .with_version(64)
            .with_max_vendor_id(10)
            .with_bitmap_vendors([1])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConsentBuildError::FieldOverflow {
                field: "version",
                value: 64,
                max: 63,
            }
        ));
    }

    #[test]
    fn cmp_id_overflow() {
        let err = base()
            .with_cmp_id(4096)
            .with_max_vendor_id(10)
            .with_bitmap_vendors([1])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConsentBuildError::FieldOverflow { field: "cmp id", .. }
        ));
    }

    #[test]
    fn negative_timestamp() {
        let err = base()
            .with_created(-1)
            .with_max_vendor_id(10)
            .with_bitmap_vendors([1])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConsentBuildError::NegativeTimestamp {
                field: "created",
                millis: -1,
            }
        ));
    }

    #[test_case("en")]
    #[test_case("E")]
    #[test_case("ENG")]
    #[test_case("E1")]
    #[test_case("")]
    fn invalid_language(lang: &str) {
        let err = base()
            .with_consent_language(lang)
            .with_max_vendor_id(10)
            .with_bitmap_vendors([1])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConsentBuildError::InvalidLanguage(_)));
    }

    #[test_case(0)]
    #[test_case(25)]
    fn invalid_purpose_id(id: u8) {
        let err = base()
            .with_allowed_purposes([id])
            .with_max_vendor_id(10)
            .with_bitmap_vendors([1])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConsentBuildError::InvalidPurposeId(_)));
    }

    #[test]
    fn bitmap_vendor_out_of_range() {
        let err = base()
            .with_max_vendor_id(10)
            .with_bitmap_vendors([11])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConsentBuildError::VendorIdOutOfRange {
                vendor_id: 11,
                max_vendor_id: 10,
            }
        ));
    }

    #[test]
    fn missing_vendor_section() {
        let err = base().with_max_vendor_id(10).build().unwrap_err();
        assert!(matches!(err, ConsentBuildError::MissingVendorSection));
    }

    #[test]
    fn too_many_range_entries() {
        let entries = (0..4096).map(|_| RangeEntry::single(1)).collect();
        let err = base()
            .with_max_vendor_id(10)
            .with_range_vendors(false, entries)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConsentBuildError::TooManyRangeEntries { count: 4096 }
        ));
    }
}
