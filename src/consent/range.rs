//! Vendor tail representations.

use thiserror::Error;

/// Returned when a range entry is constructed with `min > max`.
#[derive(Error, Debug, Eq, PartialEq)]
#[error("invalid range entry: min vendor id {min} greater than max {max}")]
pub struct InvalidRangeEntry {
    pub min: u16,
    pub max: u16,
}

/// A single vendor ID or an inclusive ID range in the compressed tail.
///
/// Entries may appear in any order and may overlap; membership is "any entry
/// contains the ID".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangeEntry {
    min: u16,
    max: u16,
}

impl RangeEntry {
    /// An entry covering exactly one vendor ID.
    pub fn single(vendor_id: u16) -> Self {
        Self {
            min: vendor_id,
            max: vendor_id,
        }
    }

    /// An entry covering the inclusive range `min..=max`.
    pub fn range(min: u16, max: u16) -> Result<Self, InvalidRangeEntry> {
        if min > max {
            return Err(InvalidRangeEntry { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn is_single(&self) -> bool {
        self.min == self.max
    }

    pub fn contains(&self, vendor_id: u16) -> bool {
        vendor_id >= self.min && vendor_id <= self.max
    }

    /// Serialized width: a type flag plus one or two 16-bit IDs.
    pub(crate) fn bit_width(&self) -> usize {
        if self.is_single() {
            1 + super::layout::VENDOR_ID_SIZE
        } else {
            1 + 2 * super::layout::VENDOR_ID_SIZE
        }
    }
}

/// One of the two mutually exclusive vendor tail encodings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VendorSection {
    /// One consent bit per vendor ID from 1 to the record's max vendor ID.
    Bitmap(Vec<bool>),
    /// An exception list against a default: a listed vendor gets the
    /// opposite of `default_consent`.
    Range {
        default_consent: bool,
        entries: Vec<RangeEntry>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(10, 20, 15 => true)]
    #[test_case(10, 20, 10 => true)]
    #[test_case(10, 20, 20 => true)]
    #[test_case(10, 20, 9 => false)]
    #[test_case(10, 20, 21 => false)]
    fn contains(min: u16, max: u16, id: u16) -> bool {
        RangeEntry::range(min, max).unwrap().contains(id)
    }

    #[test]
    fn single_is_degenerate_range() {
        let e = RangeEntry::single(9);
        assert!(e.is_single());
        assert!(e.contains(9));
        assert!(!e.contains(8));
        assert_eq!(e, RangeEntry::range(9, 9).unwrap());
    }

    #[test]
    fn inverted_range_rejected() {
        assert_eq!(
            RangeEntry::range(20, 10).unwrap_err(),
            InvalidRangeEntry { min: 20, max: 10 }
        );
    }
}
