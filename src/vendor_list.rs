//! Data model of the global vendor list, the published catalog of purposes,
//! features, and vendors.
//!
//! The catalog is used for display and name lookup only; decoding a consent
//! record never consults it, and no check is made that a consented vendor ID
//! exists in any catalog version. Fetching the JSON document is the caller's
//! concern; this module only maps its shape.

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// A standardized category of data use a user can consent to.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Purpose {
    pub id: u8,
    pub name: String,
    pub description: String,
}

/// A standardized data-processing feature vendors may declare.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Feature {
    pub id: u8,
    pub name: String,
    pub description: String,
}

/// A third party whose data processing is gated by consent.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Vendor {
    pub id: u16,
    pub name: String,
    pub policy_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_date: Option<String>,
    pub purpose_ids: Vec<u8>,
    pub leg_int_purpose_ids: Vec<u8>,
    pub feature_ids: Vec<u8>,
}

/// One published version of the vendor catalog.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorList {
    pub vendor_list_version: u16,
    pub last_updated: String,
    pub purposes: Vec<Purpose>,
    pub features: Vec<Feature>,
    pub vendors: Vec<Vendor>,
}

impl VendorList {
    pub fn purpose(&self, id: u8) -> Option<&Purpose> {
        self.purposes.iter().find(|p| p.id == id)
    }

    pub fn feature(&self, id: u8) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn vendor(&self, id: u16) -> Option<&Vendor> {
        self.vendors.iter().find(|v| v.id == id)
    }

    /// Builds an id-indexed view for repeated lookups.
    pub fn index(&self) -> VendorListIndex<'_> {
        VendorListIndex {
            purposes: self.purposes.iter().map(|p| (p.id, p)).collect(),
            features: self.features.iter().map(|f| (f.id, f)).collect(),
            vendors: self.vendors.iter().map(|v| (v.id, v)).collect(),
        }
    }
}

/// An id-indexed view over a [`VendorList`].
#[derive(Debug)]
pub struct VendorListIndex<'a> {
    purposes: FnvHashMap<u8, &'a Purpose>,
    features: FnvHashMap<u8, &'a Feature>,
    vendors: FnvHashMap<u16, &'a Vendor>,
}

impl<'a> VendorListIndex<'a> {
    pub fn purpose(&self, id: u8) -> Option<&'a Purpose> {
        self.purposes.get(&id).copied()
    }

    pub fn feature(&self, id: u8) -> Option<&'a Feature> {
        self.features.get(&id).copied()
    }

    pub fn vendor(&self, id: u16) -> Option<&'a Vendor> {
        self.vendors.get(&id).copied()
    }
}
