//! The Well-Formed Name tuple

use crate::value::{validate, Value};
use crate::CpeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The eleven WFN attributes, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Part,
    Vendor,
    Product,
    Version,
    Update,
    Edition,
    Language,
    SwEdition,
    TargetSw,
    TargetHw,
    Other,
}

impl Attribute {
    pub const ALL: [Attribute; 11] = [
        Attribute::Part,
        Attribute::Vendor,
        Attribute::Product,
        Attribute::Version,
        Attribute::Update,
        Attribute::Edition,
        Attribute::Language,
        Attribute::SwEdition,
        Attribute::TargetSw,
        Attribute::TargetHw,
        Attribute::Other,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Part => "part",
            Attribute::Vendor => "vendor",
            Attribute::Product => "product",
            Attribute::Version => "version",
            Attribute::Update => "update",
            Attribute::Edition => "edition",
            Attribute::Language => "language",
            Attribute::SwEdition => "sw_edition",
            Attribute::TargetSw => "target_sw",
            Attribute::TargetHw => "target_hw",
            Attribute::Other => "other",
        }
    }
}

/// A Well-Formed Name: the fixed 11-tuple of attribute values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wfn {
    pub part: Value,
    pub vendor: Value,
    pub product: Value,
    pub version: Value,
    pub update: Value,
    pub edition: Value,
    pub language: Value,
    pub sw_edition: Value,
    pub target_sw: Value,
    pub target_hw: Value,
    pub other: Value,
}

impl Wfn {
    pub fn attr(&self, a: Attribute) -> &Value {
        match a {
            Attribute::Part => &self.part,
            Attribute::Vendor => &self.vendor,
            Attribute::Product => &self.product,
            Attribute::Version => &self.version,
            Attribute::Update => &self.update,
            Attribute::Edition => &self.edition,
            Attribute::Language => &self.language,
            Attribute::SwEdition => &self.sw_edition,
            Attribute::TargetSw => &self.target_sw,
            Attribute::TargetHw => &self.target_hw,
            Attribute::Other => &self.other,
        }
    }

    pub fn attr_mut(&mut self, a: Attribute) -> &mut Value {
        match a {
            Attribute::Part => &mut self.part,
            Attribute::Vendor => &mut self.vendor,
            Attribute::Product => &mut self.product,
            Attribute::Version => &mut self.version,
            Attribute::Update => &mut self.update,
            Attribute::Edition => &mut self.edition,
            Attribute::Language => &mut self.language,
            Attribute::SwEdition => &mut self.sw_edition,
            Attribute::TargetSw => &mut self.target_sw,
            Attribute::TargetHw => &mut self.target_hw,
            Attribute::Other => &mut self.other,
        }
    }

    /// Validate every attribute against the value grammar, and the part
    /// against its fixed vocabulary.
    pub fn validate(&self) -> Result<(), CpeError> {
        for a in Attribute::ALL {
            if let Value::Set(q) = self.attr(a) {
                validate(q).map_err(|source| CpeError::BadValue {
                    attribute: a.name(),
                    source,
                })?;
            }
        }
        if let Value::Set(p) = &self.part {
            if !matches!(p.as_str(), "a" | "o" | "h") {
                return Err(CpeError::BadPart(p.clone()));
            }
        }
        Ok(())
    }
}

// The formatted-string binding is the canonical serialized form.
impl Serialize for Wfn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_fstring())
    }
}

impl<'de> Deserialize<'de> for Wfn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        crate::parse(&s).map_err(serde::de::Error::custom)
    }
}
