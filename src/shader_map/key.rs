//! Shader map keys: base content identity, static switches, platform and quality.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{Platform, Quality};

/// Stable, revision-independent identity of a material's content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u128);

impl MaterialId {
    /// Derive an identity from a name, for materials authored without an explicit id.
    pub fn from_name(name: &str) -> MaterialId {
        fn fnv1a64_with_seed(bytes: &[u8], seed: u64) -> u64 {
            let mut hash = 0xcbf2_9ce4_8422_2325_u64 ^ seed;
            for &b in bytes {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
            hash
        }

        let hi = fnv1a64_with_seed(name.as_bytes(), 0x0000_0000_0000_0000);
        let lo = fnv1a64_with_seed(name.as_bytes(), 0x9e37_79b9_7f4a_7c15);
        MaterialId(((hi as u128) << 64) | lo as u128)
    }

    pub fn parse(s: &str) -> Option<MaterialId> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 {
            return None;
        }
        u128::from_str_radix(&hex, 16).ok().map(MaterialId)
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for MaterialId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MaterialId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        MaterialId::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid material id '{s}'")))
    }
}

/// Compile-time override value. Booleans select code paths, masks select components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StaticSwitchValue {
    Bool(bool),
    Mask([bool; 4]),
}

/// Named static switch overrides, kept sorted so the set hashes and serializes deterministically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticSwitchSet(BTreeMap<String, StaticSwitchValue>);

impl StaticSwitchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bool(mut self, name: impl Into<String>, value: bool) -> Self {
        self.set(name, StaticSwitchValue::Bool(value));
        self
    }

    pub fn with_mask(mut self, name: impl Into<String>, mask: [bool; 4]) -> Self {
        self.set(name, StaticSwitchValue::Mask(mask));
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: StaticSwitchValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(StaticSwitchValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_mask(&self, name: &str) -> Option<[bool; 4]> {
        match self.0.get(name) {
            Some(StaticSwitchValue::Mask(m)) => Some(*m),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StaticSwitchValue)> {
        self.0.iter()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShaderMapKey {
    pub material_id: MaterialId,
    #[serde(default)]
    pub static_switches: StaticSwitchSet,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub quality: Quality,
}

impl ShaderMapKey {
    pub fn new(material_id: MaterialId) -> Self {
        Self {
            material_id,
            static_switches: StaticSwitchSet::new(),
            platform: Platform::default(),
            quality: Quality::default(),
        }
    }

    pub fn with_switches(mut self, static_switches: StaticSwitchSet) -> Self {
        self.static_switches = static_switches;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn summary(&self) -> String {
        let switches: Vec<String> = self
            .static_switches
            .iter()
            .map(|(name, value)| match value {
                StaticSwitchValue::Bool(b) => format!("{name}={b}"),
                StaticSwitchValue::Mask(m) => {
                    let lanes: String = ['r', 'g', 'b', 'a']
                        .iter()
                        .zip(m)
                        .map(|(c, on)| if *on { *c } else { '_' })
                        .collect();
                    format!("{name}={lanes}")
                }
            })
            .collect();
        format!(
            "{} [{}] {}/{}",
            self.material_id,
            switches.join(","),
            self.platform.name(),
            self.quality.name()
        )
    }
}
