//! Registry of source unit variants and their variant-tagged encoding

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::unit::{SourceUnit, UnitId, UnitVariant};

type DecodeFn = fn(Value) -> serde_json::Result<Arc<dyn SourceUnit>>;
type EncodeFn = fn(&dyn SourceUnit) -> Option<serde_json::Result<Value>>;

struct VariantEntry {
    decode: DecodeFn,
    encode: EncodeFn,
}

/// A source unit serialized with its variant name, as exchanged with
/// scanners and persisted in `units.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedUnit {
    #[serde(rename = "Type")]
    pub variant: String,
    #[serde(rename = "Data")]
    pub data: Value,
}

/// Bidirectional mapping between variant names and concrete unit types.
///
/// Filled once while wiring the process and read-only afterwards.
#[derive(Default)]
pub struct UnitRegistry {
    by_name: HashMap<String, VariantEntry>,
    by_type: HashMap<TypeId, String>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `U` under its own [`UnitVariant::VARIANT`] tag.
    pub fn register<U: UnitVariant>(&mut self) {
        self.register_as::<U>(U::VARIANT);
    }

    /// Register `U` under `name`.
    ///
    /// Panics if `name` is empty, already taken, or `U` is already
    /// registered under another name: these are wiring mistakes.
    pub fn register_as<U: UnitVariant>(&mut self, name: &str) {
        if name.is_empty() {
            panic!("unit: register name is empty");
        }
        if self.by_name.contains_key(name) {
            panic!("unit: register called twice for variant name {name}");
        }
        let type_id = TypeId::of::<U>();
        if let Some(existing) = self.by_type.get(&type_id) {
            panic!(
                "unit: register called twice for type {} (already registered as {existing})",
                std::any::type_name::<U>()
            );
        }

        self.by_name.insert(
            name.to_string(),
            VariantEntry {
                decode: decode_unit::<U>,
                encode: encode_unit::<U>,
            },
        );
        self.by_type.insert(type_id, name.to_string());
        tracing::debug!("Registered source unit variant {}", name);
    }

    /// Variant name of a unit's concrete type.
    pub fn variant_of(&self, unit: &dyn SourceUnit) -> Result<&str> {
        self.by_type
            .get(&unit.as_any().type_id())
            .map(String::as_str)
            .ok_or_else(|| CoreError::UnknownVariant(format!("{unit:?}")))
    }

    /// Name `U` was registered under, if it was.
    pub fn name_of<U: 'static>(&self) -> Option<&str> {
        self.by_type.get(&TypeId::of::<U>()).map(String::as_str)
    }

    pub fn make_id(&self, unit: &dyn SourceUnit) -> Result<UnitId> {
        Ok(UnitId::new(unit.name(), self.variant_of(unit)?))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered variant names, sorted.
    pub fn variants(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn encode(&self, unit: &dyn SourceUnit) -> Result<TaggedUnit> {
        let variant = self.variant_of(unit)?;
        let entry = &self.by_name[variant];
        let data = (entry.encode)(unit)
            .ok_or_else(|| CoreError::UnknownVariant(variant.to_string()))??;
        Ok(TaggedUnit {
            variant: variant.to_string(),
            data,
        })
    }

    pub fn decode(&self, tagged: TaggedUnit) -> Result<Arc<dyn SourceUnit>> {
        let entry = self
            .by_name
            .get(&tagged.variant)
            .ok_or_else(|| CoreError::UnknownVariant(tagged.variant.clone()))?;
        Ok((entry.decode)(tagged.data)?)
    }

    pub fn encode_all(&self, units: &[Arc<dyn SourceUnit>]) -> Result<Vec<TaggedUnit>> {
        units.iter().map(|u| self.encode(u.as_ref())).collect()
    }

    /// Decode a JSON array of variant-tagged units. Empty input is no units.
    pub fn decode_all(&self, data: &[u8]) -> Result<Vec<Arc<dyn SourceUnit>>> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let tagged: Option<Vec<TaggedUnit>> = serde_json::from_slice(data)?;
        tagged
            .unwrap_or_default()
            .into_iter()
            .map(|t| self.decode(t))
            .collect()
    }
}

impl std::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("variants", &self.variants())
            .finish()
    }
}

fn decode_unit<U: UnitVariant>(data: Value) -> serde_json::Result<Arc<dyn SourceUnit>> {
    let unit: U = serde_json::from_value(data)?;
    Ok(Arc::new(unit))
}

fn encode_unit<U: UnitVariant>(unit: &dyn SourceUnit) -> Option<serde_json::Result<Value>> {
    unit.as_any()
        .downcast_ref::<U>()
        .map(serde_json::to_value)
}
