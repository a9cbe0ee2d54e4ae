//! Chip catalog: model name and JEDEC id to geometry.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProgrammerError, Result};

const BUILTIN_CATALOG: &str = include_str!("../data/chips.json");

/// One supported flash part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipDescriptor {
    pub model: String,
    /// Hex JEDEC id as written in the catalog, e.g. `0xEF4016`.
    #[serde(rename = "jdec_id")]
    pub jedec_id: String,
    /// Total size in bytes.
    pub capacity: u64,
    /// Program page size in bytes.
    pub page_size: u32,
    #[serde(rename = "manufacturer_name")]
    pub manufacturer: String,
}

impl ChipDescriptor {
    /// JEDEC id as the device reports it: lowercase hex, no prefix.
    pub fn jedec_hex(&self) -> String {
        normalize_jedec(&self.jedec_id)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    parts: Vec<ChipDescriptor>,
}

/// Immutable set of known chips, loaded once and passed where needed.
#[derive(Debug, Clone, Default)]
pub struct ChipCatalog {
    parts: Vec<ChipDescriptor>,
}

impl ChipCatalog {
    /// The catalog compiled into this crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Parse a `{"parts": [...]}` document.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(text)?;
        debug!(parts = file.parts.len(), "chip catalog loaded");
        Ok(Self { parts: file.parts })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ProgrammerError::CatalogRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Look up a chip by model name, ignoring case.
    pub fn by_model(&self, model: &str) -> Option<&ChipDescriptor> {
        self.parts
            .iter()
            .find(|part| part.model.eq_ignore_ascii_case(model))
    }

    /// Look up a chip by the id `get_jedec_id` returns (hex, with or
    /// without `0x`, any case).
    pub fn by_jedec_id(&self, jedec_id: &str) -> Option<&ChipDescriptor> {
        let wanted = normalize_jedec(jedec_id);
        self.parts.iter().find(|part| part.jedec_hex() == wanted)
    }

    pub fn lookup(&self, model: &str) -> Result<&ChipDescriptor> {
        self.by_model(model)
            .ok_or_else(|| ProgrammerError::UnknownChip(model.to_string()))
    }

    pub fn parts(&self) -> &[ChipDescriptor] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

fn normalize_jedec(id: &str) -> String {
    let id = id.trim();
    let hex = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);
    hex.to_ascii_lowercase()
}
