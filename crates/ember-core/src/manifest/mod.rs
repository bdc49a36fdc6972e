//! Model manifest: the persisted catalog of installed models.
//!
//! The manifest is a JSON array of descriptors, one per model file in the
//! models directory. It is rebuilt wholesale by [`reconcile`] and otherwise
//! treated as read-only by the rest of the crate.

mod classify;
mod reconcile;

pub use classify::{classify, clean_display_name};
pub use reconcile::{discover, reconcile};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File extensions considered model binaries during discovery.
pub const MODEL_EXTENSIONS: [&str; 1] = ["gguf"];

/// One catalog entry. Immutable once loaded; replaced wholesale on
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub file: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Load descriptors from a manifest file. A missing file is an empty
/// catalog, not an error.
pub fn load_manifest(path: &Path) -> Result<Vec<ModelDescriptor>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write the manifest atomically: serialize to a sibling temp file, then
/// rename over the target so a failure never corrupts the previous file.
pub fn save_manifest(path: &Path, descriptors: &[ModelDescriptor]) -> Result<()> {
    let json = serde_json::to_string_pretty(descriptors)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
