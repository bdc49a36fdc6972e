//! Manifest reconciliation: discover model files and diff them against the
//! persisted catalog.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};

use super::{classify, load_manifest, save_manifest, ModelDescriptor, MODEL_EXTENSIONS};
use crate::error::Result;

/// List model files in `dir` by extension. Non-file entries and zero-byte
/// files are excluded.
pub fn discover(dir: &Path) -> Result<BTreeSet<String>> {
    let mut found = BTreeSet::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_model = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| MODEL_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if !is_model || !path.is_file() {
            continue;
        }
        if entry.metadata()?.len() == 0 {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            found.insert(name.to_string());
        }
    }

    Ok(found)
}

/// Synchronize the manifest at `manifest_path` with the contents of `dir`.
///
/// Newly discovered files are classified into fresh descriptors. With
/// `preserve_existing`, descriptors whose file is still present keep their
/// (possibly hand-edited) metadata; orphaned entries are logged and dropped
/// from the manifest, never deleted from disk. The result is sorted by
/// display name and written atomically. Returns false on any I/O or parse
/// failure, leaving the previous manifest intact.
pub fn reconcile(dir: &Path, manifest_path: &Path, preserve_existing: bool) -> bool {
    match try_reconcile(dir, manifest_path, preserve_existing) {
        Ok(total) => {
            info!("Manifest reconciled: {} models cataloged", total);
            true
        }
        Err(err) => {
            warn!("Manifest reconciliation failed: {}", err);
            false
        }
    }
}

fn try_reconcile(dir: &Path, manifest_path: &Path, preserve_existing: bool) -> Result<usize> {
    let discovered = discover(dir)?;
    let existing = load_manifest(manifest_path)?;
    let existing_files: BTreeSet<String> = existing.iter().map(|d| d.file.clone()).collect();

    let orphaned: Vec<&String> = existing_files.difference(&discovered).collect();
    // Without preservation every discovered file is reclassified from
    // scratch; otherwise only the genuinely new ones are.
    let new_files: Vec<&String> = if preserve_existing {
        discovered.difference(&existing_files).collect()
    } else {
        discovered.iter().collect()
    };

    let mut updated: Vec<ModelDescriptor> = Vec::new();

    if preserve_existing {
        for descriptor in existing {
            if discovered.contains(&descriptor.file) {
                updated.push(descriptor);
            } else {
                warn!("Orphaned manifest entry: {}", descriptor.file);
            }
        }
    }

    for file in &new_files {
        let file = file.as_str();
        info!("Classifying new model file: {}", file);
        let mut descriptor = classify(file);
        // Two files can clean to the same display name; fall back to the
        // raw stem so catalog names stay unique.
        if updated.iter().any(|d| d.name == descriptor.name) {
            let stem = Path::new(file)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file)
                .to_string();
            warn!(
                "Display name collision for '{}'; using '{}' instead",
                descriptor.name, stem
            );
            descriptor.name = stem;
        }
        updated.push(descriptor);
    }

    updated.sort_by(|a, b| a.name.cmp(&b.name));
    save_manifest(manifest_path, &updated)?;

    info!(
        "Reconciliation summary: {} total, {} new, {} orphaned",
        updated.len(),
        new_files.len(),
        orphaned.len()
    );

    Ok(updated.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_model(dir: &Path, name: &str, contents: &[u8]) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn discovers_only_nonempty_model_files() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "alpha.gguf", b"weights");
        write_model(dir.path(), "empty.gguf", b"");
        write_model(dir.path(), "notes.txt", b"hello");
        fs::create_dir(dir.path().join("sub.gguf")).unwrap();

        let found = discover(dir.path()).unwrap();
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["alpha.gguf"]);
    }

    #[test]
    fn classifies_new_files_into_fresh_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "tinymodel-1b.Q4_K_M.gguf", b"weights");
        let manifest = dir.path().join("models.json");

        assert!(reconcile(dir.path(), &manifest, true));

        let loaded = load_manifest(&manifest).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "tinymodel");
        for tag in ["llm", "local", "efficient", "compact", "responsive"] {
            assert!(loaded[0].tags.iter().any(|t| t == tag), "missing {tag}");
        }
    }

    #[test]
    fn reconcile_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "alpha-chat.gguf", b"weights");
        write_model(dir.path(), "beta-7b.gguf", b"weights");
        let manifest = dir.path().join("models.json");

        assert!(reconcile(dir.path(), &manifest, true));
        let first = fs::read(&manifest).unwrap();

        assert!(reconcile(dir.path(), &manifest, true));
        let second = fs::read(&manifest).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn preserves_existing_metadata_and_drops_orphans() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "alpha.gguf", b"weights");
        let manifest = dir.path().join("models.json");

        let existing = vec![
            ModelDescriptor {
                name: "alpha".to_string(),
                file: "alpha.gguf".to_string(),
                description: "hand-edited description".to_string(),
                tags: vec!["curated".to_string()],
            },
            ModelDescriptor {
                name: "ghost".to_string(),
                file: "ghost.gguf".to_string(),
                description: "file no longer present".to_string(),
                tags: vec![],
            },
        ];
        save_manifest(&manifest, &existing).unwrap();

        assert!(reconcile(dir.path(), &manifest, true));

        let loaded = load_manifest(&manifest).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].description, "hand-edited description");
        assert_eq!(loaded[0].tags, vec!["curated"]);
    }

    #[test]
    fn parse_failure_returns_false_and_keeps_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), "alpha.gguf", b"weights");
        let manifest = dir.path().join("models.json");
        fs::write(&manifest, b"{ not json").unwrap();

        assert!(!reconcile(dir.path(), &manifest, true));
        assert_eq!(fs::read(&manifest).unwrap(), b"{ not json");
    }

    #[test]
    fn missing_directory_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("models.json");

        assert!(!reconcile(&dir.path().join("nope"), &manifest, true));
        assert!(!manifest.exists());
    }
}
