pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Binds an external resource (e.g. a chat channel) to the group that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMapping {
    #[serde(rename = "externalId")]
    pub external_id: String,
    #[serde(rename = "ownerGroup")]
    pub owner_group: String,
    #[serde(default, rename = "isPrivileged")]
    pub is_privileged: bool,
}

/// In-memory view of the mapping file.
///
/// Lookups clone the current snapshot `Arc` and never block on a reload; a
/// reload parses the whole file first and then swaps the reference.
pub struct ResourceRegistry {
    path: PathBuf,
    snapshot: RwLock<Arc<[ResourceMapping]>>,
}

impl ResourceRegistry {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mappings = read_mappings(&path)?;
        info!(
            "loaded {} resource mappings from {}",
            mappings.len(),
            path.display()
        );
        Ok(Self {
            path,
            snapshot: RwLock::new(mappings.into()),
        })
    }

    /// Registry with fixed contents and no backing file; `reload` empties it.
    pub fn from_mappings(mappings: Vec<ResourceMapping>) -> Self {
        Self {
            path: PathBuf::new(),
            snapshot: RwLock::new(mappings.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the backing file and swap it in. On error the previous
    /// snapshot stays live. Returns the new mapping count.
    pub fn reload(&self) -> Result<usize> {
        let mappings: Arc<[ResourceMapping]> = read_mappings(&self.path)?.into();
        let count = mappings.len();
        match self.snapshot.write() {
            Ok(mut guard) => *guard = mappings,
            Err(poisoned) => *poisoned.into_inner() = mappings,
        }
        info!("resource mappings reloaded ({} entries)", count);
        Ok(count)
    }

    pub fn snapshot(&self) -> Arc<[ResourceMapping]> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn find_by_external_id(&self, external_id: &str) -> Option<ResourceMapping> {
        self.snapshot()
            .iter()
            .find(|m| m.external_id == external_id)
            .cloned()
    }

    pub fn find_by_owner(&self, group: &str) -> Option<ResourceMapping> {
        self.snapshot()
            .iter()
            .find(|m| m.owner_group == group)
            .cloned()
    }

    /// Whether `group` owns at least one privileged mapping.
    pub fn is_privileged_group(&self, group: &str) -> bool {
        self.snapshot()
            .iter()
            .any(|m| m.owner_group == group && m.is_privileged)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_mappings(path: &Path) -> Result<Vec<ResourceMapping>> {
    if path.as_os_str().is_empty() || !path.exists() {
        warn!(
            "resource mapping file {} not found, starting with no mappings",
            path.display()
        );
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mappings: Vec<ResourceMapping> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse mapping file {}", path.display()))?;

    let mut seen = std::collections::HashSet::new();
    for m in &mappings {
        if !seen.insert(m.external_id.as_str()) {
            warn!(
                "duplicate mapping for {} in {}; first entry wins",
                m.external_id,
                path.display()
            );
        }
    }
    Ok(mappings)
}
