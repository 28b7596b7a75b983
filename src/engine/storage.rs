// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Artifact storage paths
//!
//! A [`StorageLayout`] derives where an artifact lives for a version. The
//! [`PathOverrides`] table lets one version borrow another version's artifact
//! under the same key; resolution follows overrides before falling back to the
//! layout.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::graph::VersionId;
use crate::pipeline::{Config, Context, StorageKey};

/// Default path derivation for artifacts
pub trait StorageLayout: Send + Sync {
    /// Path of `key` for the version described by `context` and `config`
    fn default_path(&self, key: &StorageKey, context: &Context, config: &Config) -> PathBuf;
}

/// Layout rooted at a directory: `root/<version>/<key>`
#[derive(Debug, Clone)]
pub struct DirectoryLayout {
    root: PathBuf,
    fingerprint_config: bool,
}

impl DirectoryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fingerprint_config: false,
        }
    }

    /// Insert a hash of the config between version and key, so that runs
    /// with different configs never share artifacts
    pub fn with_config_fingerprint(mut self, enabled: bool) -> Self {
        self.fingerprint_config = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fingerprint(config: &Config) -> String {
        let mut hasher = blake3::Hasher::new();
        for (key, value) in config.iter() {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().as_str()[..12].to_string()
    }
}

impl StorageLayout for DirectoryLayout {
    fn default_path(&self, key: &StorageKey, context: &Context, config: &Config) -> PathBuf {
        let mut path = self.root.join(context.version().as_str());
        if self.fingerprint_config {
            path.push(Self::fingerprint(config));
        }
        path.push(key.as_str());
        path
    }
}

/// Version-keyed, key-keyed override table
#[derive(Debug, Default)]
pub struct PathOverrides {
    table: RwLock<HashMap<VersionId, HashMap<StorageKey, VersionId>>>,
}

impl PathOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `version` use the artifact `key` computed for `from`
    pub fn borrow(&self, version: VersionId, key: StorageKey, from: VersionId) {
        self.table.write().entry(version).or_default().insert(key, from);
    }

    /// Direct override for (`version`, `key`), if any
    pub fn target(&self, version: &VersionId, key: &StorageKey) -> Option<VersionId> {
        self.table
            .read()
            .get(version)
            .and_then(|keys| keys.get(key))
            .cloned()
    }

    /// Follow overrides from `version` until a version without one.
    ///
    /// A cycle stops at the last version before it repeats.
    pub fn resolve(&self, version: &VersionId, key: &StorageKey) -> VersionId {
        let table = self.table.read();
        let mut current = version.clone();
        let mut visited = HashSet::from([current.clone()]);

        while let Some(next) = table.get(&current).and_then(|keys| keys.get(key)) {
            if !visited.insert(next.clone()) {
                warn!(
                    key = %key,
                    version = %version,
                    "Path override cycle at '{}', using it as the source",
                    current
                );
                break;
            }
            current = next.clone();
        }

        current
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}
