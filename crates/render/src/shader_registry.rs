//! WGSL sources keyed by name, with on-disk overrides and change tracking.
//!
//! # Invariants
//! - Every key has a built-in source; an override only ever replaces it.
//! - A shader is marked dirty only when the SHA-256 of its active source
//!   changes. Dirty flags are cleared by the consumer after rebuilding.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("unknown shader {0:?}")]
    Unknown(String),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ShaderKey(pub &'static str);

impl ShaderKey {
    pub fn as_str(self) -> &'static str {
        self.0
    }

    /// File name looked up in the override directory.
    pub fn file_name(self) -> String {
        format!("{}.wgsl", self.0)
    }
}

impl fmt::Display for ShaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    VertexFragment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ShaderOrigin {
    BuiltIn,
    Override(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ShaderEntry {
    pub key: ShaderKey,
    pub stage: ShaderStage,
    builtin: &'static str,
    source: String,
    digest: [u8; 32],
    origin: ShaderOrigin,
    dirty: bool,
}

impl ShaderEntry {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn origin(&self) -> &ShaderOrigin {
        &self.origin
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Swap in new text. Returns true when the digest changed.
    fn replace(&mut self, source: String, origin: ShaderOrigin) -> bool {
        let digest = sha256(&source);
        self.origin = origin;
        if digest == self.digest {
            return false;
        }
        self.source = source;
        self.digest = digest;
        self.dirty = true;
        true
    }
}

fn sha256(text: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

#[derive(Debug, Clone, Default)]
pub struct ShaderRegistry {
    entries: BTreeMap<ShaderKey, ShaderEntry>,
    override_dir: Option<PathBuf>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in source. Re-registering a key replaces it.
    pub fn register(&mut self, key: ShaderKey, stage: ShaderStage, source: &'static str) {
        self.entries.insert(
            key,
            ShaderEntry {
                key,
                stage,
                builtin: source,
                source: source.to_string(),
                digest: sha256(source),
                origin: ShaderOrigin::BuiltIn,
                dirty: false,
            },
        );
    }

    pub fn set_override_dir(&mut self, dir: Option<PathBuf>) {
        self.override_dir = dir;
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    pub fn get(&self, key: ShaderKey) -> Result<&ShaderEntry, ShaderError> {
        self.entries
            .get(&key)
            .ok_or_else(|| ShaderError::Unknown(key.to_string()))
    }

    pub fn source(&self, key: ShaderKey) -> Result<&str, ShaderError> {
        self.get(key).map(ShaderEntry::source)
    }

    pub fn keys(&self) -> impl Iterator<Item = ShaderKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ShaderEntry> {
        self.entries.values()
    }

    /// Re-read every override file. Keys without a file fall back to their
    /// built-in text. Returns the keys whose source changed.
    pub fn reload_from_dir(&mut self) -> Result<Vec<ShaderKey>, ShaderError> {
        let Some(dir) = self.override_dir.clone() else {
            return Ok(Vec::new());
        };
        let _span = tracing::info_span!("shader_reload", dir = %dir.display()).entered();

        let mut changed = Vec::new();
        for entry in self.entries.values_mut() {
            let path = dir.join(entry.key.file_name());
            let (source, origin) = match std::fs::read_to_string(&path) {
                Ok(text) => (text, ShaderOrigin::Override(path)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    (entry.builtin.to_string(), ShaderOrigin::BuiltIn)
                }
                Err(source) => return Err(ShaderError::Io { path, source }),
            };
            if entry.replace(source, origin) {
                tracing::info!(shader = %entry.key, "shader source changed");
                changed.push(entry.key);
            }
        }
        Ok(changed)
    }

    pub fn mark_dirty(&mut self, key: ShaderKey) -> Result<(), ShaderError> {
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| ShaderError::Unknown(key.to_string()))?;
        entry.dirty = true;
        Ok(())
    }

    pub fn is_dirty(&self, key: ShaderKey) -> bool {
        self.entries.get(&key).is_some_and(|e| e.dirty)
    }

    pub fn dirty_keys(&self) -> Vec<ShaderKey> {
        self.entries
            .values()
            .filter(|e| e.dirty)
            .map(|e| e.key)
            .collect()
    }

    pub fn clear_dirty(&mut self) {
        for entry in self.entries.values_mut() {
            entry.dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORWARD: ShaderKey = ShaderKey("forward");
    const SKY: ShaderKey = ShaderKey("sky");

    fn registry() -> ShaderRegistry {
        let mut r = ShaderRegistry::new();
        r.register(FORWARD, ShaderStage::VertexFragment, "// forward v1");
        r.register(SKY, ShaderStage::VertexFragment, "// sky v1");
        r
    }

    #[test]
    fn unknown_key_is_an_error() {
        let r = registry();
        assert!(matches!(
            r.source(ShaderKey("missing")),
            Err(ShaderError::Unknown(k)) if k == "missing"
        ));
        assert_eq!(r.source(SKY).unwrap(), "// sky v1");
    }

    #[test]
    fn override_marks_dirty_only_on_digest_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = registry();
        r.set_override_dir(Some(dir.path().to_path_buf()));

        // No files: everything stays built-in and clean.
        assert!(r.reload_from_dir().unwrap().is_empty());
        assert!(r.dirty_keys().is_empty());

        std::fs::write(dir.path().join("forward.wgsl"), "// forward v2").unwrap();
        assert_eq!(r.reload_from_dir().unwrap(), vec![FORWARD]);
        assert!(r.is_dirty(FORWARD));
        assert!(!r.is_dirty(SKY));
        assert_eq!(
            r.get(FORWARD).unwrap().origin(),
            &ShaderOrigin::Override(dir.path().join("forward.wgsl"))
        );

        r.clear_dirty();
        // Same text again: no change.
        assert!(r.reload_from_dir().unwrap().is_empty());
        assert!(!r.is_dirty(FORWARD));
    }

    #[test]
    fn removing_override_restores_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = registry();
        r.set_override_dir(Some(dir.path().to_path_buf()));
        let path = dir.path().join("sky.wgsl");
        std::fs::write(&path, "// sky edited").unwrap();
        r.reload_from_dir().unwrap();
        r.clear_dirty();

        std::fs::remove_file(&path).unwrap();
        assert_eq!(r.reload_from_dir().unwrap(), vec![SKY]);
        assert_eq!(r.source(SKY).unwrap(), "// sky v1");
        assert_eq!(r.get(SKY).unwrap().origin(), &ShaderOrigin::BuiltIn);
    }

    #[test]
    fn digest_is_sha256_hex() {
        let r = registry();
        let hex = r.get(SKY).unwrap().digest_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
