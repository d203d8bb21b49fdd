//! SHA-256 content identity for COPY sources.
//!
//! Digests are computed once, before merging, so the merge itself never
//! touches the filesystem.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use vresolve_common::error::{Result, VresolveError};
use vresolve_common::types::ContentDigest;

use crate::step::{Step, StepKind};

/// Computes the SHA-256 hash of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<ContentDigest> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let mut file = std::fs::File::open(path).map_err(|e| VresolveError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| VresolveError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    ContentDigest::from_hex(format!("{:x}", hasher.finalize()))
}

/// Resolves `source` against the canonical context `root`, or `None` when it
/// is absolute, climbs with `..`, or leads outside `root` through a symlink.
fn within_context(root: Option<&Path>, source: &str) -> Option<PathBuf> {
    let root = root?;
    let relative = Path::new(source);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    let path = root.join(relative);
    match path.canonicalize() {
        Ok(real) if real.starts_with(root) => Some(path),
        Ok(_) => None,
        // Missing files are reported by the caller.
        Err(_) => Some(path),
    }
}

/// Map from literal COPY source path to the digest of its content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestIndex {
    by_source: BTreeMap<String, ContentDigest>,
}

impl DigestIndex {
    /// Hashes every literal COPY source among `steps` that is a regular file
    /// under `context`.
    ///
    /// Templated sources, directories, missing files, paths that resolve
    /// outside `context` and files larger than
    /// [`vresolve_common::constants::MAX_DIGEST_BYTES`] are skipped; they
    /// stay subject to the strict policy.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing regular file cannot be read.
    pub fn build<'a>(context: &Path, steps: impl IntoIterator<Item = &'a Step>) -> Result<Self> {
        let mut index = Self::default();
        let root = context.canonicalize().ok();
        for step in steps {
            if step.kind != StepKind::Copy {
                continue;
            }
            let source = step.source_text();
            if source.contains("${") || index.by_source.contains_key(source) {
                continue;
            }
            let Some(path) = within_context(root.as_deref(), source) else {
                tracing::debug!(source, "COPY source outside the context, not hashed");
                continue;
            };
            let Ok(meta) = std::fs::metadata(&path) else {
                tracing::debug!(source, "COPY source not found in context, not hashed");
                continue;
            };
            if !meta.is_file() || meta.len() > vresolve_common::constants::MAX_DIGEST_BYTES {
                continue;
            }
            let digest = hash_file(&path)?;
            let _ = index.by_source.insert(source.to_owned(), digest);
        }
        tracing::info!(
            context = %context.display(),
            hashed = index.by_source.len(),
            "built COPY digest index"
        );
        Ok(index)
    }

    /// Records a digest for a source path.
    pub fn insert(&mut self, source: impl Into<String>, digest: ContentDigest) {
        let _ = self.by_source.insert(source.into(), digest);
    }

    /// Returns the digest recorded for `source`.
    #[must_use]
    pub fn get(&self, source: &str) -> Option<&ContentDigest> {
        self.by_source.get(source)
    }

    /// Whether both sources were hashed and their contents are identical.
    #[must_use]
    pub fn same_content(&self, a: &str, b: &str) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Number of hashed sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    /// Whether nothing was hashed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Origin;

    fn copy(src: &str, dest: &str) -> Step {
        Step::new(StepKind::Copy, dest, src, Origin::new("base", 1))
    }

    #[test]
    fn hash_file_matches_known_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").expect("write");
        let digest = hash_file(&path).expect("hash");
        assert_eq!(
            digest.as_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn identical_files_share_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.json"), b"{}").expect("write");
        std::fs::write(dir.path().join("b.json"), b"{}").expect("write");
        std::fs::write(dir.path().join("c.json"), b"[]").expect("write");
        let steps = [
            copy("a.json", "./config.json"),
            copy("b.json", "./config.json"),
            copy("c.json", "./other.json"),
        ];
        let index = DigestIndex::build(dir.path(), &steps).expect("index");
        assert_eq!(index.len(), 3);
        assert!(index.same_content("a.json", "b.json"));
        assert!(!index.same_content("a.json", "c.json"));
    }

    #[test]
    fn sources_outside_the_context_are_not_hashed() {
        let outer = tempfile::tempdir().expect("tempdir");
        let context = outer.path().join("context");
        std::fs::create_dir(&context).expect("mkdir");
        let secret = outer.path().join("outside.json");
        std::fs::write(&secret, b"{}").expect("write");
        std::fs::write(context.join("inside.json"), b"{}").expect("write");

        let absolute = secret.to_string_lossy().into_owned();
        let steps = [
            copy(&absolute, "./a.json"),
            copy("../outside.json", "./b.json"),
            copy("./inside.json", "./c.json"),
        ];
        let index = DigestIndex::build(&context, &steps).expect("index");
        assert_eq!(index.len(), 1);
        assert!(index.get(&absolute).is_none());
        assert!(index.get("../outside.json").is_none());
        assert!(!index.same_content("../outside.json", "./inside.json"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_leaving_the_context_is_not_hashed() {
        let outer = tempfile::tempdir().expect("tempdir");
        let context = outer.path().join("context");
        std::fs::create_dir(&context).expect("mkdir");
        std::fs::write(outer.path().join("outside.json"), b"{}").expect("write");
        std::os::unix::fs::symlink(outer.path().join("outside.json"), context.join("link.json"))
            .expect("symlink");

        let index = DigestIndex::build(&context, &[copy("link.json", "./a.json")]).expect("index");
        assert!(index.is_empty());
    }

    #[test]
    fn templated_directory_and_missing_sources_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("optimade")).expect("mkdir");
        let steps = [
            copy("${CONFIG_FILE}", "./config.json"),
            copy("optimade", "./optimade"),
            copy("missing.json", "./missing.json"),
        ];
        let index = DigestIndex::build(dir.path(), &steps).expect("index");
        assert!(index.is_empty());
        assert!(!index.same_content("missing.json", "missing.json"));
    }
}
