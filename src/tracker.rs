//! Change tracker: content fingerprints diffed against the previous run.
//!
//! Walks the corpus root, keeps files whose extension is on the allow-list,
//! prunes denylisted subdirectories, and hashes each file with a streaming
//! SHA-256. A file is *changed* when its key is absent from the previous
//! fingerprint map or its digest differs.
//!
//! Every successful scan overwrites the persisted map with exactly the
//! files seen in that scan. That write is committed state: it is not rolled
//! back if the caller later fails to index. Deleted files are neither
//! reported nor tracked.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{FormatKind, SourceFile};
use crate::persist::write_atomic;

/// Root-relative path → hex SHA-256. Ordered so the persisted JSON is stable.
pub type FingerprintMap = BTreeMap<String, String>;

const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Result of one tracking pass.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Every tracked file seen, sorted by key.
    pub files: Vec<SourceFile>,
    /// Files that are new or whose fingerprint changed.
    pub changed: Vec<SourceFile>,
    /// The fresh map, already persisted.
    pub state: FingerprintMap,
}

impl ScanOutcome {
    pub fn changed_keys(&self) -> Vec<&str> {
        self.changed.iter().map(|f| f.key.as_str()).collect()
    }
}

pub struct ChangeTracker {
    root: PathBuf,
    extensions: HashSet<String>,
    exclude_set: GlobSet,
    follow_symlinks: bool,
    state_path: PathBuf,
}

impl ChangeTracker {
    pub fn new(
        root: impl Into<PathBuf>,
        extensions: &[String],
        exclude_dirs: &[String],
        state_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut patterns = Vec::with_capacity(exclude_dirs.len() * 2);
        for dir in exclude_dirs {
            let dir = dir.trim_matches('/');
            patterns.push(dir.to_string());
            patterns.push(format!("{}/**", dir));
        }

        Ok(Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude_set: build_globset(&patterns)?,
            follow_symlinks: false,
            state_path: state_path.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut tracker = Self::new(
            &config.data.root,
            &config.tracker.extensions,
            &config.tracker.exclude_dirs,
            &config.tracker.state_file,
        )?;
        tracker.follow_symlinks = config.tracker.follow_symlinks;
        Ok(tracker)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the previous fingerprint map. A missing file is an empty map;
    /// an unparseable one is logged and treated as empty so every file is
    /// re-ingested.
    pub fn load_state(&self) -> FingerprintMap {
        let content = match std::fs::read_to_string(&self.state_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return FingerprintMap::new(),
            Err(e) => {
                warn!(path = %self.state_path.display(), error = %e, "could not read fingerprint state");
                return FingerprintMap::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.state_path.display(), error = %e, "fingerprint state is corrupt, starting fresh");
                FingerprintMap::new()
            }
        }
    }

    /// Scan the root, diff against `previous`, and persist the fresh map.
    pub fn scan(&self, previous: &FingerprintMap) -> Result<ScanOutcome> {
        let files = self.scan_files()?;
        let changed = changed_files(&files, previous);

        let state: FingerprintMap = files
            .iter()
            .map(|f| (f.key.clone(), f.fingerprint.clone()))
            .collect();
        save_state(&self.state_path, &state)?;

        info!(
            tracked = files.len(),
            changed = changed.len(),
            "change tracker scan complete"
        );
        Ok(ScanOutcome {
            files,
            changed,
            state,
        })
    }

    /// Walk and fingerprint without touching persisted state.
    pub fn scan_files(&self) -> Result<Vec<SourceFile>> {
        let root = &self.root;
        if !root.exists() {
            bail!("Data root does not exist: {}", root.display());
        }

        let mut candidates = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                !self.exclude_set.is_match(relative_key(root, entry.path()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let key = relative_key(root, path);

            if self.exclude_set.is_match(&key) {
                continue;
            }

            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            let format = match ext {
                Some(ref e) if self.extensions.contains(e) => FormatKind::from_extension(e),
                _ => None,
            };
            let Some(format) = format else {
                continue;
            };

            candidates.push((path.to_path_buf(), key, format));
        }

        let mut files = fingerprint_all(candidates, fingerprint_file);
        // Sort for deterministic ordering
        files.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(count = files.len(), root = %root.display(), "walked data root");
        Ok(files)
    }
}

/// Streaming SHA-256 over fixed-size chunks, hex-encoded.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_BYTES];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash each candidate. Files that cannot be read are logged and left out,
/// so they are neither tracked nor reported as changed.
fn fingerprint_all<F>(candidates: Vec<(PathBuf, String, FormatKind)>, hash: F) -> Vec<SourceFile>
where
    F: Fn(&Path) -> std::io::Result<String>,
{
    candidates
        .into_iter()
        .filter_map(|(path, key, format)| match hash(&path) {
            Ok(fingerprint) => Some(SourceFile {
                path,
                key,
                fingerprint,
                format,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file");
                None
            }
        })
        .collect()
}

/// Files that are new relative to `previous` or whose fingerprint differs.
pub fn changed_files(files: &[SourceFile], previous: &FingerprintMap) -> Vec<SourceFile> {
    files
        .iter()
        .filter(|f| previous.get(&f.key) != Some(&f.fingerprint))
        .cloned()
        .collect()
}

/// Persist the map as pretty-printed JSON, fully replacing the old file.
pub fn save_state(path: &Path, state: &FingerprintMap) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    write_atomic(path, json.as_bytes())?;
    Ok(())
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tracker(tmp: &TempDir) -> ChangeTracker {
        let exts: Vec<String> = ["txt", "json", "pdf"].iter().map(|s| s.to_string()).collect();
        ChangeTracker::new(
            tmp.path().join("data"),
            &exts,
            &["indexes".to_string(), "economic_events/raw".to_string()],
            tmp.path().join("data/indexes/fingerprints.json"),
        )
        .unwrap()
    }

    fn seed(tmp: &TempDir) {
        let data = tmp.path().join("data");
        fs::create_dir_all(data.join("forex_news")).unwrap();
        fs::create_dir_all(data.join("economic_events/raw")).unwrap();
        fs::write(data.join("forex_news/a.txt"), "EUR/USD rallies").unwrap();
        fs::write(data.join("event.json"), r#"{"event":"NFP"}"#).unwrap();
        fs::write(data.join("notes.docx"), "ignored").unwrap();
        fs::write(data.join("economic_events/raw/r.json"), "{}").unwrap();
    }

    #[test]
    fn second_scan_without_changes_is_empty() {
        let tmp = TempDir::new().unwrap();
        seed(&tmp);
        let t = tracker(&tmp);

        let first = t.scan(&t.load_state()).unwrap();
        assert_eq!(first.changed_keys(), vec!["event.json", "forex_news/a.txt"]);

        let second = t.scan(&t.load_state()).unwrap();
        assert!(second.changed.is_empty());
        assert_eq!(second.files.len(), 2);
    }

    #[test]
    fn single_byte_edit_is_detected() {
        let tmp = TempDir::new().unwrap();
        seed(&tmp);
        let t = tracker(&tmp);
        t.scan(&t.load_state()).unwrap();

        fs::write(tmp.path().join("data/forex_news/a.txt"), "EUR/USD rallieS").unwrap();
        let outcome = t.scan(&t.load_state()).unwrap();
        assert_eq!(outcome.changed_keys(), vec!["forex_news/a.txt"]);
    }

    #[test]
    fn denylisted_directories_and_unknown_extensions_are_skipped() {
        let tmp = TempDir::new().unwrap();
        seed(&tmp);
        let t = tracker(&tmp);
        let files = t.scan_files().unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert!(!keys.iter().any(|k| k.starts_with("economic_events/raw")));
        assert!(!keys.contains(&"notes.docx"));
    }

    #[test]
    fn persisted_state_is_pretty_json_and_drops_deleted_files() {
        let tmp = TempDir::new().unwrap();
        seed(&tmp);
        let t = tracker(&tmp);
        t.scan(&FingerprintMap::new()).unwrap();

        fs::remove_file(tmp.path().join("data/event.json")).unwrap();
        let outcome = t.scan(&t.load_state()).unwrap();
        assert!(outcome.changed.is_empty());

        let raw = fs::read_to_string(tmp.path().join("data/indexes/fingerprints.json")).unwrap();
        assert!(raw.contains("\n  \"forex_news/a.txt\""));
        let map: FingerprintMap = serde_json::from_str(&raw).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn fingerprint_is_independent_of_chunking() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.txt");
        let body = "x".repeat(HASH_CHUNK_BYTES * 2 + 17);
        fs::write(&path, &body).unwrap();

        let expected = hex::encode(Sha256::digest(body.as_bytes()));
        assert_eq!(fingerprint_file(&path).unwrap(), expected);
    }

    #[test]
    fn corrupt_state_is_treated_as_empty() {
        let tmp = TempDir::new().unwrap();
        seed(&tmp);
        let t = tracker(&tmp);
        fs::create_dir_all(tmp.path().join("data/indexes")).unwrap();
        fs::write(tmp.path().join("data/indexes/fingerprints.json"), "{not json").unwrap();
        assert!(t.load_state().is_empty());
    }

    #[test]
    fn hashing_failure_drops_only_that_file() {
        let candidates = vec![
            (PathBuf::from("a.txt"), "a.txt".to_string(), FormatKind::Text),
            (PathBuf::from("gone.txt"), "gone.txt".to_string(), FormatKind::Text),
            (PathBuf::from("b.json"), "b.json".to_string(), FormatKind::Json),
        ];
        let files = fingerprint_all(candidates, |path| {
            if path.ends_with("gone.txt") {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "vanished"))
            } else {
                Ok(format!("hash-of-{}", path.display()))
            }
        });

        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "b.json"]);
        assert_eq!(files[1].fingerprint, "hash-of-b.json");
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_skipped_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        seed(&tmp);
        let locked = tmp.path().join("data/forex_news/locked.txt");
        fs::write(&locked, "GBP/USD").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&locked).is_ok() {
            // Privileged users can read mode 000 files; nothing to test.
            return;
        }

        let t = tracker(&tmp);
        let outcome = t.scan(&FingerprintMap::new()).unwrap();
        assert_eq!(outcome.changed_keys(), vec!["event.json", "forex_news/a.txt"]);
        assert!(!outcome.state.contains_key("forex_news/locked.txt"));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_skipped_when_following_links() {
        let tmp = TempDir::new().unwrap();
        seed(&tmp);
        std::os::unix::fs::symlink(
            tmp.path().join("data/missing.txt"),
            tmp.path().join("data/forex_news/dangling.txt"),
        )
        .unwrap();

        let mut t = tracker(&tmp);
        t.follow_symlinks = true;
        let outcome = t.scan(&FingerprintMap::new()).unwrap();
        assert_eq!(outcome.changed_keys(), vec!["event.json", "forex_news/a.txt"]);
        assert_eq!(outcome.files.len(), 2);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let t = tracker(&tmp);
        assert!(t.scan_files().is_err());
    }
}
