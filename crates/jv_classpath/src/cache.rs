use crate::entry::ClasspathEntry;
use crate::index::ClasspathIndex;
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::cmp;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const CACHE_VERSION: u32 = 1;
const FINGERPRINT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("cache version mismatch (expected {expected}, found {found})")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("cache fingerprint mismatch")]
    FingerprintMismatch,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    fingerprint: IndexFingerprint,
    index: ClasspathIndex,
}

/// Inputs that produced an index: every entry in order plus the runtime
/// image used to resolve module references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexFingerprint {
    version: u32,
    runtime_image: Option<String>,
    entries: Vec<EntryFingerprint>,
}

impl IndexFingerprint {
    pub fn capture(
        entries: &[ClasspathEntry],
        runtime_image: Option<&Path>,
    ) -> Result<Self, CacheError> {
        let entries = entries
            .iter()
            .map(EntryFingerprint::capture)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            version: FINGERPRINT_VERSION,
            runtime_image: runtime_image.map(|path| path.to_string_lossy().into_owned()),
            entries,
        })
    }

    pub fn digest_hex(&self) -> Result<String, CacheError> {
        let encoded = bincode::serialize(self)?;
        let mut hasher = Hasher::new();
        hasher.update(&encoded);
        Ok(hasher.finalize().to_hex().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct EntryFingerprint {
    entry: ClasspathEntry,
    state: ArtifactState,
}

impl EntryFingerprint {
    fn capture(entry: &ClasspathEntry) -> Result<Self, CacheError> {
        Ok(Self {
            entry: entry.clone(),
            state: artifact_state(&entry.path)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
enum ArtifactState {
    Missing,
    File {
        len: u64,
        modified_secs: Option<u64>,
    },
    Directory {
        total_entries: u64,
        total_size: u64,
        latest_modified_secs: Option<u64>,
    },
}

fn artifact_state(path: &Path) -> Result<ArtifactState, CacheError> {
    if !path.exists() {
        return Ok(ArtifactState::Missing);
    }

    let metadata = fs::metadata(path)?;
    if !metadata.is_dir() {
        return Ok(ArtifactState::File {
            len: metadata.len(),
            modified_secs: metadata.modified().ok().and_then(system_time_to_secs),
        });
    }

    let mut stack = vec![path.to_path_buf()];
    let mut total_entries = 0u64;
    let mut total_size = 0u64;
    let mut latest_modified = metadata.modified().ok().and_then(system_time_to_secs);
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            latest_modified = cmp::max(
                latest_modified,
                meta.modified().ok().and_then(system_time_to_secs),
            );
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total_entries += 1;
                total_size += meta.len();
            }
        }
    }

    Ok(ArtifactState::Directory {
        total_entries,
        total_size,
        latest_modified_secs: latest_modified,
    })
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .map(|duration| duration.as_secs())
}

/// On-disk cache of descriptive indexes, keyed by [`IndexFingerprint`].
#[derive(Debug, Clone)]
pub struct IndexCache {
    root: PathBuf,
}

impl IndexCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, fingerprint: &IndexFingerprint) -> Result<PathBuf, CacheError> {
        let key = fingerprint.digest_hex()?;
        Ok(self.root.join(format!("classpath-index-{key}.bin")))
    }

    pub fn load(&self, fingerprint: &IndexFingerprint) -> Result<Option<ClasspathIndex>, CacheError> {
        let path = self.path_for(fingerprint)?;
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = BufReader::new(File::open(&path)?);
        let entry: CacheFile = bincode::deserialize_from(&mut reader)?;
        if entry.version != CACHE_VERSION {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_VERSION,
                found: entry.version,
            });
        }
        if entry.fingerprint != *fingerprint {
            return Err(CacheError::FingerprintMismatch);
        }
        Ok(Some(entry.index))
    }

    pub fn store(
        &self,
        fingerprint: &IndexFingerprint,
        index: &ClasspathIndex,
    ) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(fingerprint)?;
        let mut writer = BufWriter::new(File::create(&path)?);
        let entry = CacheFile {
            version: CACHE_VERSION,
            fingerprint: fingerprint.clone(),
            index: index.clone(),
        };
        bincode::serialize_into(&mut writer, &entry)?;
        Ok(path)
    }
}
