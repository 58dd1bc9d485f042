//! File-backed mutation persistence.
//!
//! Layout inside the store directory:
//! ```text
//! ledger.meta.json            - schema version, world seed, segment counters
//! segments/
//!   000001.mut.cbor.zst       - CBOR+zstd compressed mutation record batches
//! integrity/
//!   manifest.json             - hash chain manifest
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::{MutationRecord, MutationStore};

/// Current on-disk schema version.
const SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "ledger.meta.json";
const SEGMENT_DIR: &str = "segments";
const INTEGRITY_DIR: &str = "integrity";
const MANIFEST_FILE: &str = "manifest.json";

/// Errors from persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("store belongs to world seed {file_seed}, session uses {expected_seed}")]
    SeedMismatch { file_seed: u64, expected_seed: u64 },
}

/// Metadata stored in ledger.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: u32,
    pub seed: u64,
    pub segment_count: u32,
    /// Highest segment index ever written. New segments never reuse a name.
    #[serde(default)]
    pub last_segment: u32,
}

/// A single entry in the integrity manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

/// Integrity manifest tracking all segment hashes in a chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

/// Append-only mutation store bound to a single world seed.
///
/// Every [`MutationStore::save_mutation`] writes one small segment; edits
/// are rare, so segment count stays modest. [`FileStore::compact`] folds
/// them into one.
pub struct FileStore {
    root: PathBuf,
    meta: StoreMeta,
    manifest: IntegrityManifest,
}

impl FileStore {
    /// Open or create a store at `path` for the world generated from `seed`.
    pub fn open(path: impl AsRef<Path>, seed: u64) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(SEGMENT_DIR))?;
        std::fs::create_dir_all(root.join(INTEGRITY_DIR))?;

        let meta_path = root.join(META_FILE);
        let manifest_path = root.join(INTEGRITY_DIR).join(MANIFEST_FILE);

        let (meta, manifest) = if meta_path.exists() {
            let mut meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.schema_version != SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: SCHEMA_VERSION,
                });
            }
            if meta.seed != seed {
                return Err(StoreError::SeedMismatch {
                    file_seed: meta.seed,
                    expected_seed: seed,
                });
            }
            let manifest: IntegrityManifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            meta.last_segment = meta.last_segment.max(meta.segment_count);
            (meta, manifest)
        } else {
            let meta = StoreMeta {
                schema_version: SCHEMA_VERSION,
                seed,
                segment_count: 0,
                last_segment: 0,
            };
            let manifest = IntegrityManifest::default();
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            serde_json::to_writer_pretty(std::fs::File::create(&manifest_path)?, &manifest)?;
            (meta, manifest)
        };

        tracing::info!(
            root = %root.display(),
            seed,
            segments = meta.segment_count,
            "mutation store opened"
        );

        Ok(Self {
            root,
            meta,
            manifest,
        })
    }

    /// Append a batch of records as one new segment.
    ///
    /// The in-memory manifest only learns about the segment once its file is
    /// on disk, so a failed write leaves the store as it was.
    pub fn append_segment(&mut self, records: &[MutationRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let index = self.meta.last_segment + 1;
        let prev_hash = self.manifest.entries.last().map(|e| e.sha256.clone());
        let entry = self.write_segment(index, records, prev_hash)?;

        self.manifest.entries.push(entry);
        self.meta.last_segment = index;
        self.meta.segment_count = self.manifest.entries.len() as u32;
        self.save_meta()?;
        self.save_manifest()?;
        tracing::debug!(records = records.len(), segment = index, "segment appended");
        Ok(())
    }

    /// Rewrite all segments as a single segment with the same records in the
    /// same order. Returns the number of records kept.
    ///
    /// The merged segment and its manifest are written before any old segment
    /// is removed.
    pub fn compact(&mut self) -> Result<usize, StoreError> {
        let records = self.load_mutations()?;
        let mut manifest = IntegrityManifest::default();
        let mut last_segment = self.meta.last_segment;
        if !records.is_empty() {
            last_segment += 1;
            manifest
                .entries
                .push(self.write_segment(last_segment, &records, None)?);
        }

        let stale = std::mem::replace(&mut self.manifest, manifest);
        self.meta.last_segment = last_segment;
        self.meta.segment_count = self.manifest.entries.len() as u32;
        self.save_meta()?;
        self.save_manifest()?;

        for entry in stale.entries {
            let path = self.root.join(SEGMENT_DIR).join(&entry.filename);
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %err, "stale segment not removed");
            }
        }
        tracing::info!(records = records.len(), "mutation store compacted");
        Ok(records.len())
    }

    /// Verify all integrity hashes and the chain links in the manifest.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        let mut prev_hash: Option<String> = None;
        for entry in &self.manifest.entries {
            if entry.prev_hash != prev_hash {
                return Err(StoreError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }

            let data = std::fs::read(self.root.join(SEGMENT_DIR).join(&entry.filename))?;
            let actual_hash = sha256_hex(&data);
            if actual_hash != entry.sha256 {
                return Err(StoreError::IntegrityMismatch {
                    expected: entry.sha256.clone(),
                    actual: actual_hash,
                });
            }

            prev_hash = Some(entry.sha256.clone());
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    fn write_segment(
        &self,
        index: u32,
        records: &[MutationRecord],
        prev_hash: Option<String>,
    ) -> Result<ManifestEntry, StoreError> {
        let filename = segment_name(index);
        let cbor_bytes = cbor_serialize(records)?;
        let compressed = zstd_compress(&cbor_bytes)?;
        std::fs::write(self.root.join(SEGMENT_DIR).join(&filename), &compressed)?;
        Ok(ManifestEntry {
            filename,
            sha256: sha256_hex(&compressed),
            prev_hash,
        })
    }

    /// Only segments listed in the manifest are read; a file that cannot be
    /// vouched for is never replayed.
    fn load_segment(&self, entry: &ManifestEntry) -> Result<Vec<MutationRecord>, StoreError> {
        let compressed = std::fs::read(self.root.join(SEGMENT_DIR).join(&entry.filename))?;
        let actual = sha256_hex(&compressed);
        if actual != entry.sha256 {
            return Err(StoreError::IntegrityMismatch {
                expected: entry.sha256.clone(),
                actual,
            });
        }
        let cbor_bytes = zstd_decompress(&compressed)?;
        cbor_deserialize(&cbor_bytes)
    }

    fn save_meta(&self) -> Result<(), StoreError> {
        let path = self.root.join(META_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.meta)?;
        Ok(())
    }

    fn save_manifest(&self) -> Result<(), StoreError> {
        let path = self.root.join(INTEGRITY_DIR).join(MANIFEST_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.manifest)?;
        Ok(())
    }
}

impl MutationStore for FileStore {
    fn save_mutation(&mut self, record: MutationRecord) -> Result<(), StoreError> {
        self.append_segment(&[record])
    }

    fn load_mutations(&self) -> Result<Vec<MutationRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in &self.manifest.entries {
            records.extend(self.load_segment(entry)?);
        }
        Ok(records)
    }
}

fn segment_name(index: u32) -> String {
    format!("{index:06}.mut.cbor.zst")
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_common::{EditKind, TileCoord};

    const SEED: u64 = 12345;

    fn record(kind: EditKind, gx: i32, gz: i32) -> MutationRecord {
        MutationRecord::applied(kind, TileCoord::new(gx, gz))
    }

    /// Occupy the next segment's filename with a directory so the write fails.
    fn block_next_segment(store: &FileStore) -> PathBuf {
        let blocker = store
            .root()
            .join(SEGMENT_DIR)
            .join(segment_name(store.meta().last_segment + 1));
        std::fs::create_dir(&blocker).unwrap();
        blocker
    }

    #[test]
    fn open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path().join("ledger"), SEED).unwrap();
        assert_eq!(store.meta().segment_count, 0);
        assert_eq!(store.meta().seed, SEED);
        assert!(store.root().join(SEGMENT_DIR).is_dir());
        assert!(store.root().join(INTEGRITY_DIR).is_dir());
        assert!(store.load_mutations().unwrap().is_empty());
    }

    #[test]
    fn saved_mutations_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let expected = vec![
            record(EditKind::Destroy, 2510, 2500),
            MutationRecord::deferred(EditKind::Torch, TileCoord::new(2501, 2499)),
        ];
        {
            let mut store = FileStore::open(&path, SEED).unwrap();
            for r in &expected {
                store.save_mutation(*r).unwrap();
            }
        }
        let store = FileStore::open(&path, SEED).unwrap();
        assert_eq!(store.meta().segment_count, 2);
        assert_eq!(store.load_mutations().unwrap(), expected);
        store.verify_integrity().unwrap();
    }

    #[test]
    fn corruption_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut store = FileStore::open(&path, SEED).unwrap();
        store.save_mutation(record(EditKind::Build, 1, 2)).unwrap();

        let seg = path.join(SEGMENT_DIR).join(segment_name(1));
        let mut data = std::fs::read(&seg).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&seg, &data).unwrap();

        let reopened = FileStore::open(&path, SEED).unwrap();
        assert!(reopened.verify_integrity().is_err());
        assert!(matches!(
            reopened.load_mutations(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn unlisted_segment_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut store = FileStore::open(&path, SEED).unwrap();
        store.save_mutation(record(EditKind::Build, 1, 2)).unwrap();
        std::fs::write(path.join(SEGMENT_DIR).join(segment_name(7)), b"junk").unwrap();

        let reopened = FileStore::open(&path, SEED).unwrap();
        assert_eq!(
            reopened.load_mutations().unwrap(),
            vec![record(EditKind::Build, 1, 2)]
        );
    }

    #[test]
    fn failed_save_leaves_store_loadable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut store = FileStore::open(&path, SEED).unwrap();
        store.save_mutation(record(EditKind::Destroy, 4, 4)).unwrap();

        let blocker = block_next_segment(&store);
        assert!(matches!(
            store.save_mutation(record(EditKind::Torch, 4, 4)),
            Err(StoreError::Io(_))
        ));
        assert_eq!(store.meta().segment_count, 1);
        std::fs::remove_dir(&blocker).unwrap();

        store.save_mutation(record(EditKind::Build, 5, 5)).unwrap();
        let expected = vec![record(EditKind::Destroy, 4, 4), record(EditKind::Build, 5, 5)];
        assert_eq!(store.load_mutations().unwrap(), expected);

        let reopened = FileStore::open(&path, SEED).unwrap();
        reopened.verify_integrity().unwrap();
        assert_eq!(reopened.meta().segment_count, 2);
        assert_eq!(reopened.load_mutations().unwrap(), expected);
    }

    #[test]
    fn seed_mismatch_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let _store = FileStore::open(&path, SEED).unwrap();
        match FileStore::open(&path, SEED + 1) {
            Err(StoreError::SeedMismatch {
                file_seed,
                expected_seed,
            }) => {
                assert_eq!(file_seed, SEED);
                assert_eq!(expected_seed, SEED + 1);
            }
            Err(e) => panic!("expected SeedMismatch, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn schema_mismatch_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let _store = FileStore::open(&path, SEED).unwrap();

        let meta_path = path.join(META_FILE);
        let mut meta: StoreMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.schema_version = 999;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        assert!(matches!(
            FileStore::open(&path, SEED),
            Err(StoreError::SchemaMismatch {
                file_version: 999,
                ..
            })
        ));
    }

    #[test]
    fn compact_preserves_records_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut store = FileStore::open(&path, SEED).unwrap();
        let expected = vec![
            record(EditKind::Destroy, 3, 3),
            record(EditKind::Build, 3, 4),
            record(EditKind::Destroy, 3, 3),
        ];
        for r in &expected {
            store.save_mutation(*r).unwrap();
        }
        assert_eq!(store.compact().unwrap(), 3);
        assert_eq!(store.meta().segment_count, 1);
        assert!(!path.join(SEGMENT_DIR).join(segment_name(1)).exists());
        assert!(!path.join(SEGMENT_DIR).join(segment_name(3)).exists());

        store.save_mutation(record(EditKind::Torch, 9, 9)).unwrap();
        let reopened = FileStore::open(&path, SEED).unwrap();
        reopened.verify_integrity().unwrap();
        let mut all = expected;
        all.push(record(EditKind::Torch, 9, 9));
        assert_eq!(reopened.load_mutations().unwrap(), all);
    }

    #[test]
    fn failed_compaction_keeps_old_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger");
        let mut store = FileStore::open(&path, SEED).unwrap();
        let expected = vec![record(EditKind::Destroy, 1, 1), record(EditKind::Torch, 1, 1)];
        for r in &expected {
            store.save_mutation(*r).unwrap();
        }

        block_next_segment(&store);
        assert!(store.compact().is_err());
        assert_eq!(store.load_mutations().unwrap(), expected);

        let reopened = FileStore::open(&path, SEED).unwrap();
        reopened.verify_integrity().unwrap();
        assert_eq!(reopened.load_mutations().unwrap(), expected);
    }

    #[test]
    fn empty_batch_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(tmp.path().join("ledger"), SEED).unwrap();
        store.append_segment(&[]).unwrap();
        assert_eq!(store.meta().segment_count, 0);
    }
}
