//! Content-addressable, deduplicating blob store
//!
//! Objects are keyed by the SHA-256 of their raw bytes. Storing content that is
//! already present only bumps its reference count; the bytes are written once.
//!
//! ## On-disk layout
//!
//! ```text
//! <root>/
//! ├── refs.idx            # reference counts (MessagePack)
//! ├── refs.journal        # count changes since refs.idx was written
//! └── objects/
//!     ├── a3/
//!     │   └── f2e1d4c5…   # header + payload, see format.rs
//!     └── b7/
//!         └── e145a3b2…
//! ```
//!
//! # Thread Safety
//!
//! Mutations (`store`, `release`, `garbage_collect`) serialize on the journal
//! lock. Reference counts sit behind an `RwLock` that is only held for
//! map access, so `retrieve` never waits on another call's disk I/O.
//!
//! ## Reference journal
//!
//! A count change appends one fixed 60-byte record to `refs.journal`:
//!
//! ```text
//! hash (32) | count u64 | size u64 | stored_bytes u64 | crc32 u32
//! ```
//!
//! Records carry absolute values, so replaying one twice is harmless. A count
//! of zero removes the entry. Once the journal holds
//! `index_compaction_records` records it is folded into `refs.idx` and
//! truncated. Open replays whatever the journal holds and folds it.

use crate::codec::{codec_for, Algorithm, BlobCodec, IdentityCodec, ZstdCodec};
use crate::format::{ObjectHeader, OBJECT_HEADER_SIZE};
use byteorder::{ByteOrder, LittleEndian};
use framestore_core::{ContentHash, ContentReference, Error, Result};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reference-count index file name
pub const REFS_FILE_NAME: &str = "refs.idx";
/// Reference journal file name
pub const JOURNAL_FILE_NAME: &str = "refs.journal";
/// Object directory name
pub const OBJECTS_DIR_NAME: &str = "objects";

const REFS_FORMAT_VERSION: u32 = 1;
const TMP_SUFFIX: &str = ".tmp";
const JOURNAL_RECORD_SIZE: usize = 60;

// ============================================================================
// Configuration
// ============================================================================

/// Tuning knobs for the blob store
#[derive(Debug, Clone)]
pub struct CasConfig {
    /// Payloads larger than this are compressed (when it helps)
    pub compression_threshold: usize,
    /// Objects at least this large are read through a memory map
    pub mmap_threshold: usize,
    /// zstd level for compressed payloads
    pub compression_level: i32,
    /// fsync object, journal and index files after writing
    pub sync_writes: bool,
    /// Journal records accumulated before they are folded into `refs.idx`
    pub index_compaction_records: usize,
}

impl Default for CasConfig {
    fn default() -> Self {
        CasConfig {
            compression_threshold: 1024,
            mmap_threshold: 64 * 1024,
            compression_level: 3,
            sync_writes: true,
            index_compaction_records: 1024,
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Point-in-time statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CasStats {
    /// Distinct stored objects
    pub unique_objects: usize,
    /// Sum of all reference counts
    pub total_references: u64,
    /// Bytes callers have stored, counting duplicates
    pub logical_bytes: u64,
    /// Bytes occupied by object files
    pub stored_bytes: u64,
    /// `1 - unique_objects / total_references`, 0 when empty
    pub deduplication_ratio: f64,
}

/// Outcome of a garbage-collection sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Untracked object files deleted
    pub removed_objects: usize,
    /// Bytes freed by those deletions
    pub reclaimed_bytes: u64,
    /// Leftover temp files deleted
    pub removed_temp_files: usize,
    /// Tracked entries dropped because their object file was missing
    pub dropped_references: usize,
}

// ============================================================================
// Reference index
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RefEntry {
    count: u64,
    size: u64,
    stored_bytes: u64,
}

#[derive(Serialize, Deserialize)]
struct RefIndexFile {
    version: u32,
    entries: Vec<(ContentHash, RefEntry)>,
}

/// Append handle for `refs.journal`. Holding its lock is the writer lock.
struct Journal {
    file: File,
    records: usize,
}

impl Journal {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let records = file.metadata()?.len() as usize / JOURNAL_RECORD_SIZE;
        Ok(Journal { file, records })
    }

    /// Offset just past the last whole record.
    fn good_len(&self) -> u64 {
        (self.records * JOURNAL_RECORD_SIZE) as u64
    }
}

fn encode_record(hash: &ContentHash, entry: &RefEntry) -> [u8; JOURNAL_RECORD_SIZE] {
    let mut buf = [0u8; JOURNAL_RECORD_SIZE];
    buf[0..32].copy_from_slice(hash.as_bytes());
    LittleEndian::write_u64(&mut buf[32..40], entry.count);
    LittleEndian::write_u64(&mut buf[40..48], entry.size);
    LittleEndian::write_u64(&mut buf[48..56], entry.stored_bytes);
    let crc = crc32fast::hash(&buf[..56]);
    LittleEndian::write_u32(&mut buf[56..60], crc);
    buf
}

/// Apply journal records to `refs`; returns how many were applied.
///
/// Stops at the first record that fails its checksum or is cut short.
fn replay_journal(bytes: &[u8], refs: &mut FxHashMap<ContentHash, RefEntry>) -> usize {
    let mut applied = 0;
    for record in bytes.chunks(JOURNAL_RECORD_SIZE) {
        if record.len() < JOURNAL_RECORD_SIZE
            || crc32fast::hash(&record[..56]) != LittleEndian::read_u32(&record[56..60])
        {
            warn!(
                target: "framestore::cas",
                applied,
                "Ignoring torn reference journal tail"
            );
            break;
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&record[0..32]);
        let hash = ContentHash::from_bytes(hash);
        let entry = RefEntry {
            count: LittleEndian::read_u64(&record[32..40]),
            size: LittleEndian::read_u64(&record[40..48]),
            stored_bytes: LittleEndian::read_u64(&record[48..56]),
        };
        if entry.count == 0 {
            refs.remove(&hash);
        } else {
            refs.insert(hash, entry);
        }
        applied += 1;
    }
    applied
}

// ============================================================================
// ContentAddressableStore
// ============================================================================

/// Hash-keyed blob store with persisted reference counts
pub struct ContentAddressableStore {
    root: PathBuf,
    objects_dir: PathBuf,
    index_path: PathBuf,
    config: CasConfig,
    codec: Box<dyn BlobCodec>,
    refs: RwLock<FxHashMap<ContentHash, RefEntry>>,
    journal: Mutex<Journal>,
}

impl ContentAddressableStore {
    /// Open (or create) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// `CorruptedContent` if the reference index exists but cannot be decoded.
    pub fn open(root: impl Into<PathBuf>, config: CasConfig) -> Result<Self> {
        let root = root.into();
        let objects_dir = root.join(OBJECTS_DIR_NAME);
        fs::create_dir_all(&objects_dir)?;
        let index_path = root.join(REFS_FILE_NAME);
        let journal_path = root.join(JOURNAL_FILE_NAME);

        let mut refs = match fs::read(&index_path) {
            Ok(bytes) => decode_index(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => FxHashMap::default(),
            Err(e) => return Err(e.into()),
        };
        let replayed = match fs::read(&journal_path) {
            Ok(bytes) if !bytes.is_empty() => {
                let applied = replay_journal(&bytes, &mut refs);
                write_index(&index_path, &refs, config.sync_writes)?;
                let journal = OpenOptions::new().write(true).open(&journal_path)?;
                journal.set_len(0)?;
                applied
            }
            Ok(_) => 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let journal = Journal::open(&journal_path)?;

        debug!(
            target: "framestore::cas",
            root = %root.display(),
            objects = refs.len(),
            replayed,
            "Opened content store"
        );

        let codec: Box<dyn BlobCodec> = if config.compression_threshold == usize::MAX {
            Box::new(IdentityCodec)
        } else {
            Box::new(ZstdCodec::new(config.compression_level))
        };

        Ok(ContentAddressableStore {
            root,
            objects_dir,
            index_path,
            config,
            codec,
            refs: RwLock::new(refs),
            journal: Mutex::new(journal),
        })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `content`, deduplicating by hash.
    ///
    /// Known content increments its reference count without writing bytes.
    pub fn store(&self, content: &[u8]) -> Result<ContentReference> {
        let hash = ContentHash::of(content);
        let mut journal = self.journal.lock();

        let existing = self.refs.read().get(&hash).copied();
        let entry = match existing {
            Some(mut entry) => {
                entry.count += 1;
                entry
            }
            None => {
                let stored_bytes = self.write_object(&hash, content)?;
                RefEntry {
                    count: 1,
                    size: content.len() as u64,
                    stored_bytes,
                }
            }
        };

        self.refs.write().insert(hash, entry);
        if let Err(e) = self.record(&mut journal, &hash, &entry) {
            // Roll the in-memory count back so memory never runs ahead of disk.
            let mut refs = self.refs.write();
            match existing {
                Some(prev) => {
                    refs.insert(hash, prev);
                }
                None => {
                    refs.remove(&hash);
                }
            }
            return Err(e);
        }

        debug!(
            target: "framestore::cas",
            hash = %hash,
            count = entry.count,
            deduplicated = existing.is_some(),
            "Stored content"
        );

        Ok(ContentReference {
            hash,
            size: entry.size,
            reference_count: entry.count,
        })
    }

    /// Read back the exact bytes behind `reference`.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the hash is not tracked or its object file is gone
    /// - `CorruptedContent` on header, checksum or digest mismatch
    /// - `DecompressionFailed` when the codec rejects the payload
    pub fn retrieve(&self, reference: &ContentReference) -> Result<Vec<u8>> {
        let hash = reference.hash;
        let expected_size = self
            .refs
            .read()
            .get(&hash)
            .map(|e| e.size)
            .ok_or_else(|| Error::not_found(format!("content {}", hash)))?;
        let path = self.object_path(&hash);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::not_found(format!("object file for {}", hash)));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len() as usize;

        let content = if len >= self.config.mmap_threshold {
            // SAFETY: object files are written once via rename and never
            // modified in place; deletion does not invalidate an existing map.
            let mmap = unsafe { memmap2::Mmap::map(&file)? };
            decode_object(&mmap, expected_size)?
        } else {
            let bytes = fs::read(&path)?;
            decode_object(&bytes, expected_size)?
        };

        if ContentHash::of(&content) != hash {
            return Err(Error::corrupted(format!(
                "digest mismatch for object {}",
                hash
            )));
        }
        Ok(content)
    }

    /// Read back content as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Everything `retrieve` returns, plus `EncodingFailed` for non-UTF-8 bytes.
    pub fn retrieve_string(&self, reference: &ContentReference) -> Result<String> {
        let bytes = self.retrieve(reference)?;
        String::from_utf8(bytes).map_err(|e| Error::encoding(e.to_string()))
    }

    /// Drop one reference. Deletes the object when the count reaches zero.
    ///
    /// Returns the remaining count.
    pub fn release(&self, reference: &ContentReference) -> Result<u64> {
        let hash = reference.hash;
        let mut journal = self.journal.lock();

        let previous = self
            .refs
            .read()
            .get(&hash)
            .copied()
            .ok_or_else(|| Error::not_found(format!("content {}", hash)))?;

        let remaining = previous.count.saturating_sub(1);
        let updated = RefEntry {
            count: remaining,
            ..previous
        };
        {
            let mut refs = self.refs.write();
            if remaining == 0 {
                refs.remove(&hash);
            } else {
                refs.insert(hash, updated);
            }
        }

        if let Err(e) = self.record(&mut journal, &hash, &updated) {
            self.refs.write().insert(hash, previous);
            return Err(e);
        }

        if remaining == 0 {
            match fs::remove_file(self.object_path(&hash)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    // Index already forgot the object; the next GC sweep reclaims it.
                    warn!(
                        target: "framestore::cas",
                        hash = %hash,
                        error = %e,
                        "Failed to delete released object"
                    );
                }
            }
        }

        debug!(target: "framestore::cas", hash = %hash, remaining, "Released content");
        Ok(remaining)
    }

    /// Sweep untracked object files and temp files, and forget tracked
    /// entries whose file has disappeared.
    pub fn garbage_collect(&self) -> Result<GcReport> {
        let mut journal = self.journal.lock();
        let mut report = GcReport::default();

        for shard in fs::read_dir(&self.objects_dir)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            let prefix = shard.file_name().to_string_lossy().into_owned();
            for object in fs::read_dir(shard.path())? {
                let object = object?;
                let name = object.file_name().to_string_lossy().into_owned();
                let path = object.path();

                if name.ends_with(TMP_SUFFIX) {
                    fs::remove_file(&path)?;
                    report.removed_temp_files += 1;
                    continue;
                }

                let tracked = ContentHash::from_hex(&format!("{}{}", prefix, name))
                    .map(|h| self.refs.read().contains_key(&h))
                    .unwrap_or(false);
                if !tracked {
                    let size = object.metadata().map(|m| m.len()).unwrap_or(0);
                    fs::remove_file(&path)?;
                    report.removed_objects += 1;
                    report.reclaimed_bytes += size;
                }
            }
        }

        let missing: Vec<ContentHash> = self
            .refs
            .read()
            .keys()
            .filter(|h| !self.object_path(h).exists())
            .copied()
            .collect();
        if !missing.is_empty() {
            let mut refs = self.refs.write();
            for hash in &missing {
                warn!(
                    target: "framestore::cas",
                    hash = %hash,
                    "Dropping reference to missing object"
                );
                refs.remove(hash);
            }
            report.dropped_references = missing.len();
        }
        if report.dropped_references > 0 {
            self.fold_journal(&mut journal)?;
        }

        debug!(
            target: "framestore::cas",
            removed = report.removed_objects,
            reclaimed = report.reclaimed_bytes,
            "Garbage collection finished"
        );
        Ok(report)
    }

    /// Whether `hash` is tracked
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.refs.read().contains_key(hash)
    }

    /// Current reference count (0 if unknown)
    pub fn reference_count(&self, hash: &ContentHash) -> u64 {
        self.refs.read().get(hash).map(|e| e.count).unwrap_or(0)
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> CasStats {
        let refs = self.refs.read();
        let unique_objects = refs.len();
        let total_references: u64 = refs.values().map(|e| e.count).sum();
        let logical_bytes = refs.values().map(|e| e.size * e.count).sum();
        let stored_bytes = refs.values().map(|e| e.stored_bytes).sum();
        let deduplication_ratio = if total_references == 0 {
            0.0
        } else {
            1.0 - unique_objects as f64 / total_references as f64
        };
        CasStats {
            unique_objects,
            total_references,
            logical_bytes,
            stored_bytes,
            deduplication_ratio,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn object_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Encode and write one object; returns bytes written.
    fn write_object(&self, hash: &ContentHash, content: &[u8]) -> Result<u64> {
        let (payload, algorithm) = if content.len() > self.config.compression_threshold {
            let compressed = self.codec.encode(content)?;
            if compressed.len() < content.len() {
                (compressed, self.codec.algorithm())
            } else {
                (content.to_vec(), Algorithm::Identity)
            }
        } else {
            (content.to_vec(), Algorithm::Identity)
        };

        let header = ObjectHeader::for_payload(content.len(), &payload, algorithm);
        let path = self.object_path(hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_file_name(format!(
            "{}{}",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            TMP_SUFFIX
        ));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&header.to_bytes())?;
            file.write_all(&payload)?;
            if self.config.sync_writes {
                file.sync_data()?;
            }
        }
        fs::rename(&tmp, &path)?;
        Ok((OBJECT_HEADER_SIZE + payload.len()) as u64)
    }

    /// Append one count change to the journal, folding it into the index
    /// once it is long enough.
    fn record(&self, journal: &mut Journal, hash: &ContentHash, entry: &RefEntry) -> Result<()> {
        let bytes = encode_record(hash, entry);
        let written = journal.file.write_all(&bytes).and_then(|()| {
            if self.config.sync_writes {
                journal.file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            // Cut a partial record so the next append starts on a boundary.
            if let Err(trunc) = journal.file.set_len(journal.good_len()) {
                warn!(target: "framestore::cas", error = %trunc, "Failed to trim reference journal");
            }
            return Err(e.into());
        }
        journal.records += 1;

        if journal.records >= self.config.index_compaction_records {
            if let Err(e) = self.fold_journal(journal) {
                // The journal still holds every change; folding retries next time.
                warn!(target: "framestore::cas", error = %e, "Failed to fold reference journal");
            }
        }
        Ok(())
    }

    /// Rewrite `refs.idx` from memory and empty the journal.
    fn fold_journal(&self, journal: &mut Journal) -> Result<()> {
        write_index(&self.index_path, &self.refs.read(), self.config.sync_writes)?;
        journal.file.set_len(0)?;
        debug!(
            target: "framestore::cas",
            folded = journal.records,
            "Folded reference journal"
        );
        journal.records = 0;
        Ok(())
    }
}

fn write_index(path: &Path, refs: &FxHashMap<ContentHash, RefEntry>, sync: bool) -> Result<()> {
    let file = RefIndexFile {
        version: REFS_FORMAT_VERSION,
        entries: refs.iter().map(|(h, e)| (*h, *e)).collect(),
    };
    let bytes = rmp_serde::to_vec(&file).map_err(|e| Error::encoding(e.to_string()))?;
    let tmp = path.with_extension("idx.tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(&bytes)?;
        if sync {
            f.sync_data()?;
        }
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn decode_index(bytes: &[u8]) -> Result<FxHashMap<ContentHash, RefEntry>> {
    let file: RefIndexFile = rmp_serde::from_slice(bytes)
        .map_err(|e| Error::corrupted(format!("reference index: {}", e)))?;
    if file.version != REFS_FORMAT_VERSION {
        return Err(Error::corrupted(format!(
            "unsupported reference index version {}",
            file.version
        )));
    }
    Ok(file.entries.into_iter().collect())
}

/// Decode an object file, checking its declared size against the size the
/// reference index recorded before anything is allocated for it.
fn decode_object(bytes: &[u8], expected_size: u64) -> Result<Vec<u8>> {
    let header = ObjectHeader::parse(bytes)?;
    if header.original_size != expected_size {
        return Err(Error::corrupted(format!(
            "object header claims {} bytes, index recorded {}",
            header.original_size, expected_size
        )));
    }
    let payload = header.payload(bytes)?;
    let codec = codec_for(header.algorithm);
    Ok(codec.decode(payload, header.original_size as usize)?)
}
