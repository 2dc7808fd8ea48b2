// store.rs — indexed art resource stores and resolution policy

use std::io;
use std::path::{Path, PathBuf};

use crate::console::con_printf;
use crate::reader::DataReader;
use crate::uofiles::{IndexEntry, ART_ARCHIVE_FILE, ART_DATA_FILE, ART_INDEX_FILE};

// ============================================================
// Store traits
// ============================================================

/// A backing store that maps numeric asset ids to byte ranges.
///
/// The container formats themselves (archive directory, paired
/// data/index files) live behind this trait; `read` always yields
/// already-decompressed record bytes.
pub trait ArtStore {
    /// Produce the full entry table. Called once at resolution time;
    /// the caller owns (and back-fills) the returned entries.
    fn entries(&mut self) -> io::Result<Vec<IndexEntry>>;

    /// Read `len` record bytes starting at `offset`.
    fn read(&mut self, offset: u64, len: usize) -> io::Result<DataReader>;
}

/// Which install layout a resolved store came from. Decides the land
/// graphic mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVariant {
    /// Single packed archive container.
    Archive,
    /// Classic paired data/index files.
    Classic,
}

/// Constructs concrete stores from files. The container readers are
/// external collaborators; this seam keeps them out of the decode core.
pub trait StoreOpener {
    fn open_archive(&mut self, path: &Path) -> io::Result<Box<dyn ArtStore>>;
    fn open_paired(&mut self, data: &Path, index: &Path) -> io::Result<Box<dyn ArtStore>>;
}

/// Picks and opens a backing store. The loader facade calls this once
/// at startup and again after a full clear (resource-pack hot swap).
pub trait StoreResolver {
    fn resolve(&mut self) -> Option<(Box<dyn ArtStore>, StoreVariant)>;
}

// ============================================================
// FileResolver
// ============================================================

/// Standard install-directory resolution: prefer the archive container
/// when the install is flagged for it and the file exists, otherwise
/// fall back to the classic pair. Missing files are not an error; the
/// facade just stays empty.
pub struct FileResolver {
    dir: PathBuf,
    archive_install: bool,
    opener: Box<dyn StoreOpener>,
}

impl FileResolver {
    pub fn new(dir: impl Into<PathBuf>, archive_install: bool, opener: Box<dyn StoreOpener>) -> Self {
        Self {
            dir: dir.into(),
            archive_install,
            opener,
        }
    }
}

impl StoreResolver for FileResolver {
    fn resolve(&mut self) -> Option<(Box<dyn ArtStore>, StoreVariant)> {
        let archive = self.dir.join(ART_ARCHIVE_FILE);

        if self.archive_install && archive.exists() {
            match self.opener.open_archive(&archive) {
                Ok(store) => {
                    con_printf(&format!("Added {}\n", archive.display()));
                    return Some((store, StoreVariant::Archive));
                }
                Err(e) => {
                    con_printf(&format!("couldn't open {}: {}\n", archive.display(), e));
                }
            }
        }

        let data = self.dir.join(ART_DATA_FILE);
        let index = self.dir.join(ART_INDEX_FILE);

        if data.exists() && index.exists() {
            match self.opener.open_paired(&data, &index) {
                Ok(store) => {
                    con_printf(&format!("Added {}\n", data.display()));
                    return Some((store, StoreVariant::Classic));
                }
                Err(e) => {
                    con_printf(&format!("couldn't open {}: {}\n", data.display(), e));
                }
            }
        }

        con_printf(&format!("no art files found in {}\n", self.dir.display()));
        None
    }
}

// ============================================================
// MemoryStore
// ============================================================

/// In-memory store backed by a flat byte buffer. Used by unit tests and
/// by tools that synthesize records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Vec<IndexEntry>,
    data: Vec<u8>,
}

impl MemoryStore {
    /// An empty store with `index_count` absent entries.
    pub fn new(index_count: usize) -> Self {
        Self {
            entries: vec![IndexEntry::default(); index_count],
            data: Vec::new(),
        }
    }

    /// Append a record and point the entry at `index` to it.
    pub fn put_record(&mut self, index: usize, bytes: &[u8]) {
        let offset = self.data.len() as u64;
        self.entries[index] = IndexEntry::new(offset, bytes.len() as u32, 0);
        self.data.extend_from_slice(bytes);
    }

    pub fn entry(&self, index: usize) -> Option<&IndexEntry> {
        self.entries.get(index)
    }
}

impl ArtStore for MemoryStore {
    fn entries(&mut self) -> io::Result<Vec<IndexEntry>> {
        Ok(self.entries.clone())
    }

    fn read(&mut self, offset: u64, len: usize) -> io::Result<DataReader> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of store")
            })?;
        Ok(DataReader::new(self.data[start..end].to_vec()))
    }
}

/// Resolver that hands out clones of a prepared `MemoryStore`. Keeps
/// resolving after `clear`, which is what the hot-swap path needs.
pub struct MemoryResolver {
    store: MemoryStore,
    variant: StoreVariant,
}

impl MemoryResolver {
    pub fn new(store: MemoryStore, variant: StoreVariant) -> Self {
        Self { store, variant }
    }
}

impl StoreResolver for MemoryResolver {
    fn resolve(&mut self) -> Option<(Box<dyn ArtStore>, StoreVariant)> {
        Some((Box::new(self.store.clone()), self.variant))
    }
}

// ============================================================
// Unit tests
// ============================================================
