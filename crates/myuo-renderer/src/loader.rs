// loader.rs — art texture cache and loader facade

use std::collections::VecDeque;

use rayon::prelude::*;

use myuo_common::clock::TickSource;
use myuo_common::console::{con_dprintf, con_printf, con_set_developer};
use myuo_common::cvar::{CvarFlags, SharedCvars};
use myuo_common::reader::DataReader;
use myuo_common::store::{ArtStore, StoreResolver, StoreVariant};
use myuo_common::uofiles::{
    IndexEntry, GRAPHIC_MASK_ARCHIVE, GRAPHIC_MASK_CLASSIC, LAND_PIXEL_COUNT, LAND_TILE_SIZE,
    MAX_LAND_DATA_INDEX_COUNT, MAX_STATIC_DATA_INDEX_COUNT, STATIC_INDEX_BIAS,
};

use crate::art::{decode_land, decode_static, StaticArt};
use crate::texture::{ArtTexture, TextureUploader};

// ============================================================
// Lifecycle
// ============================================================

/// Facade lifecycle. The backing store is resolved lazily on first use
/// and re-resolved after a clear (resource-pack hot swap). A failed
/// resolution parks the facade in `NoStore`: every lookup yields "no
/// image" instead of failing loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Unresolved,
    Ready,
    NoStore,
    Cleared,
}

/// Classifies ids that receive the cave edge outline.
pub type CaveClassifier = Box<dyn Fn(u16) -> bool>;

// ============================================================
// ArtLoader
// ============================================================

/// On-demand decoder and cache for the legacy art resources.
///
/// Two independent slot tables (static sprites and land tiles) hold
/// decoded textures keyed by id; slots fill lazily, carry a recency
/// stamp, and are reclaimed by `evict` or `clear`.
///
/// Cache access assumes a single owning thread (the render/update
/// loop): the check-miss/decode/store sequence is not atomic and there
/// is no internal locking.
pub struct ArtLoader {
    resolver: Box<dyn StoreResolver>,
    uploader: Box<dyn TextureUploader>,
    clock: Box<dyn TickSource>,
    cvars: SharedCvars,
    is_cave: CaveClassifier,

    state: LoaderState,
    store: Option<Box<dyn ArtStore>>,
    entries: Vec<IndexEntry>,
    graphic_mask: u16,

    statics: Vec<Option<ArtTexture>>,
    lands: Vec<Option<ArtTexture>>,
    /// Insertion-ordered ids of resident land slots, so the eviction
    /// sweep can walk occupied slots without scanning the whole table.
    used_land_ids: VecDeque<u16>,
}

impl ArtLoader {
    pub fn new(
        resolver: Box<dyn StoreResolver>,
        uploader: Box<dyn TextureUploader>,
        clock: Box<dyn TickSource>,
        cvars: SharedCvars,
        is_cave: CaveClassifier,
    ) -> Self {
        {
            let mut cv = cvars.lock();
            cv.get("developer", "0", CvarFlags::empty());
            cv.get("art_cave_borders", "0", CvarFlags::ARCHIVE);
            cv.get("art_texture_timeout", "3000", CvarFlags::ARCHIVE);
            con_set_developer(cv.variable_value("developer") != 0.0);
        }

        Self {
            resolver,
            uploader,
            clock,
            cvars,
            is_cave,
            state: LoaderState::Unresolved,
            store: None,
            entries: Vec::new(),
            graphic_mask: GRAPHIC_MASK_CLASSIC,
            statics: (0..MAX_STATIC_DATA_INDEX_COUNT).map(|_| None).collect(),
            lands: (0..MAX_LAND_DATA_INDEX_COUNT).map(|_| None).collect(),
            used_land_ids: VecDeque::new(),
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Resolve the backing store up front instead of on the first
    /// texture request.
    pub fn load(&mut self) {
        self.ensure_store();
    }

    fn ensure_store(&mut self) {
        match self.state {
            LoaderState::Ready | LoaderState::NoStore => return,
            LoaderState::Unresolved | LoaderState::Cleared => {}
        }

        let Some((mut store, variant)) = self.resolver.resolve() else {
            self.state = LoaderState::NoStore;
            return;
        };

        match store.entries() {
            Ok(entries) => {
                self.entries = entries;
                self.graphic_mask = match variant {
                    StoreVariant::Archive => GRAPHIC_MASK_ARCHIVE,
                    StoreVariant::Classic => GRAPHIC_MASK_CLASSIC,
                };
                self.store = Some(store);
                self.state = LoaderState::Ready;
            }
            Err(e) => {
                con_printf(&format!("art: couldn't read entry table: {}\n", e));
                self.state = LoaderState::NoStore;
            }
        }
    }

    fn cave_borders_enabled(&self) -> bool {
        self.cvars.lock().variable_value("art_cave_borders") != 0.0
    }

    fn eviction_timeout(&self) -> u64 {
        self.cvars.lock().variable_value("art_texture_timeout").max(0.0) as u64
    }

    // ============================================================
    // Static sprites
    // ============================================================

    /// Get (decoding on first use) the texture for a static sprite id.
    /// Absent, blank, and corrupt assets all yield `None`.
    pub fn get_static_texture(&mut self, id: u16) -> Option<&ArtTexture> {
        self.ensure_store();
        if self.state != LoaderState::Ready {
            return None;
        }

        let idx = id as usize;
        if idx >= self.statics.len() {
            return None;
        }

        if self.statics[idx].is_none() {
            let texture = self.decode_static_texture(id)?;
            self.statics[idx] = Some(texture);
        } else {
            let now = self.clock.ticks();
            if let Some(t) = self.statics[idx].as_mut() {
                t.ticks = now;
            }
        }

        self.statics[idx].as_ref()
    }

    fn decode_static_texture(&mut self, id: u16) -> Option<ArtTexture> {
        let art = self.read_static_art(id)?;
        self.backfill_entry(id, art.width, art.height);

        let now = self.clock.ticks();
        Some(ArtTexture::new(
            self.uploader.as_mut(),
            art.pixels,
            art.width,
            art.height,
            Some(art.bounds),
            now,
        ))
    }

    fn read_static_art(&mut self, id: u16) -> Option<StaticArt> {
        let entry = self.entries.get(id as usize + STATIC_INDEX_BIAS).copied()?;
        if entry.is_absent() {
            return None;
        }

        let store = self.store.as_mut()?;
        let mut reader = match store.read(entry.offset, entry.data_length()) {
            Ok(r) => r,
            Err(e) => {
                con_printf(&format!("art: read failed for static {:#06x}: {}\n", id, e));
                return None;
            }
        };

        let cave = self.cave_borders_enabled() && (self.is_cave)(id);
        let art = decode_static(&mut reader, id, cave);
        if art.is_none() {
            con_dprintf(&format!("art: empty or corrupt static {:#06x}\n", id));
        }
        art
    }

    /// Decode a static sprite to pixels without touching the cache.
    pub fn read_static_pixels(&mut self, id: u16) -> Option<StaticArt> {
        self.ensure_store();
        if self.state != LoaderState::Ready {
            return None;
        }
        self.read_static_art(id)
    }

    /// Logical placement footprint derived from the bitmap size, cached
    /// in the entry table after the first decode. Reads just the record
    /// header when the texture itself was never requested.
    pub fn static_dimensions(&mut self, id: u16) -> Option<(i16, i16)> {
        self.ensure_store();
        if self.state != LoaderState::Ready {
            return None;
        }

        let idx = id as usize + STATIC_INDEX_BIAS;
        let entry = self.entries.get(idx).copied()?;
        if entry.is_absent() {
            return None;
        }

        if entry.width == 0 && entry.height == 0 {
            let store = self.store.as_mut()?;
            let mut reader = store
                .read(entry.offset, entry.data_length().min(8))
                .ok()?;
            reader.skip(4)?;
            let raw_w = reader.read_i16()?;
            let raw_h = reader.read_i16()?;
            self.backfill_entry(id, raw_w as u16, raw_h as u16);
        }

        let entry = self.entries.get(idx)?;
        Some((entry.width, entry.height))
    }

    /// Byte-range info for a static record: (address, size, compressed
    /// size). Used by external tooling that streams raw records.
    pub fn entry_info(&mut self, id: u16) -> Option<(u64, usize, usize)> {
        self.ensure_store();
        let entry = self.entries.get(id as usize + STATIC_INDEX_BIAS)?;
        Some((entry.offset, entry.data_length(), entry.length as usize))
    }

    fn backfill_entry(&mut self, id: u16, raw_width: u16, raw_height: u16) {
        if let Some(entry) = self.entries.get_mut(id as usize + STATIC_INDEX_BIAS) {
            entry.width = ((raw_width as i16) >> 1) - 22;
            entry.height = raw_height as i16 - 44;
        }
    }

    /// Decode a batch of cold static ids in parallel, then upload and
    /// cache them in order. Ids already resident (or with nothing to
    /// decode) are skipped.
    pub fn preload_statics(&mut self, ids: &[u16]) {
        self.ensure_store();
        if self.state != LoaderState::Ready {
            return;
        }

        let cave_enabled = self.cave_borders_enabled();

        // Phase 1: sequential store reads for the cold slots.
        let mut jobs: Vec<(u16, Vec<u8>, bool)> = Vec::new();
        for &id in ids {
            let idx = id as usize;
            if idx >= self.statics.len() || self.statics[idx].is_some() {
                continue;
            }
            let Some(entry) = self.entries.get(idx + STATIC_INDEX_BIAS).copied() else {
                continue;
            };
            if entry.is_absent() {
                continue;
            }
            let Some(store) = self.store.as_mut() else {
                return;
            };
            let Ok(reader) = store.read(entry.offset, entry.data_length()) else {
                continue;
            };
            let cave = cave_enabled && (self.is_cave)(id);
            jobs.push((id, reader.into_inner(), cave));
        }

        // Phase 2: parallel pure decode.
        let decoded: Vec<(u16, Option<StaticArt>)> = jobs
            .into_par_iter()
            .map(|(id, bytes, cave)| {
                let mut reader = DataReader::new(bytes);
                (id, decode_static(&mut reader, id, cave))
            })
            .collect();

        // Phase 3: sequential upload and cache fill.
        for (id, art) in decoded {
            let Some(art) = art else { continue };
            self.backfill_entry(id, art.width, art.height);
            let now = self.clock.ticks();
            let texture = ArtTexture::new(
                self.uploader.as_mut(),
                art.pixels,
                art.width,
                art.height,
                Some(art.bounds),
                now,
            );
            self.statics[id as usize] = Some(texture);
        }
    }

    // ============================================================
    // Land tiles
    // ============================================================

    /// Get (decoding on first use) the texture for a land tile id. An
    /// absent entry still yields a valid fully transparent 44x44
    /// texture; only a missing store or an out-of-range masked id
    /// yields `None`.
    pub fn get_land_texture(&mut self, id: u16) -> Option<&ArtTexture> {
        self.ensure_store();
        if self.state != LoaderState::Ready {
            return None;
        }

        let idx = (id & self.graphic_mask) as usize;
        if idx >= self.lands.len() {
            return None;
        }

        if self.lands[idx].is_none() {
            let texture = self.decode_land_texture(idx)?;
            self.lands[idx] = Some(texture);
            self.used_land_ids.push_back(idx as u16);
        } else {
            let now = self.clock.ticks();
            if let Some(t) = self.lands[idx].as_mut() {
                t.ticks = now;
            }
        }

        self.lands[idx].as_ref()
    }

    fn decode_land_texture(&mut self, index: usize) -> Option<ArtTexture> {
        let pixels = match self.entries.get(index).copied() {
            Some(entry) if !entry.is_absent() => {
                let store = self.store.as_mut()?;
                match store.read(entry.offset, entry.data_length()) {
                    Ok(mut reader) => decode_land(&mut reader).unwrap_or_else(|| {
                        con_dprintf(&format!("art: truncated land {:#06x}\n", index));
                        vec![0u32; LAND_PIXEL_COUNT]
                    }),
                    Err(e) => {
                        con_printf(&format!("art: read failed for land {:#06x}: {}\n", index, e));
                        vec![0u32; LAND_PIXEL_COUNT]
                    }
                }
            }
            // Absent asset: a transparent tile is still a valid result.
            _ => vec![0u32; LAND_PIXEL_COUNT],
        };

        let now = self.clock.ticks();
        Some(ArtTexture::new(
            self.uploader.as_mut(),
            pixels,
            LAND_TILE_SIZE as u16,
            LAND_TILE_SIZE as u16,
            None,
            now,
        ))
    }

    // ============================================================
    // Reclamation
    // ============================================================

    /// Best-effort reclamation hint: free up to `count` slots whose
    /// recency stamp is older than the `art_texture_timeout` cvar.
    /// Statics are swept by linear scan; lands through the recency set.
    pub fn evict(&mut self, count: usize) {
        if count == 0 {
            return;
        }

        let now = self.clock.ticks();
        let threshold = now.saturating_sub(self.eviction_timeout());
        let mut reclaimed = 0usize;

        for slot in self.statics.iter_mut() {
            if reclaimed >= count {
                return;
            }
            if slot.as_ref().is_some_and(|t| t.ticks < threshold) {
                *slot = None;
                reclaimed += 1;
            }
        }

        let mut i = 0;
        while i < self.used_land_ids.len() {
            if reclaimed >= count {
                return;
            }
            let idx = self.used_land_ids[i] as usize;
            let stale = self.lands[idx].as_ref().is_some_and(|t| t.ticks < threshold);
            if stale {
                self.lands[idx] = None;
                self.used_land_ids.remove(i);
                reclaimed += 1;
            } else {
                i += 1;
            }
        }
    }

    /// Free every resident texture in both tables and drop the store
    /// binding. The next lookup re-resolves the backing store from
    /// scratch, which is what resource-pack hot swaps rely on.
    pub fn clear(&mut self) {
        for slot in self.statics.iter_mut() {
            *slot = None;
        }
        for slot in self.lands.iter_mut() {
            *slot = None;
        }
        self.used_land_ids.clear();
        self.entries.clear();
        self.store = None;
        self.state = LoaderState::Cleared;
    }

    /// Resident texture counts: (statics, lands).
    pub fn resident_counts(&self) -> (usize, usize) {
        let statics = self.statics.iter().filter(|s| s.is_some()).count();
        let lands = self.used_land_ids.len();
        (statics, lands)
    }

    /// Print the resident textures and total texel count.
    pub fn texture_list(&self) {
        con_printf("------------------\n");
        let mut texels: u64 = 0;

        for (id, slot) in self.statics.iter().enumerate() {
            if let Some(t) = slot {
                texels += t.width() as u64 * t.height() as u64;
                con_printf(&format!("S {:3} {:3}: {:#06x}\n", t.width(), t.height(), id));
            }
        }
        for &id in &self.used_land_ids {
            if let Some(t) = self.lands[id as usize].as_ref() {
                texels += t.width() as u64 * t.height() as u64;
                con_printf(&format!("L {:3} {:3}: {:#06x}\n", t.width(), t.height(), id));
            }
        }
        con_printf(&format!("Total texel count: {}\n", texels));
    }
}

// ============================================================
// Unit tests
// ============================================================
