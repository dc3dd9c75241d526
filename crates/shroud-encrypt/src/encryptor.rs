//! Random-access self-encryptor.
//!
//! An item is held as committed chunks (described by the current data map)
//! overlaid with uncommitted writes. Uncommitted bytes live in four places,
//! newest last:
//!
//! - staged runs, buffered data moved to the store when the queue fills
//! - two head buffers covering `[0, 2 * chunk_size)`, seeded from committed
//!   data on the first mutation
//! - the main queue, one contiguous run at or beyond the head region
//! - the sequencer, for runs that do not touch the queue
//!
//! A commit re-lays out the whole item: the chunk sizes depend on a digest
//! of the full content, so any change may move every boundary. Chunks whose
//! bytes did not change keep their names and are not stored again.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use shroud_core::crypto::DIGEST_SIZE;
use shroud_core::{ChunkName, PreHash};
use shroud_store::{Cache, CacheConfig, CacheStats, ChunkStore};
use tracing::{debug, error, trace, warn};

use crate::blocks::BlockDigests;
use crate::buffer::ByteBuffer;
use crate::compression::{self, CompressionMode};
use crate::config::EncryptorConfig;
use crate::data_map::{ChunkDescriptor, CompressionKind, DataMap, EncodingFlags};
use crate::sequencer::Sequencer;
use crate::sizer::ChunkSizer;
use crate::transform::{neighbours, ChunkTransform};
use crate::EncryptError;

/// Bytes most recently fetched ahead of a small read.
#[derive(Default)]
struct ReadAhead {
    start: u64,
    data: Bytes,
}

impl ReadAhead {
    fn covers(&self, position: u64, len: usize) -> bool {
        !self.data.is_empty()
            && position >= self.start
            && position + len as u64 <= self.start + self.data.len() as u64
    }
}

/// Everything guarded by the engine lock.
struct State {
    data_map: DataMap,
    /// Committed bytes below this offset are still part of the item
    base_len: u64,
    /// Disjoint runs keyed by item offset, all at or beyond the head region
    staged: BTreeMap<u64, ChunkDescriptor>,
    head: [ByteBuffer; 2],
    head_loaded: bool,
    queue: ByteBuffer,
    queue_start: u64,
    sequencer: Sequencer,
    logical_size: u64,
    /// Length set by a truncate; beyond `logical_size` it reads as zeros
    truncated_size: u64,
    dirty: bool,
    blocks: BlockDigests,
}

impl State {
    fn new(data_map: DataMap, blocks: BlockDigests) -> Self {
        let total = data_map.total_size;
        Self {
            data_map,
            base_len: total,
            staged: BTreeMap::new(),
            head: [ByteBuffer::new(), ByteBuffer::new()],
            head_loaded: false,
            queue: ByteBuffer::new(),
            queue_start: 0,
            sequencer: Sequencer::new(),
            logical_size: total,
            truncated_size: total,
            dirty: false,
            blocks,
        }
    }

    fn size(&self) -> u64 {
        self.logical_size.max(self.truncated_size)
    }

    fn buffered_bytes(&self) -> usize {
        self.queue.len() + self.sequencer.buffered_bytes()
    }

    fn queue_end(&self) -> u64 {
        self.queue_start + self.queue.len() as u64
    }

    fn staged_end(&self) -> u64 {
        self.staged
            .iter()
            .next_back()
            .map_or(0, |(start, run)| start + run.pre_size as u64)
    }

    fn overlaps_staged(&self, start: u64, end: u64) -> bool {
        self.staged
            .range(..end)
            .next_back()
            .map_or(false, |(run_start, run)| run_start + run.pre_size as u64 > start)
    }

    /// Replaces the committed map and drops every uncommitted byte.
    fn reset(&mut self, data_map: DataMap, blocks: BlockDigests) {
        *self = Self::new(data_map, blocks);
    }

    /// Places `data` at `position`, which is at or beyond the head region.
    fn buffer_tail(&mut self, position: u64, data: &[u8]) {
        let end = position + data.len() as u64;
        if self.queue.is_empty() {
            self.queue_start = position;
            self.queue.extend_from_slice(data);
        } else if position <= self.queue_end() && end >= self.queue_start {
            if position >= self.queue_start {
                self.queue
                    .write_at((position - self.queue_start) as usize, data);
            } else {
                let mut joined = ByteBuffer::from(data);
                if self.queue_end() > end {
                    joined.extend_from_slice(&self.queue[(end - self.queue_start) as usize..]);
                }
                self.queue = joined;
                self.queue_start = position;
            }
        } else {
            self.sequencer.add(position, data);
            return;
        }
        self.absorb_touching_spans();
    }

    /// Moves sequencer spans that overlap or abut the queue into it.
    ///
    /// The queue holds the newer bytes wherever the two overlap.
    fn absorb_touching_spans(&mut self) {
        loop {
            let search_start = self.queue_start.saturating_sub(1);
            let search_len = self.queue_end() + 1 - search_start;
            let Some((start, _)) = self.sequencer.peek(search_len, search_start) else {
                return;
            };
            let Some(span) = self.sequencer.get(start) else {
                return;
            };
            let span_end = start + span.len() as u64;
            if start < self.queue_start {
                let mut joined = span;
                joined.write_at((self.queue_start - start) as usize, &self.queue);
                self.queue = joined;
                self.queue_start = start;
            } else if span_end > self.queue_end() {
                let tail = &span[(self.queue_end() - start) as usize..];
                self.queue.extend_from_slice(tail);
            }
        }
    }

    /// Drops every buffered byte at or beyond `position`.
    ///
    /// Staged runs must already end at or before `position`.
    fn cut(&mut self, position: u64, chunk_size: u64) {
        for (k, head) in self.head.iter_mut().enumerate() {
            let start = k as u64 * chunk_size;
            head.truncate(position.saturating_sub(start).min(chunk_size) as usize);
        }
        if position <= self.queue_start {
            self.queue.clear();
        } else {
            self.queue.truncate((position - self.queue_start) as usize);
        }
        self.sequencer.truncate(position);
        self.base_len = self.base_len.min(position);
        self.logical_size = self.logical_size.min(position);
    }
}

/// Copies the part of `src` (starting at item offset `src_start`) that
/// falls inside `dst` (starting at item offset `dst_start`).
fn overlay(dst: &mut [u8], dst_start: u64, src: &[u8], src_start: u64) {
    let start = dst_start.max(src_start);
    let end = (dst_start + dst.len() as u64).min(src_start + src.len() as u64);
    if start >= end {
        return;
    }
    dst[(start - dst_start) as usize..(end - dst_start) as usize]
        .copy_from_slice(&src[(start - src_start) as usize..(end - src_start) as usize]);
}

/// Reader over the current item content.
///
/// Keeps the last committed chunk and the last staged run it decoded, so a
/// pass that moves forward through the item decodes each of them once even
/// when neither fits the read cache.
struct Cursor<'a> {
    engine: &'a SelfEncryptor,
    state: &'a State,
    offsets: Vec<u64>,
    chunk: Option<(usize, Bytes)>,
    run: Option<(u64, Bytes)>,
}

impl<'a> Cursor<'a> {
    fn new(engine: &'a SelfEncryptor, state: &'a State) -> Self {
        Self {
            engine,
            state,
            offsets: state.data_map.chunk_offsets(),
            chunk: None,
            run: None,
        }
    }

    /// Fills `buf` with the item bytes at `position`: committed data
    /// overlaid with every uncommitted layer.
    fn read(&mut self, position: u64, buf: &mut [u8]) -> Result<(), EncryptError> {
        buf.fill(0);
        let end = position + buf.len() as u64;
        let committed_end = end.min(self.state.base_len);
        if position < committed_end {
            self.read_committed(position, &mut buf[..(committed_end - position) as usize])?;
        }
        self.read_staged(position, buf)?;

        let state = self.state;
        let chunk_size = self.engine.config.chunk_size as u64;
        for (k, head) in state.head.iter().enumerate() {
            overlay(buf, position, head, k as u64 * chunk_size);
        }
        overlay(buf, position, &state.queue, state.queue_start);
        for (start, span) in state.sequencer.overlapping(position, buf.len() as u64) {
            overlay(buf, position, span, start);
        }
        Ok(())
    }

    fn read_committed(&mut self, position: u64, buf: &mut [u8]) -> Result<(), EncryptError> {
        let state = self.state;
        let map = &state.data_map;
        if map.is_inline() {
            if let Some(content) = &map.content {
                overlay(buf, position, content, 0);
            }
            return Ok(());
        }

        let end = position + buf.len() as u64;
        let mut index = self.offsets.partition_point(|&start| start <= position).saturating_sub(1);
        while index < self.offsets.len() && self.offsets[index] < end {
            let plaintext = match &self.chunk {
                Some((cached, bytes)) if *cached == index => bytes.clone(),
                _ => {
                    let bytes = self.engine.chunk_plaintext(map, index)?;
                    self.chunk = Some((index, bytes.clone()));
                    bytes
                }
            };
            overlay(buf, position, &plaintext, self.offsets[index]);
            index += 1;
        }
        Ok(())
    }

    fn read_staged(&mut self, position: u64, buf: &mut [u8]) -> Result<(), EncryptError> {
        let state = self.state;
        let staged = &state.staged;
        if staged.is_empty() {
            return Ok(());
        }
        let end = position + buf.len() as u64;
        let first = staged
            .range(..=position)
            .next_back()
            .map_or(position, |(start, _)| *start);
        for (start, run) in staged.range(first..end) {
            if start + run.pre_size as u64 <= position {
                continue;
            }
            let plaintext = match &self.run {
                Some((cached, bytes)) if cached == start => bytes.clone(),
                _ => {
                    let bytes = self.engine.staged_plaintext(run)?;
                    self.run = Some((*start, bytes.clone()));
                    bytes
                }
            };
            overlay(buf, position, &plaintext, *start);
        }
        Ok(())
    }
}

/// Self-encrypting, random-access view of one item.
///
/// Reads take a shared lock; writes, truncation, commits and deletion take
/// it exclusively. Writes become visible to reads immediately and reach
/// the data map on [`flush`](Self::flush) or when the engine is dropped.
/// When buffered data exceeds the queue capacity it is staged in the chunk
/// store, encrypted under its own hash, until the next commit replaces it
/// with the item's real chunks.
pub struct SelfEncryptor {
    store: Arc<dyn ChunkStore>,
    config: EncryptorConfig,
    sizer: ChunkSizer,
    cache: Cache,
    read_ahead: Mutex<ReadAhead>,
    state: RwLock<State>,
    name_hint: Option<PathBuf>,
}

impl SelfEncryptor {
    /// Engine over a new, empty item.
    pub fn new(store: Arc<dyn ChunkStore>, config: EncryptorConfig) -> Result<Self, EncryptError> {
        let flags = EncodingFlags::with_hash(config.hash_kind);
        Self::open(store, DataMap::empty(flags), config)
    }

    /// Engine over the item described by `data_map`.
    pub fn open(
        store: Arc<dyn ChunkStore>,
        data_map: DataMap,
        config: EncryptorConfig,
    ) -> Result<Self, EncryptError> {
        config.validate()?;
        data_map.validate()?;
        let blocks = BlockDigests::new(config.chunk_size, data_map.total_size);
        Ok(Self {
            store,
            sizer: ChunkSizer::new(config.chunk_size, config.max_inline_size),
            cache: Cache::new(CacheConfig {
                max_bytes: config.read_cache_bytes,
            }),
            read_ahead: Mutex::new(ReadAhead::default()),
            state: RwLock::new(State::new(data_map, blocks)),
            name_hint: None,
            config,
        })
    }

    /// Sets the item name used to skip compression of already-compressed formats.
    pub fn with_name_hint(mut self, name: impl Into<PathBuf>) -> Self {
        self.name_hint = Some(name.into());
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EncryptorConfig {
        &self.config
    }

    /// Item length, including any zero extension from [`truncate`](Self::truncate).
    pub fn size(&self) -> u64 {
        self.state.read().size()
    }

    /// True if there are changes not yet committed.
    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    /// Copy of the last committed data map.
    pub fn data_map(&self) -> DataMap {
        self.state.read().data_map.clone()
    }

    /// Commits and hands the data map over.
    pub fn into_data_map(mut self) -> Result<DataMap, EncryptError> {
        self.flush()?;
        Ok(std::mem::take(&mut self.state.get_mut().data_map))
    }

    /// Statistics of the decoded-chunk cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Writes `data` at `position`, extending the item if needed.
    pub fn write(&self, position: u64, data: &[u8]) -> Result<(), EncryptError> {
        if data.is_empty() {
            return Ok(());
        }
        let end = position.checked_add(data.len() as u64).ok_or_else(|| {
            EncryptError::InvalidArgument(format!("write at {position} overflows the item length"))
        })?;

        let mut state = self.state.write();
        self.clear_read_ahead();
        self.load_head(&mut state)?;

        let chunk_size = self.config.chunk_size as u64;
        let head_len = self.config.head_len();
        for (k, head) in state.head.iter_mut().enumerate() {
            let start = k as u64 * chunk_size;
            let from = position.max(start);
            let to = end.min(start + chunk_size);
            if from < to {
                let src = &data[(from - position) as usize..(to - position) as usize];
                head.write_at((from - start) as usize, src);
            }
        }
        if end > head_len {
            let from = position.max(head_len);
            state.buffer_tail(from, &data[(from - position) as usize..]);
        }

        state.logical_size = state.logical_size.max(end);
        let size = state.size();
        state.blocks.resize(size);
        state.blocks.invalidate(position, end);
        state.dirty = true;
        trace!(position, len = data.len(), "Buffered write");

        if state.buffered_bytes() > self.config.queue_capacity {
            self.stage(&mut state)?;
        }
        Ok(())
    }

    /// Reads `length` bytes at `position`.
    pub fn read(&self, position: u64, length: usize) -> Result<Vec<u8>, EncryptError> {
        let mut buf = vec![0u8; length];
        self.read_into(position, &mut buf)?;
        Ok(buf)
    }

    /// Fills `buf` with the bytes at `position`.
    ///
    /// The whole range must lie inside the item.
    pub fn read_into(&self, position: u64, buf: &mut [u8]) -> Result<(), EncryptError> {
        let state = self.state.read();
        let size = state.size();
        let end = position.checked_add(buf.len() as u64);
        if end.map_or(true, |end| end > size) {
            return Err(EncryptError::InvalidArgument(format!(
                "read of {} bytes at {position} is past the end of a {size}-byte item",
                buf.len()
            )));
        }
        if buf.is_empty() {
            return Ok(());
        }

        {
            let ahead = self.read_ahead.lock();
            if ahead.covers(position, buf.len()) {
                let offset = (position - ahead.start) as usize;
                buf.copy_from_slice(&ahead.data[offset..offset + buf.len()]);
                return Ok(());
            }
        }

        let mut cursor = Cursor::new(self, &state);
        if self.config.read_ahead_bytes > buf.len() {
            let window_end = size.min(position.saturating_add(self.config.read_ahead_bytes as u64));
            let mut window = vec![0u8; (window_end - position) as usize];
            cursor.read(position, &mut window)?;
            buf.copy_from_slice(&window[..buf.len()]);
            *self.read_ahead.lock() = ReadAhead {
                start: position,
                data: Bytes::from(window),
            };
        } else {
            cursor.read(position, buf)?;
        }
        Ok(())
    }

    /// Sets the item length to `position`.
    ///
    /// Shrinking drops the bytes beyond `position`. Growing extends the
    /// item with zeros. Cutting into staged data commits first.
    pub fn truncate(&self, position: u64) -> Result<(), EncryptError> {
        let mut state = self.state.write();
        let size = state.size();
        if position == size {
            return Ok(());
        }
        self.clear_read_ahead();
        if position < size {
            if state.staged_end() > position {
                self.commit(&mut state)?;
            }
            state.cut(position, self.config.chunk_size as u64);
        }
        state.truncated_size = position;
        state.blocks.resize(position);
        state.dirty = true;
        debug!(from = size, to = position, "Truncated item");
        Ok(())
    }

    /// Commits every buffered change to the chunk store.
    ///
    /// On failure the buffered data is kept and the call can be retried.
    pub fn flush(&self) -> Result<(), EncryptError> {
        let mut state = self.state.write();
        self.commit(&mut state)
    }

    /// Deletes every chunk of the committed map and empties the item.
    ///
    /// Every delete is attempted. If any fails, the first error is returned
    /// and the engine keeps its current state.
    pub fn delete_all_chunks(&self) -> Result<(), EncryptError> {
        let mut state = self.state.write();
        self.clear_read_ahead();

        let mut first_error = None;
        for chunk in state.data_map.chunks.iter().chain(state.staged.values()) {
            self.cache.remove(&chunk.hash);
            if let Err(e) = self.store.delete(&chunk.hash) {
                warn!(chunk = %chunk.hash, error = %e, "Failed to delete chunk");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        let count = state.data_map.chunks.len() + state.staged.len();
        state.reset(
            DataMap::empty(EncodingFlags::with_hash(self.config.hash_kind)),
            BlockDigests::new(self.config.chunk_size, 0),
        );
        debug!(chunks = count, "Deleted all chunks");
        Ok(())
    }

    fn clear_read_ahead(&self) {
        *self.read_ahead.lock() = ReadAhead::default();
    }

    /// Seeds the head buffers from committed data.
    fn load_head(&self, state: &mut State) -> Result<(), EncryptError> {
        if state.head_loaded {
            return Ok(());
        }
        let len = state.base_len.min(self.config.head_len()) as usize;
        if len > 0 {
            let mut bytes = vec![0u8; len];
            Cursor::new(self, state).read(0, &mut bytes)?;
            let split = len.min(self.config.chunk_size as usize);
            state.head[0] = ByteBuffer::from(&bytes[..split]);
            state.head[1] = ByteBuffer::from(&bytes[split..]);
        }
        state.head_loaded = true;
        Ok(())
    }

    fn chunk_plaintext(&self, map: &DataMap, index: usize) -> Result<Bytes, EncryptError> {
        let descriptor = &map.chunks[index];
        if let Some(plaintext) = self.cache.get(&descriptor.hash) {
            return Ok(plaintext);
        }
        let ciphertext = self.store.get(&descriptor.hash)?;
        let (key_source, pad_source) = map.neighbour_pre_hashes(index);
        let plaintext = ChunkTransform::new(map.encoding_flags, self.config.compression_level)
            .decode(index, &ciphertext, descriptor, key_source, pad_source)?;
        let plaintext = Bytes::from(plaintext);
        self.cache.put(descriptor.hash, plaintext.clone());
        Ok(plaintext)
    }

    /// Staged runs stand alone, so they are keyed and padded by their own
    /// pre-hash and never compressed.
    fn staging_transform(&self) -> ChunkTransform {
        let flags = EncodingFlags {
            compression: CompressionKind::None,
            ..EncodingFlags::with_hash(self.config.hash_kind)
        };
        ChunkTransform::new(flags, self.config.compression_level)
    }

    fn staged_plaintext(&self, run: &ChunkDescriptor) -> Result<Bytes, EncryptError> {
        if let Some(plaintext) = self.cache.get(&run.hash) {
            return Ok(plaintext);
        }
        let ciphertext = self.store.get(&run.hash)?;
        let plaintext = self
            .staging_transform()
            .decode(0, &ciphertext, run, &run.pre_hash, &run.pre_hash)?;
        let plaintext = Bytes::from(plaintext);
        self.cache.put(run.hash, plaintext.clone());
        Ok(plaintext)
    }

    /// Moves buffered data beyond the head region into the chunk store.
    ///
    /// The queue is staged up to its last block boundary; sequencer spans
    /// are staged whole. Digests of the blocks they cover are recorded on
    /// the way, so the next commit does not read them back for its seed.
    /// A run overlapping data staged earlier forces a full commit instead.
    fn stage(&self, state: &mut State) -> Result<(), EncryptError> {
        let block = self.config.chunk_size as u64;
        let aligned_end = state.queue_end() / block * block;
        let prefix = aligned_end.saturating_sub(state.queue_start) as usize;

        let mut runs: Vec<(u64, &[u8])> = Vec::new();
        if prefix > 0 {
            runs.push((state.queue_start, &state.queue[..prefix]));
        }
        runs.extend(state.sequencer.overlapping(0, u64::MAX));
        if runs.is_empty()
            || runs
                .iter()
                .any(|(start, run)| state.overlaps_staged(*start, start + run.len() as u64))
        {
            drop(runs);
            return self.commit(state);
        }

        let capacity = (self.config.queue_capacity as u64).min(u32::MAX as u64);
        let limit = (capacity / block * block).max(block) as usize;
        let transform = self.staging_transform();
        let mut staged = Vec::new();
        let mut digests = Vec::new();
        for (start, run) in &runs {
            for (k, piece) in run.chunks(limit).enumerate() {
                let own = transform.pre_hash(piece);
                let (descriptor, ciphertext) = transform.encode(0, piece, &own, &own, &own)?;
                if !self.store.has(&descriptor.hash)? {
                    self.store.store(&descriptor.hash, &ciphertext)?;
                }
                self.cache.put(descriptor.hash, Bytes::copy_from_slice(piece));
                staged.push((start + (k * limit) as u64, descriptor));
            }
            for (index, from, to) in state.blocks.covered(*start, run.len() as u64) {
                let piece = &run[(from - start) as usize..(to - start) as usize];
                digests.push((index, self.config.hash_kind.digest(piece)));
            }
        }
        let bytes = runs.iter().map(|(_, run)| run.len()).sum::<usize>();
        drop(runs);

        if prefix > 0 {
            state.queue = ByteBuffer::from(&state.queue[prefix..]);
            state.queue_start += prefix as u64;
        }
        state.sequencer.clear();
        debug!(runs = staged.len(), bytes, "Staged buffered data");
        state.staged.extend(staged);
        for (index, digest) in digests {
            state.blocks.set(index, digest);
        }
        Ok(())
    }

    /// Turns the current item into a new committed data map.
    fn commit(&self, state: &mut State) -> Result<(), EncryptError> {
        if !state.dirty {
            return Ok(());
        }
        let total = state.size();
        let new_map = if total == 0 {
            DataMap::empty(EncodingFlags::with_hash(self.config.hash_kind))
        } else if self.sizer.is_inline(total) {
            let mut content = vec![0u8; total as usize];
            Cursor::new(self, state).read(0, &mut content)?;
            DataMap::inline(content, EncodingFlags::with_hash(self.config.hash_kind))
        } else {
            let seed = self.layout_seed(state)?;
            self.encode_chunks(state, total, &seed)?
        };

        debug!(
            chunks = new_map.chunks.len(),
            size = total,
            flags = new_map.encoding_flags.to_bits(),
            "Committed data map"
        );
        let old_map = std::mem::take(&mut state.data_map);
        let staged = std::mem::take(&mut state.staged);
        let blocks = std::mem::take(&mut state.blocks);
        state.reset(new_map, blocks);
        self.clear_read_ahead();
        self.delete_stale_chunks(old_map.chunks.iter().chain(staged.values()), &state.data_map);
        Ok(())
    }

    /// Digest of the block digests, reading only blocks changed since the
    /// last time it was computed.
    fn layout_seed(&self, state: &mut State) -> Result<[u8; DIGEST_SIZE], EncryptError> {
        let missing = state.blocks.missing();
        if !missing.is_empty() {
            let computed = {
                let mut cursor = Cursor::new(self, state);
                let mut buf = Vec::new();
                let mut computed = Vec::with_capacity(missing.len());
                for (index, start, end) in missing {
                    buf.resize((end - start) as usize, 0);
                    cursor.read(start, &mut buf)?;
                    computed.push((index, self.config.hash_kind.digest(&buf)));
                }
                computed
            };
            trace!(blocks = computed.len(), "Refreshed block digests");
            for (index, digest) in computed {
                state.blocks.set(index, digest);
            }
        }
        state
            .blocks
            .seed(self.config.hash_kind)
            .ok_or_else(|| EncryptError::Size("block digests do not cover the item".to_string()))
    }

    /// Chunks, encodes and stores the whole item.
    ///
    /// Chunk `j` is encoded as soon as chunk `j + 2` has been hashed, so at
    /// most three chunks of plaintext are held at once. The last two chunks
    /// depend on chunks 0 and 1 and are encoded at the end.
    fn encode_chunks(&self, state: &State, total: u64, seed: &[u8]) -> Result<DataMap, EncryptError> {
        let flags = EncodingFlags {
            compression: self.choose_compression(state, total)?,
            ..EncodingFlags::with_hash(self.config.hash_kind)
        };
        let sizes = self.sizer.chunk_sizes(total, seed)?;
        let count = sizes.len();
        let transform = ChunkTransform::new(flags, self.config.compression_level);

        let mut cursor = Cursor::new(self, state);
        let mut pre_hashes: Vec<PreHash> = Vec::with_capacity(count);
        let mut descriptors: Vec<Option<ChunkDescriptor>> = vec![None; count];
        let mut pending: VecDeque<(usize, Vec<u8>)> = VecDeque::with_capacity(3);

        let mut offset = 0u64;
        for (index, size) in sizes.iter().enumerate() {
            let mut raw = vec![0u8; *size as usize];
            cursor.read(offset, &mut raw)?;
            offset += *size as u64;
            pre_hashes.push(transform.pre_hash(&raw));
            pending.push_back((index, raw));

            if index >= 2 && index + 1 < count {
                if let Some((ready, raw)) = pending.pop_front() {
                    descriptors[ready] = Some(self.store_chunk(&transform, ready, raw, count, &pre_hashes)?);
                }
            }
        }
        while let Some((ready, raw)) = pending.pop_front() {
            descriptors[ready] = Some(self.store_chunk(&transform, ready, raw, count, &pre_hashes)?);
        }

        let chunks = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, d)| {
                d.ok_or_else(|| EncryptError::Size(format!("chunk {index} was never encoded")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DataMap::chunked(chunks, flags))
    }

    fn store_chunk(
        &self,
        transform: &ChunkTransform,
        index: usize,
        raw: Vec<u8>,
        count: usize,
        pre_hashes: &[PreHash],
    ) -> Result<ChunkDescriptor, EncryptError> {
        let (key_source, pad_source) = neighbours(index, count);
        let (descriptor, ciphertext) = transform.encode(
            index,
            &raw,
            &pre_hashes[index],
            &pre_hashes[key_source],
            &pre_hashes[pad_source],
        )?;
        if !self.store.has(&descriptor.hash)? {
            self.store.store(&descriptor.hash, &ciphertext)?;
            trace!(index, chunk = %descriptor.hash, size = descriptor.size, "Stored chunk");
        }
        self.cache.put(descriptor.hash, Bytes::from(raw));
        Ok(descriptor)
    }

    fn choose_compression(&self, state: &State, total: u64) -> Result<CompressionKind, EncryptError> {
        match self.config.compression {
            CompressionMode::Never => return Ok(CompressionKind::None),
            CompressionMode::Always => return Ok(CompressionKind::Zstd),
            CompressionMode::Auto => {}
        }
        if self.name_hint.as_deref().map_or(false, compression::is_precompressed) {
            return Ok(CompressionKind::None);
        }

        let sample_size = self.config.compression_sample_size as u64;
        let (start, len) = if total <= 2 * sample_size {
            (0, total)
        } else {
            ((total - sample_size) / 2, sample_size)
        };
        let mut sample = vec![0u8; len as usize];
        Cursor::new(self, state).read(start, &mut sample)?;
        if compression::is_compressible(&sample, self.config.compression_level) {
            Ok(CompressionKind::Zstd)
        } else {
            Ok(CompressionKind::None)
        }
    }

    /// Removes chunks the old map or staging referenced and the new map does not.
    fn delete_stale_chunks<'a>(
        &self,
        old: impl IntoIterator<Item = &'a ChunkDescriptor>,
        new_map: &DataMap,
    ) {
        let live: HashSet<&ChunkName> = new_map.chunks.iter().map(|c| &c.hash).collect();
        for chunk in old.into_iter().filter(|c| !live.contains(&c.hash)) {
            self.cache.remove(&chunk.hash);
            match self.store.delete(&chunk.hash) {
                Ok(()) => trace!(chunk = %chunk.hash, "Deleted stale chunk"),
                Err(e) => warn!(chunk = %chunk.hash, error = %e, "Failed to delete stale chunk"),
            }
        }
    }
}

impl Drop for SelfEncryptor {
    fn drop(&mut self) {
        if !self.state.get_mut().dirty {
            return;
        }
        if let Err(e) = self.flush() {
            error!(error = %e, "Failed to commit on drop; uncommitted changes are lost");
        }
    }
}

impl std::fmt::Debug for SelfEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SelfEncryptor")
            .field("size", &state.size())
            .field("chunks", &state.data_map.chunks.len())
            .field("staged", &state.staged.len())
            .field("dirty", &state.dirty)
            .field("name_hint", &self.name_hint.as_deref().map(Path::display))
            .finish()
    }
}
