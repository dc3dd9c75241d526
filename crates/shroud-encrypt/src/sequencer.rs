//! Out-of-order write buffer keyed by byte offset.
//!
//! Holds spans of plaintext that were written away from the engine's main
//! queue. Spans never overlap or touch: adding a span that reaches an
//! existing one merges the two.

use std::collections::BTreeMap;

use crate::buffer::ByteBuffer;

/// Ordered set of disjoint, non-adjacent byte spans.
#[derive(Debug, Default)]
pub struct Sequencer {
    spans: BTreeMap<u64, ByteBuffer>,
    buffered: usize,
}

fn span_end(start: u64, data: &[u8]) -> u64 {
    start + data.len() as u64
}

impl Sequencer {
    /// Creates an empty sequencer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `data` at `position`.
    ///
    /// Every span overlapping or abutting `[position, position + len)` is
    /// folded into one replacement span covering the union. Where spans
    /// overlap, the bytes of this call win.
    pub fn add(&mut self, position: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let end = span_end(position, data);

        // Spans are disjoint, so their ends descend with their starts:
        // walking backwards from `end` we can stop at the first span that
        // ends before `position`.
        let touching: Vec<u64> = self
            .spans
            .range(..=end)
            .rev()
            .take_while(|(start, buf)| span_end(**start, buf) >= position)
            .map(|(start, _)| *start)
            .collect();

        if touching.is_empty() {
            self.spans.insert(position, ByteBuffer::from(data));
            self.buffered += data.len();
            return;
        }

        let mut union_start = position;
        let mut union_end = end;
        let mut absorbed = Vec::with_capacity(touching.len());
        for start in touching {
            if let Some(buf) = self.spans.remove(&start) {
                union_start = union_start.min(start);
                union_end = union_end.max(span_end(start, &buf));
                self.buffered -= buf.len();
                absorbed.push((start, buf));
            }
        }

        let mut merged = ByteBuffer::zeroed((union_end - union_start) as usize);
        for (start, buf) in absorbed {
            merged.write_at((start - union_start) as usize, &buf);
        }
        merged.write_at((position - union_start) as usize, data);

        self.buffered += merged.len();
        self.spans.insert(union_start, merged);
    }

    /// Removes and returns the span starting exactly at `position`.
    pub fn get(&mut self, position: u64) -> Option<ByteBuffer> {
        let buf = self.spans.remove(&position)?;
        self.buffered -= buf.len();
        Some(buf)
    }

    /// Removes and returns the lowest-offset span.
    pub fn get_first(&mut self) -> Option<(u64, ByteBuffer)> {
        let (start, buf) = self.spans.pop_first()?;
        self.buffered -= buf.len();
        Some((start, buf))
    }

    /// Lowest-offset span starting at or after `position`, left in place.
    pub fn peek_beyond(&self, position: u64) -> Option<(u64, &[u8])> {
        self.spans
            .range(position..)
            .next()
            .map(|(start, buf)| (*start, buf.as_slice()))
    }

    /// First span overlapping `[position, position + length)`, left in place.
    pub fn peek(&self, length: u64, position: u64) -> Option<(u64, &[u8])> {
        self.overlapping(position, length).next()
    }

    /// Spans overlapping `[position, position + length)` in offset order.
    pub fn overlapping(&self, position: u64, length: u64) -> impl Iterator<Item = (u64, &[u8])> {
        let end = position.saturating_add(length);
        // At most one span can start before `position` and still reach it.
        let straddler = self
            .spans
            .range(..position)
            .next_back()
            .filter(|(start, buf)| length > 0 && span_end(**start, buf) > position);
        let inside = self.spans.range(position..end.max(position));
        straddler
            .into_iter()
            .chain(inside)
            .map(|(start, buf)| (*start, buf.as_slice()))
    }

    /// Drops everything at or beyond `position`.
    ///
    /// A span straddling `position` is shortened to end there.
    pub fn truncate(&mut self, position: u64) {
        for (_, buf) in self.spans.split_off(&position) {
            self.buffered -= buf.len();
        }
        if let Some((start, buf)) = self.spans.iter_mut().next_back() {
            let end = span_end(*start, buf);
            if end > position {
                let keep = (position - *start) as usize;
                self.buffered -= buf.len() - keep;
                buf.truncate(keep);
            }
        }
    }

    /// Number of spans.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns true if no spans are held.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Total bytes across all spans.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered
    }

    /// Drops every span.
    pub fn clear(&mut self) {
        self.spans.clear();
        self.buffered = 0;
    }
}
