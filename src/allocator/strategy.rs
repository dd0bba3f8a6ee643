use std::fmt;
use std::str::FromStr;

use super::memory::{ChunkId, Chunks, MemoryChunk};
use super::AllocError;

/// Placement policy used to pick the free chunk an allocation is
/// carved from.
///
/// Strategies are pure: they only read the chunk list and the
/// Next Fit cursor, and never modify either. A chunk qualifies
/// if it is free and at least as large as the request; among
/// equally good candidates the one with the lowest offset wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// First qualifying chunk from the start of the region.
    FirstFit,
    /// First qualifying chunk from the cursor, wrapping around
    /// to the start of the region.
    NextFit,
    /// Smallest qualifying chunk.
    BestFit,
    /// Largest qualifying chunk.
    WorstFit,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::FirstFit,
        Strategy::NextFit,
        Strategy::BestFit,
        Strategy::WorstFit,
    ];

    /// Select the chunk to allocate `size` units from, or `None`
    /// if no free chunk is large enough.
    pub fn select(self, chunks: Chunks<'_>, size: u64, cursor: u64) -> Option<ChunkId> {
        let chunk = match self {
            Strategy::FirstFit => first_fit(chunks, size),
            Strategy::NextFit => next_fit(chunks, size, cursor),
            Strategy::BestFit => best_fit(chunks, size),
            Strategy::WorstFit => worst_fit(chunks, size),
        };

        chunk.map(|chunk| chunk.id)
    }

    /// Policy name as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Strategy::FirstFit => "first_fit",
            Strategy::NextFit => "next_fit",
            Strategy::BestFit => "best_fit",
            Strategy::WorstFit => "worst_fit",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Strategy::FirstFit => "First Fit",
            Strategy::NextFit => "Next Fit",
            Strategy::BestFit => "Best Fit",
            Strategy::WorstFit => "Worst Fit",
        };
        f.write_str(label)
    }
}

impl FromStr for Strategy {
    type Err = AllocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");

        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == normalized)
            .ok_or_else(|| AllocError::UnknownStrategy(s.to_owned()))
    }
}

fn first_fit<'a>(mut chunks: Chunks<'a>, size: u64) -> Option<&'a MemoryChunk> {
    chunks.find(|chunk| chunk.fits(size))
}

fn next_fit<'a>(chunks: Chunks<'a>, size: u64, cursor: u64) -> Option<&'a MemoryChunk> {
    // The scan starts at the chunk the cursor points into. A
    // cursor at the very end of the region (the last allocation
    // filled it up to the end) belongs to no chunk, in which case
    // the scan starts over from the first chunk.
    let start = chunks
        .clone()
        .find(|chunk| chunk.contains(cursor))
        .map_or(0, |chunk| chunk.offset);

    // Scan from the starting chunk to the end of the region,
    // then wrap around and scan the chunks before it, so that
    // every chunk is visited exactly once.
    chunks
        .clone()
        .skip_while(|chunk| chunk.offset < start)
        .chain(chunks.take_while(|chunk| chunk.offset < start))
        .find(|chunk| chunk.fits(size))
}

fn best_fit<'a>(chunks: Chunks<'a>, size: u64) -> Option<&'a MemoryChunk> {
    // `min_by_key` keeps the first of several equal minimums,
    // which is the one with the lowest offset.
    chunks
        .filter(|chunk| chunk.fits(size))
        .min_by_key(|chunk| chunk.size)
}

fn worst_fit<'a>(chunks: Chunks<'a>, size: u64) -> Option<&'a MemoryChunk> {
    // `max_by` keeps the last of several equal maximums, so the
    // offset is compared in reverse to favour the lowest one.
    chunks
        .filter(|chunk| chunk.fits(size))
        .max_by(|a, b| a.size.cmp(&b.size).then_with(|| b.offset.cmp(&a.offset)))
}
