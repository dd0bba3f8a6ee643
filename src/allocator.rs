mod memory;
mod strategy;

use std::collections::HashMap;

use log::*;
use thiserror::Error;

pub use memory::{Allocation, Block, BlockStatus, ChunkId, Chunks, MemoryChunk, ProcessId};
pub use strategy::Strategy;

/// Errors reported by the [`Allocator`]. All of them leave the
/// region untouched, so the caller can simply try again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("Region size must be greater than zero.")]
    InvalidSize,
    #[error("Allocation size must be greater than zero.")]
    InvalidRequest,
    #[error("Process {0} already holds a block.")]
    DuplicateProcess(ProcessId),
    #[error("No free block can hold {requested} units (largest free block: {largest_free}).")]
    OutOfMemory { requested: u64, largest_free: u64 },
    #[error("Process {0} holds no block.")]
    UnknownProcess(String),
    #[error("Unknown allocation strategy: {0}.")]
    UnknownStrategy(String),
}

pub type Result<T> = std::result::Result<T, AllocError>;

/// Contiguous memory region split into chunks that are handed
/// out to named processes.
///
/// The region starts as a single free chunk. Allocating carves
/// a chunk out of a free one (chosen by a [`Strategy`]) and
/// freeing merges the chunk back with its free neighbours, so
/// that two free chunks are never adjacent.
pub struct Allocator {
    /// Size of the whole region.
    size: u64,
    /// Chunks the region is comprised of, linked in address
    /// order through their `prev` and `next` ids.
    chunks: HashMap<ChunkId, MemoryChunk>,
    /// Id of the chunk at offset 0.
    head: ChunkId,
    /// Chunk currently held by each process.
    owners: HashMap<ProcessId, ChunkId>,
    /// Offset the next Next Fit scan starts from.
    cursor: u64,
    id_counter: ChunkId,
    /// Number of units currently allocated.
    allocated: u64,
}

impl Allocator {
    pub fn new(size: u64) -> Result<Self> {
        if size == 0 {
            return Err(AllocError::InvalidSize);
        }

        let mut allocator = Self {
            size,
            chunks: HashMap::new(),
            head: 0,
            owners: HashMap::new(),
            cursor: 0,
            id_counter: 0,
            allocated: 0,
        };
        allocator.reset();

        Ok(allocator)
    }

    /// Re-create the region in place: every process is dropped,
    /// the region goes back to a single free chunk and the Next
    /// Fit cursor returns to offset 0.
    pub fn reset(&mut self) {
        let id = 1;

        // Initialize with a single free chunk that covers the
        // whole region.
        self.chunks.clear();
        self.chunks.insert(
            id, MemoryChunk {
                id,
                offset: 0,
                size: self.size,
                owner: None,
                prev: None,
                next: None,
            }
        );

        self.head = id;
        self.owners.clear();
        self.cursor = 0;
        self.id_counter = id + 1;
        self.allocated = 0;

        debug!("Region of {} units reset.", self.size);
    }

    pub fn allocate(
        &mut self,
        process: impl Into<ProcessId>,
        size: u64,
        strategy: Strategy,
    ) -> Result<Allocation> {
        let process = process.into();

        if size == 0 {
            return Err(AllocError::InvalidRequest);
        }
        if self.owners.contains_key(&process) {
            return Err(AllocError::DuplicateProcess(process));
        }

        // Ask the strategy for a free chunk that is large enough.
        // If there is none, return early: nothing has been
        // modified yet.
        let free_chunk_id = match strategy.select(self.chunks(), size, self.cursor) {
            Some(id) => id,
            None => {
                let largest_free = self.largest_free_block();
                warn!("{strategy}: cannot allocate {size} units for {process} (largest free block: {largest_free}).");
                return Err(AllocError::OutOfMemory { requested: size, largest_free });
            }
        };

        let new_id = self.id_counter;
        let free_chunk = self.chunk_mut(free_chunk_id);
        let offset = free_chunk.offset;

        // If the chunk is larger than the request, split the chunk
        // in two parts: one for the allocation and one for the
        // remaining space.
        let id = if free_chunk.size > size {
            // The new chunk starts at the free chunk offset and
            // covers exactly the requested size.
            let new_chunk = MemoryChunk {
                id: new_id,
                offset,
                size,
                owner: Some(process.clone()),
                prev: free_chunk.prev,
                next: Some(free_chunk.id),
            };

            // The remaining space of the former free chunk is
            // then moved after the new chunk.
            free_chunk.prev = Some(new_id);
            free_chunk.offset += size;
            free_chunk.size -= size;
            debug!("Split chunk at {offset}: {size} allocated, {} left free at {}.", free_chunk.size, free_chunk.offset);

            // If there was a previous chunk, update its 'next'
            // field too. Otherwise the new chunk is the first one
            // of the region.
            match new_chunk.prev {
                Some(prev_id) => self.chunk_mut(prev_id).next = Some(new_id),
                None => self.head = new_id,
            }

            // Finally, insert the new chunk in the list.
            self.id_counter += 1;
            self.chunks.insert(new_id, new_chunk);
            new_id
        } else {
            // The chunk size is exactly the requested size (it
            // cannot be less because the strategy only selects
            // chunks that fit), so the chunk is taken as a whole.
            free_chunk.owner = Some(process.clone());
            free_chunk_id
        };

        // Whichever strategy made the choice, the cursor moves
        // right after the new allocation.
        self.cursor = offset + size;
        self.allocated += size;

        info!("{strategy}: allocated {size} units at offset {offset} to {process}.");
        self.owners.insert(process, id);

        Ok(Allocation { offset, size })
    }

    pub fn free(&mut self, process: &str) -> Result<()> {
        let chunk_id = *self.owners
            .get(process)
            .ok_or_else(|| AllocError::UnknownProcess(process.to_owned()))?;

        let chunk = self.chunk_mut(chunk_id);
        let (offset, size) = (chunk.offset, chunk.size);
        chunk.owner = None;

        self.owners.remove(process);
        self.allocated -= size;
        info!("Freed {size} units at offset {offset} from {process}.");

        let merged_id = self.coalesce(chunk_id);

        // The cursor may point into a chunk that has just been
        // merged away; move it to the start of the merged chunk.
        let merged = self.chunk(merged_id);
        let (start, inside) = (merged.offset, merged.contains(self.cursor));
        if inside && self.cursor != start {
            debug!("Cursor moved from {} to {start}.", self.cursor);
            self.cursor = start;
        }

        Ok(())
    }

    /// Current blocks of the region, in address order.
    ///
    /// Each call walks the chunk list afresh; the region cannot
    /// change while the iterator is alive.
    pub fn memory_map(&self) -> impl Iterator<Item = Block> + '_ {
        self.chunks().map(Block::from)
    }

    /// Read-only view over the chunks, in address order.
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks::new(&self.chunks, self.head)
    }

    /// Where `process` currently sits, if it holds a block.
    pub fn lookup(&self, process: &str) -> Option<Allocation> {
        let chunk = self.chunks.get(self.owners.get(process)?)?;

        Some(Allocation {
            offset: chunk.offset,
            size: chunk.size,
        })
    }

    /// Offset the next Next Fit scan starts from.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn total_size(&self) -> u64 {
        self.size
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    pub fn free_space(&self) -> u64 {
        self.size - self.allocated
    }

    /// Size of the largest free chunk, 0 if the region is full.
    pub fn largest_free_block(&self) -> u64 {
        self.chunks()
            .filter(|chunk| chunk.is_free())
            .map(|chunk| chunk.size)
            .max()
            .unwrap_or(0)
    }

    /// Number of processes currently holding a block.
    pub fn process_count(&self) -> usize {
        self.owners.len()
    }

    /// Merge the free chunk `chunk_id` with its free neighbours
    /// and return the id of the resulting chunk.
    fn coalesce(&mut self, mut chunk_id: ChunkId) -> ChunkId {
        // Absorb the following chunks as long as they are free.
        // Each merge removes a chunk from the list, so the loop
        // runs at most once per chunk.
        while let Some(next_id) = self.free_neighbour(self.chunk(chunk_id).next) {
            self.merge_chunks(chunk_id, next_id);
        }

        // Then let the preceding free chunks absorb this one; the
        // surviving chunk is always the left one.
        while let Some(prev_id) = self.free_neighbour(self.chunk(chunk_id).prev) {
            self.merge_chunks(prev_id, chunk_id);
            chunk_id = prev_id;
        }

        chunk_id
    }

    fn free_neighbour(&self, neighbour: Option<ChunkId>) -> Option<ChunkId> {
        neighbour.filter(|id| self.chunks.get(id).is_some_and(MemoryChunk::is_free))
    }

    fn merge_chunks(&mut self, chunk_l: ChunkId, chunk_r: ChunkId) {
        // Get the right chunk and remove it from the list,
        // since it will be merged.
        let chunk_right = self.chunks.remove(&chunk_r).unwrap();

        // Get the left chunk and update its size and `next`
        // pointer.
        let chunk_left = self.chunk_mut(chunk_l);
        chunk_left.size += chunk_right.size;
        chunk_left.next = chunk_right.next;
        debug!("Merged chunk at {} into chunk at {} ({} units).", chunk_right.offset, chunk_left.offset, chunk_left.size);

        // Get the 'next' chunk of the (merged) right chunk and
        // update its `prev` pointer.
        if let Some(next_id) = chunk_right.next {
            self.chunk_mut(next_id).prev = Some(chunk_l);
        }
    }

    // Chunk ids come from the owner table or from chunk links,
    // which only ever refer to chunks present in the table.
    fn chunk(&self, id: ChunkId) -> &MemoryChunk {
        &self.chunks[&id]
    }

    fn chunk_mut(&mut self, id: ChunkId) -> &mut MemoryChunk {
        self.chunks.get_mut(&id).unwrap()
    }
}
