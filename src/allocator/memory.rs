use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

/// Unique identifier of a chunk within the region. Identifiers
/// are never reused: a chunk that is merged into a neighbour
/// disappears along with its id.
pub type ChunkId = u64;

/// Name of a simulated process owning a chunk of memory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProcessId {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for ProcessId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// Lets the owner table be queried with a plain `&str`.
impl Borrow<str> for ProcessId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a block is available for allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    Free,
    Allocated,
}

/// Portion of the region managed by the allocator. Chunks form
/// a doubly linked list in address order through their `prev`
/// and `next` ids.
#[derive(Clone, Debug)]
pub struct MemoryChunk {
    /// Identifier of the chunk in the chunk table.
    pub id: ChunkId,
    /// Offset of the chunk within the region.
    pub offset: u64,
    /// Size of the chunk, never zero.
    pub size: u64,
    /// Process the chunk is allocated to, `None` when free.
    pub owner: Option<ProcessId>,
    /// Id of the chunk right before this one.
    pub prev: Option<ChunkId>,
    /// Id of the chunk right after this one.
    pub next: Option<ChunkId>,
}

impl MemoryChunk {
    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    /// Offset one past the last unit of the chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// A chunk can hold a request if it is free and at least as
    /// large as the requested size.
    pub fn fits(&self, size: u64) -> bool {
        self.is_free() && self.size >= size
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.offset <= offset && offset < self.end()
    }

    pub fn status(&self) -> BlockStatus {
        match self.owner {
            Some(_) => BlockStatus::Allocated,
            None => BlockStatus::Free,
        }
    }
}

/// Snapshot of a single block, as reported by the memory map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub offset: u64,
    pub size: u64,
    pub status: BlockStatus,
    pub owner: Option<ProcessId>,
}

impl From<&MemoryChunk> for Block {
    fn from(chunk: &MemoryChunk) -> Self {
        Self {
            offset: chunk.offset,
            size: chunk.size,
            status: chunk.status(),
            owner: chunk.owner.clone(),
        }
    }
}

/// Location of a live allocation within the region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Offset of the allocated block.
    pub offset: u64,
    /// Size of the allocated block.
    pub size: u64,
}

/// Read-only view over the chunk list, walking it in address
/// order from the first chunk. Cloning the iterator is cheap,
/// which lets strategies scan the list more than once.
#[derive(Clone)]
pub struct Chunks<'a> {
    table: &'a HashMap<ChunkId, MemoryChunk>,
    current: Option<ChunkId>,
}

impl<'a> Chunks<'a> {
    pub(crate) fn new(table: &'a HashMap<ChunkId, MemoryChunk>, head: ChunkId) -> Self {
        Self {
            table,
            current: Some(head),
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a MemoryChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.table.get(&self.current?)?;
        self.current = chunk.next;
        Some(chunk)
    }
}
