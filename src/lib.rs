//! Simulator of contiguous memory allocation policies.
//!
//! A single [`Allocator`] manages a linear region of memory and
//! hands out blocks of it to named processes, picking the block
//! with one of four classic placement policies (see
//! [`Strategy`]).

pub mod allocator;

pub use allocator::{AllocError, Allocation, Allocator, Block, BlockStatus, ProcessId, Strategy};
