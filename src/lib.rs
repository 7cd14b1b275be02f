//! # Posting Core
//!
//! A financial posting engine turning commercial documents (goods receipts,
//! purchase invoices, sales invoices) into balanced double-entry journals,
//! inventory movements, and order status updates.
//!
//! ## Features
//!
//! - **Three posting procedures**: Receipts, purchase invoices, and sales
//!   invoices, sharing one validation/build/commit skeleton
//! - **Accrual matching**: Receipt and invoice events for the same order
//!   line arrive in any order; provisional accruals are reversed FIFO
//! - **Cost allocation**: Document-level shipping spread across lines by
//!   relative cost, with currency conversion and unit-of-measure factors
//! - **Inventory ledgers**: Item-quantity and cost history rows, with
//!   per-unit rows for serial-tracked items
//! - **Atomic persistence**: Every run commits all-or-nothing through a
//!   trait-based storage abstraction
//!
//! ## Quick Start
//!
//! ```rust
//! use posting_core::{MemoryStorage, PostingEngine};
//!
//! // MemoryStorage is for tests; production backends implement the
//! // PostingStorage trait.
//! let storage = MemoryStorage::new();
//! let engine = PostingEngine::new(storage);
//! // Seed documents and master data, then drive a run:
//! // let summary = engine.post_receipt(request).await?;
//! # drop(engine);
//! ```

pub mod posting;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use posting::*;
pub use traits::*;
pub use types::*;
pub use utils::memory_storage::MemoryStorage;
