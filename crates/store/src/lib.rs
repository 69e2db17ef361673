//! Storage implementations for toolchat.
//!
//! Both backends implement all three collaborator traits from
//! `toolchat_core::store`: messages, threads and tools.

pub mod in_memory;
pub mod keywords;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
