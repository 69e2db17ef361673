//! Context preparation: token estimation and history trimming.
//!
//! History is trimmed in whole groups, oldest first, until it fits the
//! thread's input budget minus whatever the system prefix already costs.

pub mod token;
pub mod trim;

pub use trim::{group_messages, trim_to_budget};
