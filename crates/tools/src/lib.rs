//! OpenAPI-backed tools for toolchat.
//!
//! A registered [`BaseTool`](toolchat_core::BaseTool) carries an OpenAPI
//! document. The [`ToolCompiler`] turns it into one descriptor per HTTP
//! operation, each bound to an [`HttpToolExecutor`] that performs the call.

pub mod auth;
pub mod compiler;
pub mod document;
pub mod executor;

pub use auth::auth_headers;
pub use compiler::ToolCompiler;
pub use executor::HttpToolExecutor;
