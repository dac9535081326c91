//! MCP (Model Context Protocol) surface
//!
//! JSON-RPC types, request dispatch, and the stdio and SSE transports.

pub mod protocol;
pub mod server;
pub mod sse;

pub use server::McpServer;
