//! Database layer for screentime-mcp
//!
//! This module provides the storage layer using SQLite with:
//! - Ordered provision/views/lockdown migrations
//! - A connection manager owning the served handle
//! - The `Database` handle queries run against

pub mod connection;
pub mod migrations;

pub use connection::{ConnectionManager, Database, DatabaseTarget, Mode};
pub use migrations::{MigrationSet, MigrationSource, Stage, TemplateContext};
