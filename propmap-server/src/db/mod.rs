//! Database access for propmap-server

pub mod init;

pub use init::{init_database, init_memory_database};
