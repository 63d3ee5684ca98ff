//! Database initialization for the spatial store

pub mod init;

pub use init::*;
