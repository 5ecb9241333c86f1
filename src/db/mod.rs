//! Database layer (Firestore, with an in-memory fallback).

pub mod firestore;
pub mod memory;

pub use firestore::Db;
pub use memory::MemoryStore;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Google Analytics credentials (keyed by username)
    pub const GA_CREDENTIALS: &str = "ga_credentials";
}
