/// Database model definitions.
pub mod models;
/// Session and player persistence backends.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
