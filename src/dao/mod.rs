/// Remote match document backends.
pub mod match_store;
/// Remote document model shared by every backend.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
