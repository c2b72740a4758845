pub mod repository;
pub use repository::{Store, StoreTx};
pub mod pg_repo;
pub use pg_repo::PgStore;

#[cfg(test)]
pub mod memory_repo;
#[cfg(test)]
pub use memory_repo::MemoryStore;
