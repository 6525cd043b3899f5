//! Storage layer: the repository contract, its backends, and the encrypted
//! attribute decorator that all record access goes through.

mod encrypted;
mod id;
mod memory;
mod mongo;
mod repository;

pub use encrypted::{ensure_indexes, EncryptedColl, StoreRecord};
pub use id::Id;
pub use memory::MemoryRepository;
pub use mongo::MongoRepository;
pub use repository::Repository;
