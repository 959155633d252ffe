pub mod accounts;
pub mod context;
pub mod error;
pub mod export;
pub mod identity;
pub mod ingest;
pub mod item_sets;
pub mod media;
pub mod preview;
pub mod render;
pub mod repos;
#[cfg(test)]
pub(crate) mod testing;
