//! Adapters behind the domain ports: in-memory tables, the exchange-rate
//! table and, with the `storage-rocksdb` feature, a persistent RocksDB store.

pub mod currency;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
