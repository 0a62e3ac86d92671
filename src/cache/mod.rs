//! Committees cache.
//!
//! Two layers serve `/eth/v1/beacon/states/head/committees?epoch=N`:
//!
//! - **Disk store**: write-once, one protobuf record per epoch under the data
//!   directory. The source of truth.
//! - **Warm store**: bounded LRU of record bytes, filled by read-ahead after
//!   disk hits. Disposable.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! data_dir = "/tmp/treegen-proxy"
//! retain = 7000
//! warm_capacity = 256
//! read_ahead = 32
//! ```

pub mod codec;
mod committees;
mod config;
mod error;
mod keys;
mod store;
mod warm;

pub use codec::{CodecError, Committee, CommitteesResponse, canonical_to_json, json_to_canonical};
pub use committees::{CachedCommittees, CommitteeCache};
pub use config::CacheConfig;
pub use error::CacheError;
pub use keys::{EpochKey, RECORD_EXTENSION};
pub use store::DiskStore;
pub use warm::WarmStore;
