//! File identity and indexing.
//!
//! `FileRecord` is the uniform metadata unit, `FileIndex` the
//! multi-index collection one backend's scan produces, and
//! `PathResolver` the parent-chain walk that gives hierarchical remotes
//! a canonical local-style path.

pub mod digest;
pub mod file_index;
pub mod record;
pub mod resolver;

pub use digest::{digest_bytes, digest_file, Digests};
pub use file_index::{FileIndex, Lookup};
pub use record::{FileRecord, HashState, StatInfo, CACHE_TUPLE_ARITY};
pub use resolver::{collapse_export_suffix, FetchAncestor, PathResolver, RootPolicy};
