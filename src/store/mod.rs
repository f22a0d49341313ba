//! Backend adapters and the capability trait they implement.

pub mod local;
pub mod remote;
pub mod retry;
pub mod s3;

pub use local::LocalStore;
pub use remote::{verify_and_commit, EnumerateOptions, RemoteStore};
pub use retry::with_backoff;
pub use s3::S3Store;
