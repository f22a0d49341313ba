// S3 object-store adapter using OpenDAL
// Flat namespace: object keys map straight under the configured base dir

use std::fs;
use std::path::Path;

use opendal::{services::S3, Metadata, Operator};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::config::S3Config;
use crate::error::SyncError;
use crate::index::resolver::RootPolicy;
use crate::index::{Digests, FileRecord, StatInfo};
use crate::store::remote::{verify_and_commit, EnumerateOptions, RemoteStore};
use crate::store::retry::with_backoff;

/// S3 backend adapter. The engine is synchronous, so the adapter owns a
/// private tokio runtime and blocks on each OpenDAL call.
pub struct S3Store {
    operator: Operator,
    runtime: Runtime,
    bucket: String,
    base_dir: String,
}

impl S3Store {
    pub fn from_config(config: &S3Config) -> Result<Self, SyncError> {
        let mut builder = S3::default()
            .bucket(&config.bucket)
            .region(&config.region);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint(endpoint);
        }
        // Without explicit keys OpenDAL falls through to the standard
        // AWS credential chain (env, shared credentials, instance role).
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            builder = builder
                .access_key_id(access_key)
                .secret_access_key(secret_key);
        }
        let operator = Operator::new(builder)
            .map_err(|e| map_opendal("configuring bucket", e))?
            .finish();
        let runtime = Runtime::new()
            .map_err(|e| SyncError::from_io_error(e, "starting adapter runtime", None))?;

        Ok(Self {
            operator,
            runtime,
            bucket: config.bucket.clone(),
            base_dir: config.base_dir.trim_end_matches('/').to_string(),
        })
    }

    fn locator_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// Accepts an `s3://bucket/key` locator, a canonical path under the
    /// base dir, or a bare key.
    fn key_of(&self, reference: &str) -> String {
        let bucket_prefix = format!("s3://{}/", self.bucket);
        if let Some(key) = reference.strip_prefix(&bucket_prefix) {
            return key.to_string();
        }
        let base_prefix = format!("{}/", self.base_dir);
        if let Some(key) = reference.strip_prefix(&base_prefix) {
            return key.to_string();
        }
        reference.trim_start_matches('/').to_string()
    }

    fn record_for(&self, key: &str, meta: &Metadata) -> FileRecord {
        // Single-part etags are md5 digests; multipart etags (with a
        // part-count suffix) are not usable as content identity.
        let digests = match meta.etag() {
            Some(etag) => {
                let etag = etag.trim_matches('"');
                if etag.contains('-') {
                    Digests::default()
                } else {
                    Digests::from_md5(etag)
                }
            }
            None => Digests::default(),
        };
        let mtime = meta.last_modified().map(|t| t.into_inner().as_second()).unwrap_or(0);
        FileRecord::from_parts(
            format!("{}/{}", self.base_dir, key),
            Some(self.locator_for(key)),
            digests,
            StatInfo::new(meta.content_length(), mtime),
        )
        .with_backend_id(key)
    }

    fn list_all(&self) -> Result<Vec<opendal::Entry>, SyncError> {
        with_backoff("listing bucket", || {
            self.runtime
                .block_on(async { self.operator.list_with("").recursive(true).await })
                .map_err(|e| map_opendal("listing bucket", e))
        })
    }
}

impl RemoteStore for S3Store {
    fn kind(&self) -> &'static str {
        "s3"
    }

    fn root_policy(&self) -> RootPolicy {
        RootPolicy::new(self.base_dir.clone())
    }

    fn enumerate_files(
        &mut self,
        options: &EnumerateOptions,
        callback: &mut dyn FnMut(FileRecord),
    ) -> Result<(), SyncError> {
        let mut emitted = 0usize;
        for entry in self.list_all()? {
            if entry.metadata().mode().is_dir() {
                continue;
            }
            let key = entry.path().to_string();
            if let Some(search) = &options.search {
                if !key.contains(search.as_str()) {
                    continue;
                }
            }
            if let Some(limit) = options.limit {
                if emitted >= limit {
                    break;
                }
            }
            callback(self.record_for(&key, entry.metadata()));
            emitted += 1;
        }
        debug!(bucket = %self.bucket, emitted, "enumerated objects");
        Ok(())
    }

    fn enumerate_directories(
        &mut self,
        callback: &mut dyn FnMut(FileRecord),
    ) -> Result<(), SyncError> {
        for entry in self.list_all()? {
            if !entry.metadata().mode().is_dir() {
                continue;
            }
            let key = entry.path().trim_end_matches('/').to_string();
            if key.is_empty() {
                continue;
            }
            let record = FileRecord::from_parts(
                format!("{}/{}", self.base_dir, key),
                Some(self.locator_for(&key)),
                Digests::default(),
                StatInfo::default(),
            )
            .with_backend_id(&key);
            callback(record);
        }
        Ok(())
    }

    fn fetch(
        &mut self,
        locator: &str,
        destination: &Path,
        expected: Option<&Digests>,
    ) -> Result<u64, SyncError> {
        let key = self.key_of(locator);
        let data = with_backoff("downloading object", || {
            self.runtime
                .block_on(async { self.operator.read(&key).await })
                .map_err(|e| map_opendal("downloading object", e))
        })?;
        verify_and_commit(&data.to_vec(), destination, expected)
    }

    fn store(&mut self, local_path: &Path, parent_id: Option<&str>) -> Result<String, SyncError> {
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| SyncError::IncompatibleRecord {
                reason: format!("{} has no file name", local_path.display()),
            })?;
        let key = match parent_id {
            Some(parent) if !parent.is_empty() => {
                format!("{}/{}", parent.trim_matches('/'), name)
            }
            _ => name,
        };
        let data = fs::read(local_path).map_err(|e| {
            SyncError::from_io_error(e, "reading upload source", Some(local_path.to_path_buf()))
        })?;
        with_backoff("uploading object", || {
            self.runtime
                .block_on(async { self.operator.write(&key, data.clone()).await })
                .map_err(|e| map_opendal("uploading object", e))
        })?;
        Ok(key)
    }

    fn create_directory(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, SyncError> {
        let key = match parent_id {
            Some(parent) if !parent.is_empty() => {
                format!("{}/{}/", parent.trim_matches('/'), name.trim_matches('/'))
            }
            _ => format!("{}/", name.trim_matches('/')),
        };
        // No real directories on S3; a zero-byte marker object stands in
        with_backoff("creating directory marker", || {
            self.runtime
                .block_on(async { self.operator.write(&key, Vec::<u8>::new()).await })
                .map_err(|e| map_opendal("creating directory marker", e))
        })?;
        Ok(key.trim_end_matches('/').to_string())
    }

    fn delete(&mut self, id: &str) -> Result<(), SyncError> {
        let key = self.key_of(id);
        with_backoff("deleting object", || {
            self.runtime
                .block_on(async { self.operator.delete(&key).await })
                .map_err(|e| map_opendal("deleting object", e))
        })
    }
}

fn map_opendal(operation: &str, err: opendal::Error) -> SyncError {
    if err.is_temporary() {
        SyncError::AdapterTransient {
            operation: operation.to_string(),
            attempts: 1,
            reason: err.to_string(),
        }
    } else {
        SyncError::IoError {
            path: None,
            operation: operation.to_string(),
            source: std::io::Error::other(err),
        }
    }
}
