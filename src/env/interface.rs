use std::future::Future;
use std::path::{Path, PathBuf};

use crate::env::EnvError;

/// The file system as seen by flush and compaction jobs.
///
/// Only the error kinds are part of the contract here: a missing path is
/// [`EnvError::NotFound`], an existing one is [`EnvError::AlreadyExists`],
/// everything else is [`EnvError::Io`].
pub trait Env: Send + Sync + 'static {
    type WritableFile: WritableFile;
    type SequentialFile: SequentialFile;
    type RandomAccessFile: RandomAccessFile;
    type FileLock: Send + Sync + 'static;

    fn create_dir(&self, path: &Path) -> impl Future<Output = Result<(), EnvError>> + Send;

    fn create_dir_if_missing(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<(), EnvError>> + Send;

    fn delete_dir(&self, path: &Path) -> impl Future<Output = Result<(), EnvError>> + Send;

    /// `Ok(())` when something exists at `path`, [`EnvError::NotFound`] otherwise.
    fn file_exists(&self, path: &Path) -> impl Future<Output = Result<(), EnvError>> + Send;

    /// Creates the file, truncating it if it already exists.
    fn new_writable_file(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Self::WritableFile, EnvError>> + Send;

    fn new_sequential_file(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Self::SequentialFile, EnvError>> + Send;

    fn new_random_access_file(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Self::RandomAccessFile, EnvError>> + Send;

    fn delete_file(&self, path: &Path) -> impl Future<Output = Result<(), EnvError>> + Send;

    fn rename_file(
        &self,
        from: &Path,
        to: &Path,
    ) -> impl Future<Output = Result<(), EnvError>> + Send;

    /// Names (not full paths) of the direct children of `dir`, sorted.
    fn get_children(&self, dir: &Path)
        -> impl Future<Output = Result<Vec<String>, EnvError>> + Send;

    fn get_file_size(&self, path: &Path) -> impl Future<Output = Result<u64, EnvError>> + Send;

    fn lock_file(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Self::FileLock, EnvError>> + Send;

    fn unlock_file(
        &self,
        lock: Self::FileLock,
    ) -> impl Future<Output = Result<(), EnvError>> + Send;

    /// A directory tests may freely write into; created if missing.
    fn get_test_directory(&self) -> impl Future<Output = Result<PathBuf, EnvError>> + Send;

    /// Seconds since the unix epoch.
    fn get_current_time(&self) -> Result<u64, EnvError>;
}

pub trait WritableFile: Send + Sync + 'static {
    fn append(&mut self, data: &[u8]) -> impl Future<Output = Result<(), EnvError>> + Send;

    fn flush(&mut self) -> impl Future<Output = Result<(), EnvError>> + Send;

    fn sync(&mut self) -> impl Future<Output = Result<(), EnvError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), EnvError>> + Send;

    fn size(&self) -> u64;
}

pub trait SequentialFile: Send + Sync + 'static {
    /// Reads up to `n` bytes. An empty result means end of file.
    fn read(&mut self, n: usize) -> impl Future<Output = Result<Vec<u8>, EnvError>> + Send;

    /// Skipping past the end of the file is not an error, it leaves the cursor at the end.
    fn skip(&mut self, n: u64) -> impl Future<Output = Result<(), EnvError>> + Send;
}

pub trait RandomAccessFile: Send + Sync + 'static {
    /// Reads up to `len` bytes at `offset`. Reads running past the end are truncated,
    /// an `offset` past the end is an error.
    fn read(
        &self,
        offset: u64,
        len: usize,
    ) -> impl Future<Output = Result<Vec<u8>, EnvError>> + Send;

    fn size(&self) -> u64;
}
