use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use rand::Rng;

use crate::env::{Env, EnvError, RandomAccessFile, SequentialFile, WritableFile};

/// An [`Env`] that keeps everything in memory.
///
/// Parent directories are never required to exist, a file implicitly creates its
/// ancestors. Bytes appended since the last `sync` can be scribbled over with
/// [`MemoryEnv::corrupt_buffer`] to simulate a crash losing buffered data, and the
/// clock can be pushed forward with [`MemoryEnv::fake_sleep`].
#[derive(Debug, Default)]
pub struct MemoryEnv {
    files: DashMap<PathBuf, Arc<MemoryFile>>,
    dirs: DashSet<PathBuf>,
    locks: DashSet<PathBuf>,
    fake_sleep_micros: AtomicU64,
}

#[derive(Debug, Default)]
struct MemoryFile {
    contents: RwLock<Contents>,
}

#[derive(Debug, Default)]
struct Contents {
    data: Vec<u8>,
    synced: usize,
}

impl MemoryFile {
    fn len(&self) -> usize {
        self.contents.read().data.len()
    }
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites part of the unsynced tail of `path`. Synced bytes are never touched.
    pub fn corrupt_buffer(&self, path: &Path) -> Result<(), EnvError> {
        let file = self.file(path)?;
        let mut contents = file.contents.write();
        let Contents { data, synced } = &mut *contents;
        if *synced >= data.len() {
            return Ok(());
        }
        let mut rng = rand::thread_rng();
        let start = rng.gen_range(*synced..data.len());
        let end = (start + 512).min(data.len());
        for byte in &mut data[start..end] {
            *byte ^= rng.gen_range(1..=u8::MAX);
        }
        Ok(())
    }

    /// Advances the clock reported by [`Env::get_current_time`] without sleeping.
    pub fn fake_sleep(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.fake_sleep_micros.fetch_add(micros, Ordering::Relaxed);
    }

    fn file(&self, path: &Path) -> Result<Arc<MemoryFile>, EnvError> {
        self.files
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EnvError::NotFound(path.to_path_buf()))
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.dirs.contains(path)
            || self.files.iter().any(|entry| {
                let file = entry.key();
                file.as_path() != path && file.starts_with(path)
            })
    }

    fn children(&self, dir: &Path) -> Vec<String> {
        let files = self.files.iter().map(|entry| entry.key().clone());
        let dirs = self.dirs.iter().map(|entry| entry.key().clone());
        let mut children: Vec<_> = files
            .chain(dirs)
            .filter(|path| path.parent() == Some(dir))
            .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .collect();
        children.sort();
        children.dedup();
        children
    }
}

impl Env for MemoryEnv {
    type WritableFile = MemoryWritableFile;
    type SequentialFile = MemorySequentialFile;
    type RandomAccessFile = MemoryRandomAccessFile;
    type FileLock = MemoryFileLock;

    async fn create_dir(&self, path: &Path) -> Result<(), EnvError> {
        if self.files.contains_key(path) || !self.dirs.insert(path.to_path_buf()) {
            return Err(EnvError::AlreadyExists(path.to_path_buf()));
        }
        Ok(())
    }

    async fn create_dir_if_missing(&self, path: &Path) -> Result<(), EnvError> {
        if self.files.contains_key(path) {
            return Err(EnvError::io(path, "exists and is not a directory"));
        }
        self.dirs.insert(path.to_path_buf());
        Ok(())
    }

    async fn delete_dir(&self, path: &Path) -> Result<(), EnvError> {
        if !self.dir_exists(path) {
            return Err(EnvError::NotFound(path.to_path_buf()));
        }
        if !self.children(path).is_empty() {
            return Err(EnvError::io(path, "directory is not empty"));
        }
        self.dirs.remove(path);
        Ok(())
    }

    async fn file_exists(&self, path: &Path) -> Result<(), EnvError> {
        if self.files.contains_key(path) || self.dir_exists(path) {
            Ok(())
        } else {
            Err(EnvError::NotFound(path.to_path_buf()))
        }
    }

    async fn new_writable_file(&self, path: &Path) -> Result<Self::WritableFile, EnvError> {
        if self.dirs.contains(path) {
            return Err(EnvError::io(path, "is a directory"));
        }
        let file = Arc::new(MemoryFile::default());
        self.files.insert(path.to_path_buf(), file.clone());
        Ok(MemoryWritableFile {
            path: path.to_path_buf(),
            file,
            closed: false,
        })
    }

    async fn new_sequential_file(&self, path: &Path) -> Result<Self::SequentialFile, EnvError> {
        let file = self.file(path)?;
        Ok(MemorySequentialFile { file, position: 0 })
    }

    async fn new_random_access_file(
        &self,
        path: &Path,
    ) -> Result<Self::RandomAccessFile, EnvError> {
        let file = self.file(path)?;
        Ok(MemoryRandomAccessFile {
            path: path.to_path_buf(),
            file,
        })
    }

    async fn delete_file(&self, path: &Path) -> Result<(), EnvError> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| EnvError::NotFound(path.to_path_buf()))
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<(), EnvError> {
        let (_, file) = self
            .files
            .remove(from)
            .ok_or_else(|| EnvError::NotFound(from.to_path_buf()))?;
        self.files.insert(to.to_path_buf(), file);
        Ok(())
    }

    async fn get_children(&self, dir: &Path) -> Result<Vec<String>, EnvError> {
        if !self.dir_exists(dir) {
            return Err(EnvError::NotFound(dir.to_path_buf()));
        }
        Ok(self.children(dir))
    }

    async fn get_file_size(&self, path: &Path) -> Result<u64, EnvError> {
        let file = self.file(path)?;
        Ok(file.len() as u64)
    }

    async fn lock_file(&self, path: &Path) -> Result<Self::FileLock, EnvError> {
        if !self.locks.insert(path.to_path_buf()) {
            return Err(EnvError::io(path, "lock is already held"));
        }
        Ok(MemoryFileLock {
            path: path.to_path_buf(),
        })
    }

    async fn unlock_file(&self, lock: Self::FileLock) -> Result<(), EnvError> {
        self.locks
            .remove(&lock.path)
            .map(|_| ())
            .ok_or_else(|| EnvError::io(&lock.path, "lock is not held"))
    }

    async fn get_test_directory(&self) -> Result<PathBuf, EnvError> {
        let dir = PathBuf::from("/test");
        self.create_dir_if_missing(&dir).await?;
        Ok(dir)
    }

    fn get_current_time(&self) -> Result<u64, EnvError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| EnvError::io(Path::new("<clock>"), err.to_string()))?;
        let micros = u64::try_from(now.as_micros()).unwrap_or(u64::MAX);
        let micros = micros.saturating_add(self.fake_sleep_micros.load(Ordering::Relaxed));
        Ok(micros / 1_000_000)
    }
}

#[derive(Debug)]
pub struct MemoryWritableFile {
    path: PathBuf,
    file: Arc<MemoryFile>,
    closed: bool,
}

impl WritableFile for MemoryWritableFile {
    async fn append(&mut self, data: &[u8]) -> Result<(), EnvError> {
        if self.closed {
            return Err(EnvError::io(&self.path, "append after close"));
        }
        self.file.contents.write().data.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), EnvError> {
        Ok(())
    }

    async fn sync(&mut self) -> Result<(), EnvError> {
        let mut contents = self.file.contents.write();
        contents.synced = contents.data.len();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EnvError> {
        self.closed = true;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.file.len() as u64
    }
}

#[derive(Debug)]
pub struct MemorySequentialFile {
    file: Arc<MemoryFile>,
    position: usize,
}

impl SequentialFile for MemorySequentialFile {
    async fn read(&mut self, n: usize) -> Result<Vec<u8>, EnvError> {
        let contents = self.file.contents.read();
        let start = self.position.min(contents.data.len());
        let end = start.saturating_add(n).min(contents.data.len());
        self.position = end;
        Ok(contents.data[start..end].to_vec())
    }

    async fn skip(&mut self, n: u64) -> Result<(), EnvError> {
        let n = usize::try_from(n).unwrap_or(usize::MAX);
        self.position = self.position.saturating_add(n).min(self.file.len());
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryRandomAccessFile {
    path: PathBuf,
    file: Arc<MemoryFile>,
}

impl RandomAccessFile for MemoryRandomAccessFile {
    async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, EnvError> {
        let contents = self.file.contents.read();
        let start = usize::try_from(offset)
            .ok()
            .filter(|start| *start <= contents.data.len())
            .ok_or_else(|| EnvError::io(&self.path, format!("offset {offset} is past end of file")))?;
        let end = start.saturating_add(len).min(contents.data.len());
        Ok(contents.data[start..end].to_vec())
    }

    fn size(&self) -> u64 {
        self.file.len() as u64
    }
}

#[derive(Debug)]
pub struct MemoryFileLock {
    path: PathBuf,
}
