use std::path::PathBuf;
use std::sync::Arc;

use derive_new::new;

use crate::env::{Env, RandomAccessFile};
use crate::error::{ControlError, Result};
use crate::level::FileMetadata;

const VERIFY_CHUNK: usize = 64 << 10;

/// A file written by a compaction, as reported by the executor.
#[derive(Debug, Clone, new)]
pub struct CompactionOutput {
    pub path: PathBuf,
    pub file: Arc<FileMetadata>,
    /// CRC32 of the whole file, see [`output_checksum`].
    pub checksum: u32,
}

pub fn output_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Reads `output` back through `env` and checks it against the size and checksum the
/// executor reported.
pub async fn verify_output_file<E: Env>(env: &E, output: &CompactionOutput) -> Result<()> {
    let path = output.path.display();
    let size = env.get_file_size(&output.path).await?;
    if size != output.file.size() {
        return Err(ControlError::Corruption(format!(
            "{path}: size is {size}, expected {}",
            output.file.size()
        )));
    }

    let file = env.new_random_access_file(&output.path).await?;
    let mut hasher = crc32fast::Hasher::new();
    let mut offset = 0;
    while offset < size {
        let chunk = file.read(offset, VERIFY_CHUNK).await?;
        if chunk.is_empty() {
            return Err(ControlError::Corruption(format!(
                "{path}: unexpected end of file at {offset}"
            )));
        }
        hasher.update(&chunk);
        offset += chunk.len() as u64;
    }

    let checksum = hasher.finalize();
    if checksum != output.checksum {
        return Err(ControlError::Corruption(format!(
            "{path}: checksum is {checksum:#010x}, expected {:#010x}",
            output.checksum
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::compact::{CompactionOutput, output_checksum, verify_output_file};
    use crate::env::{Env, MemoryEnv, WritableFile};
    use crate::error::ControlError;
    use crate::test_utils::file;

    async fn write(env: &MemoryEnv, path: &Path, data: &[u8]) {
        let mut writer = env.new_writable_file(path).await.unwrap();
        writer.append(data).await.unwrap();
        writer.sync().await.unwrap();
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_output_file() {
        let env = MemoryEnv::new();
        let path = Path::new("/db/000012.sst");
        let data = vec![7u8; 200 << 10];
        write(&env, path, &data).await;

        let output = CompactionOutput::new(
            path.to_path_buf(),
            file(12, "a", "z", data.len() as u64),
            output_checksum(&data),
        );
        verify_output_file(&env, &output).await.unwrap();

        let wrong_checksum = CompactionOutput {
            checksum: output.checksum ^ 1,
            ..output.clone()
        };
        assert!(matches!(
            verify_output_file(&env, &wrong_checksum).await,
            Err(ControlError::Corruption(_))
        ));

        let wrong_size = CompactionOutput {
            file: file(12, "a", "z", 1),
            ..output.clone()
        };
        assert!(matches!(
            verify_output_file(&env, &wrong_size).await,
            Err(ControlError::Corruption(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_detects_scribbled_tail() {
        let env = MemoryEnv::new();
        let path = Path::new("/db/000013.sst");
        let data = b"some sorted run".to_vec();
        let mut writer = env.new_writable_file(path).await.unwrap();
        writer.append(&data).await.unwrap();
        env.corrupt_buffer(path).unwrap();

        let output = CompactionOutput::new(
            path.to_path_buf(),
            file(13, "a", "z", data.len() as u64),
            output_checksum(&data),
        );
        assert!(verify_output_file(&env, &output).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_output() {
        let env = MemoryEnv::new();
        let output = CompactionOutput::new("/db/missing.sst".into(), file(1, "a", "b", 0), 0);
        assert!(matches!(
            verify_output_file(&env, &output).await,
            Err(ControlError::Env(err)) if err.is_not_found()
        ));
    }
}
