mod error;
mod interface;
pub mod memory;

pub use error::EnvError;
pub use interface::{Env, RandomAccessFile, SequentialFile, WritableFile};
pub use memory::MemoryEnv;
