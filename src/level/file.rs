use bytes::Bytes;
use derive_new::new;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Inclusive user-key range `[smallest, largest]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
pub struct KeyRange {
    #[new(into)]
    pub smallest: Bytes,
    #[new(into)]
    pub largest: Bytes,
}

impl KeyRange {
    pub fn overlaps(&self, other: &KeyRange) -> bool {
        self.smallest <= other.largest && other.smallest <= self.largest
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.smallest.as_ref() <= key && key <= self.largest.as_ref()
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &KeyRange) -> KeyRange {
        KeyRange {
            smallest: self.smallest.clone().min(other.smallest.clone()),
            largest: self.largest.clone().max(other.largest.clone()),
        }
    }

    /// Range covered by `files`, `None` for no files.
    pub fn covering<'a>(files: impl IntoIterator<Item = &'a FileMetadata>) -> Option<KeyRange> {
        files
            .into_iter()
            .map(FileMetadata::range)
            .reduce(|covered, range| covered.union(&range))
    }
}

/// What the control plane knows about one sorted file.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters, CopyGetters,
)]
pub struct FileMetadata {
    #[getset(get_copy = "pub")]
    id: u64,
    #[getset(get_copy = "pub")]
    size: u64,
    /// Size with deletion entries weighted up, used to rank files.
    #[builder(default = size)]
    #[getset(get_copy = "pub")]
    compensated_size: u64,
    #[builder(setter(into))]
    #[getset(get = "pub")]
    smallest: Bytes,
    #[builder(setter(into))]
    #[getset(get = "pub")]
    largest: Bytes,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    smallest_seqno: u64,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    largest_seqno: u64,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    being_compacted: bool,
}

impl FileMetadata {
    pub fn range(&self) -> KeyRange {
        KeyRange::new(self.smallest.clone(), self.largest.clone())
    }

    pub fn overlaps(&self, range: &KeyRange) -> bool {
        self.smallest <= range.largest && range.smallest <= self.largest
    }

    pub fn with_being_compacted(&self, being_compacted: bool) -> Self {
        Self {
            being_compacted,
            ..self.clone()
        }
    }
}
