use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use getset::{CopyGetters, Getters};
use itertools::Itertools;

use crate::level::{FileMetadata, KeyRange};
use crate::options::OptionsSnapshot;

/// Everything an executor needs to run one compaction.
///
/// The task keeps the options snapshot it was picked under, later option changes do not
/// affect it.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct CompactionTask {
    #[getset(get_copy = "pub")]
    level: usize,
    #[getset(get_copy = "pub")]
    output_level: usize,
    #[getset(get = "pub")]
    inputs: Vec<Arc<FileMetadata>>,
    /// Files of the output level overlapping the inputs. They are rewritten too.
    #[getset(get = "pub")]
    outputs: Vec<Arc<FileMetadata>>,
    /// Files of the level below the output level overlapping the compacted range.
    #[getset(get = "pub")]
    grandparents: Vec<Arc<FileMetadata>>,
    #[getset(get_copy = "pub")]
    max_output_file_size: u64,
    #[getset(get_copy = "pub")]
    max_grandparent_overlap_bytes: u64,
    #[getset(get_copy = "pub")]
    max_subcompactions: u32,
    #[getset(get_copy = "pub")]
    manual: bool,
    #[getset(get = "pub")]
    options: Arc<OptionsSnapshot>,
}

impl CompactionTask {
    pub(crate) fn new(
        options: Arc<OptionsSnapshot>,
        level: usize,
        inputs: Vec<Arc<FileMetadata>>,
        outputs: Vec<Arc<FileMetadata>>,
        grandparents: Vec<Arc<FileMetadata>>,
        manual: bool,
    ) -> crate::error::Result<Self> {
        let output_level = level + 1;
        let max_output_file_size = options
            .max_file_size_for_level(output_level)?
            .min(options.max_file_size_for_compaction());
        let max_grandparent_overlap_bytes = options.max_grandparent_overlap_bytes(level)?;
        Ok(Self {
            level,
            output_level,
            inputs,
            outputs,
            grandparents,
            max_output_file_size,
            max_grandparent_overlap_bytes,
            max_subcompactions: options.options().max_subcompactions,
            manual,
            options,
        })
    }

    pub fn options_version(&self) -> u64 {
        self.options.version()
    }

    pub fn verify_checksums(&self) -> bool {
        self.options.options().verify_checksums_in_compaction
    }

    pub fn paranoid_file_checks(&self) -> bool {
        self.options.options().paranoid_file_checks
    }

    pub fn measure_io_stats(&self) -> bool {
        self.options.options().compaction_measure_io_stats
    }

    /// Bytes read by the compaction, inputs and output-level files together.
    pub fn input_bytes(&self) -> u64 {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .map(|file| file.size())
            .sum()
    }

    pub fn grandparent_bytes(&self) -> u64 {
        self.grandparents.iter().map(|file| file.size()).sum()
    }

    pub fn file_ids(&self) -> HashSet<u64> {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .map(|file| file.id())
            .collect()
    }

    /// A single input with nothing to merge against can be moved down without rewriting,
    /// unless that would leave it overlapping too much of the grandparent level.
    pub fn is_trivial_move(&self) -> bool {
        !self.manual
            && self.inputs.len() == 1
            && self.outputs.is_empty()
            && self.grandparent_bytes() <= self.max_grandparent_overlap_bytes
    }

    pub fn grandparent_tracker(&self) -> GrandparentOverlapTracker {
        GrandparentOverlapTracker::new(
            self.grandparents.clone(),
            self.max_grandparent_overlap_bytes,
        )
    }

    /// Splits the task into at most `max_subcompactions` disjoint key ranges that together
    /// cover it, cutting only at file boundaries and roughly balancing bytes.
    pub fn subcompaction_ranges(&self) -> Vec<SubcompactionRange> {
        let files: Vec<&FileMetadata> = self
            .inputs
            .iter()
            .chain(&self.outputs)
            .map(Arc::as_ref)
            .collect();
        let Some(covered) = KeyRange::covering(files.iter().copied()) else {
            return Vec::new();
        };
        let total: u64 = files.iter().map(|file| file.size()).sum();
        let wanted = u128::from(self.max_subcompactions.max(1));

        let candidates = files
            .iter()
            .map(|file| file.smallest().clone())
            .filter(|key| *key > covered.smallest)
            .sorted()
            .dedup();

        let mut starts = vec![covered.smallest.clone()];
        for key in candidates {
            let made = starts.len() as u128;
            if made >= wanted {
                break;
            }
            // a file counts half once it starts before the cut and fully once it ends before it
            let twice_before: u128 = files
                .iter()
                .map(|file| {
                    let halves =
                        u128::from(*file.smallest() < key) + u128::from(*file.largest() < key);
                    halves * u128::from(file.size())
                })
                .sum();
            if twice_before * wanted >= 2 * u128::from(total) * made {
                starts.push(key);
            }
        }

        let ends = starts.iter().skip(1).cloned().map(Some).chain([None]);
        starts
            .iter()
            .cloned()
            .zip(ends)
            .map(|(start, end)| SubcompactionRange { start, end })
            .collect()
    }
}

/// `[start, end)`, open ended when `end` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcompactionRange {
    pub start: Bytes,
    pub end: Option<Bytes>,
}

impl SubcompactionRange {
    pub fn contains(&self, key: &[u8]) -> bool {
        self.start.as_ref() <= key && self.end.as_ref().is_none_or(|end| key < end.as_ref())
    }
}

/// Tells an executor when to close the current output file so that no output file overlaps
/// more than the allowed bytes of the grandparent level.
#[derive(Debug)]
pub struct GrandparentOverlapTracker {
    grandparents: Vec<Arc<FileMetadata>>,
    index: usize,
    seen_key: bool,
    overlapped_bytes: u64,
    max_overlap_bytes: u64,
}

impl GrandparentOverlapTracker {
    pub fn new(grandparents: Vec<Arc<FileMetadata>>, max_overlap_bytes: u64) -> Self {
        Self {
            grandparents,
            index: 0,
            seen_key: false,
            overlapped_bytes: 0,
            max_overlap_bytes,
        }
    }

    /// Called with keys in ascending order. `true` means `key` should start a new output file.
    pub fn should_stop_before(&mut self, key: &[u8]) -> bool {
        while let Some(file) = self.grandparents.get(self.index) {
            if key <= file.largest().as_ref() {
                break;
            }
            if self.seen_key {
                self.overlapped_bytes += file.size();
            }
            self.index += 1;
        }
        self.seen_key = true;

        if self.overlapped_bytes > self.max_overlap_bytes {
            self.overlapped_bytes = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use proptest::prop_assert;
    use test_strategy::proptest;

    use crate::compact::{CompactionTask, GrandparentOverlapTracker, SubcompactionRange};
    use crate::level::FileMetadata;
    use crate::test_utils::{file, snapshot_with};

    fn task(
        inputs: Vec<Arc<FileMetadata>>,
        outputs: Vec<Arc<FileMetadata>>,
        grandparents: Vec<Arc<FileMetadata>>,
        max_subcompactions: u32,
    ) -> CompactionTask {
        let options = snapshot_with(|options| {
            options.target_file_size_base = 100;
            options.max_grandparent_overlap_factor = 2;
            options.max_subcompactions = max_subcompactions;
        });
        CompactionTask::new(options, 1, inputs, outputs, grandparents, false).unwrap()
    }

    #[test]
    fn test_task_limits() {
        let task = task(vec![file(1, "a", "c", 50)], vec![file(2, "b", "d", 70)], vec![], 1);
        assert_eq!(task.output_level(), 2);
        assert_eq!(task.max_output_file_size(), 100);
        assert_eq!(task.max_grandparent_overlap_bytes(), 200);
        assert_eq!(task.input_bytes(), 120);
        assert_eq!(task.options_version(), 1);
        assert_eq!(task.file_ids().len(), 2);
        assert!(!task.is_trivial_move());
    }

    #[test]
    fn test_trivial_move() {
        let task1 = task(vec![file(1, "a", "c", 50)], vec![], vec![file(3, "a", "z", 200)], 1);
        assert!(task1.is_trivial_move());
        let task2 = task(vec![file(1, "a", "c", 50)], vec![], vec![file(3, "a", "z", 201)], 1);
        assert!(!task2.is_trivial_move());
    }

    #[test]
    fn test_grandparent_tracker() {
        let mut tracker = GrandparentOverlapTracker::new(
            vec![file(1, "a", "b", 10), file(2, "c", "d", 10), file(3, "e", "f", 10)],
            15,
        );
        assert!(!tracker.should_stop_before(b"a"));
        assert!(!tracker.should_stop_before(b"c"));
        assert!(tracker.should_stop_before(b"e"));
        assert!(!tracker.should_stop_before(b"f"));
        assert!(!tracker.should_stop_before(b"z"));
    }

    #[test]
    fn test_single_subcompaction() {
        let task = task(vec![file(1, "a", "c", 50)], vec![file(2, "b", "d", 70)], vec![], 1);
        assert_eq!(
            task.subcompaction_ranges(),
            vec![SubcompactionRange {
                start: Bytes::from("a"),
                end: None
            }]
        );
    }

    #[test]
    fn test_balanced_subcompactions() {
        let inputs = vec![
            file(1, "a", "b", 10),
            file(2, "c", "d", 10),
            file(3, "e", "f", 10),
            file(4, "g", "h", 10),
        ];
        let starts = |max_subcompactions| {
            task(inputs.clone(), vec![], vec![], max_subcompactions)
                .subcompaction_ranges()
                .into_iter()
                .map(|range| range.start)
                .collect::<Vec<_>>()
        };
        assert_eq!(starts(2), vec![Bytes::from("a"), Bytes::from("e")]);
        assert_eq!(
            starts(4),
            vec![Bytes::from("a"), Bytes::from("c"), Bytes::from("e"), Bytes::from("g")]
        );
        assert_eq!(starts(16).len(), 4);
    }

    #[proptest]
    fn subcompaction_ranges_partition_the_task(
        #[strategy(proptest::collection::vec((0u8..50, 0u8..10, 1u64..1000), 1..20))] shapes: Vec<(
            u8,
            u8,
            u64,
        )>,
        #[strategy(1u32..8)] max_subcompactions: u32,
    ) {
        let files = shapes
            .iter()
            .enumerate()
            .map(|(id, &(start, len, size))| {
                let smallest = format!("{start:03}");
                let largest = format!("{:03}", start + len);
                file(id as u64, &smallest, &largest, size)
            })
            .collect::<Vec<_>>();
        let task = task(files.clone(), vec![], vec![], max_subcompactions);
        let ranges = task.subcompaction_ranges();

        prop_assert!(!ranges.is_empty());
        prop_assert!(ranges.len() <= max_subcompactions as usize);
        for pair in ranges.windows(2) {
            prop_assert!(pair[0].end.as_ref() == Some(&pair[1].start));
            prop_assert!(pair[0].start < pair[1].start);
        }
        prop_assert!(ranges.last().is_some_and(|range| range.end.is_none()));
        for file in &files {
            prop_assert!(file.smallest() >= &ranges[0].start);
            let owners = ranges
                .iter()
                .filter(|range| range.contains(file.smallest()))
                .count();
            prop_assert!(owners == 1);
        }
    }
}
