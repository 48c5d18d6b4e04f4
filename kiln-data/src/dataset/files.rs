//! File discovery under `root/<category>/...`.

use crate::error::DataError;
use std::fs::{self, DirEntry};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How a collection is split into train and test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Partition {
    /// Files live in `root/<category>/train` and `root/<category>/test`.
    Subdir,
    /// Files live in `root/<category>`; the first `floor(n * ratio)` files of
    /// each category (sorted by name) are train, the rest test.
    Ratio(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub category: String,
}

impl FileEntry {
    /// File stem, used as the sample name.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Path of a directory entry; unreadable entries are logged and skipped.
fn entry_path(entry: io::Result<DirEntry>, dir: &Path) -> Option<PathBuf> {
    match entry {
        Ok(entry) => Some(entry.path()),
        Err(e) => {
            warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
            None
        }
    }
}

/// Sorted list of files backing a dataset.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    entries: Vec<FileEntry>,
}

impl FileIndex {
    /// Collect files with `extension` for every category.
    ///
    /// A category without a directory is an error; an empty directory is not.
    pub fn scan(
        root: &Path,
        categories: &[String],
        train: bool,
        partition: Partition,
        extension: &str,
    ) -> Result<Self, DataError> {
        if let Partition::Ratio(ratio) = partition {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(DataError::InvalidArgument(format!(
                    "split ratio {} outside [0, 1]",
                    ratio
                )));
            }
        }

        let mut entries = Vec::new();
        for category in categories {
            let dir = match partition {
                Partition::Subdir => root
                    .join(category)
                    .join(if train { "train" } else { "test" }),
                Partition::Ratio(_) => root.join(category),
            };
            if !dir.is_dir() {
                return Err(DataError::MissingCategory(dir));
            }

            let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
                .filter_map(|entry| entry_path(entry, &dir))
                .filter(|path| {
                    path.is_file()
                        && path
                            .extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
                })
                .collect();
            files.sort();

            if let Partition::Ratio(ratio) = partition {
                let n_train = (files.len() as f32 * ratio).floor() as usize;
                files = if train {
                    files.into_iter().take(n_train).collect()
                } else {
                    files.into_iter().skip(n_train).collect()
                };
            }

            if files.is_empty() {
                warn!("No .{} files for category '{}' in {}", extension, category, dir.display());
            }
            debug!("Category '{}': {} files", category, files.len());

            entries.extend(files.into_iter().map(|path| FileEntry {
                path,
                category: category.clone(),
            }));
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&FileEntry, DataError> {
        self.entries.get(index).ok_or(DataError::IndexOutOfRange {
            index,
            len: self.entries.len(),
        })
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::testutil::{scratch_dir, write_cubes};

    fn cats(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_subdir_partition() {
        let root = scratch_dir("files-subdir");
        write_cubes(&root.join("chair/train"), 3, 2);
        write_cubes(&root.join("chair/test"), 1, 2);

        let train = FileIndex::scan(&root, &cats(&["chair"]), true, Partition::Subdir, "binvox")
            .unwrap();
        let test = FileIndex::scan(&root, &cats(&["chair"]), false, Partition::Subdir, "binvox")
            .unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(test.len(), 1);
        assert_eq!(train.get(0).unwrap().name(), "model_000");
        assert_eq!(train.get(0).unwrap().category, "chair");
    }

    #[test]
    fn test_ratio_partition_disjoint() {
        let root = scratch_dir("files-ratio");
        write_cubes(&root.join("can"), 8, 2);

        let train = FileIndex::scan(&root, &cats(&["can"]), true, Partition::Ratio(0.75), "binvox")
            .unwrap();
        let test = FileIndex::scan(&root, &cats(&["can"]), false, Partition::Ratio(0.75), "binvox")
            .unwrap();
        assert_eq!(train.len(), 6);
        assert_eq!(test.len(), 2);
        for entry in test.entries() {
            assert!(!train.entries().contains(entry));
        }
    }

    #[test]
    fn test_more_categories_more_files() {
        let root = scratch_dir("files-multi");
        write_cubes(&root.join("can"), 2, 2);
        write_cubes(&root.join("bowl"), 3, 2);

        let one = FileIndex::scan(&root, &cats(&["can"]), true, Partition::Ratio(1.0), "binvox")
            .unwrap();
        let two =
            FileIndex::scan(&root, &cats(&["can", "bowl"]), true, Partition::Ratio(1.0), "binvox")
                .unwrap();
        assert!(two.len() > one.len());
        assert_eq!(two.len(), 5);
    }

    #[test]
    fn test_missing_category() {
        let root = scratch_dir("files-missing");
        let result = FileIndex::scan(&root, &cats(&["sofa"]), true, Partition::Subdir, "binvox");
        assert!(matches!(result, Err(DataError::MissingCategory(_))));
    }

    #[test]
    fn test_extension_filter() {
        let root = scratch_dir("files-ext");
        write_cubes(&root.join("lamp"), 2, 2);
        std::fs::write(root.join("lamp/readme.txt"), "not a model").unwrap();
        let index = FileIndex::scan(&root, &cats(&["lamp"]), true, Partition::Ratio(1.0), "BINVOX")
            .unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_bad_ratio_rejected() {
        let root = scratch_dir("files-ratio-bad");
        let result = FileIndex::scan(&root, &cats(&["x"]), true, Partition::Ratio(1.5), "binvox");
        assert!(matches!(result, Err(DataError::InvalidArgument(_))));
    }

    #[test]
    fn test_unreadable_entry_skipped() {
        let dir = PathBuf::from("chairs");
        assert_eq!(entry_path(Err(io::Error::other("stale handle")), &dir), None);

        let root = scratch_dir("files-entry");
        fs::write(root.join("a.binvox"), b"").unwrap();
        let entry = fs::read_dir(&root).unwrap().next().unwrap();
        assert_eq!(entry_path(entry, &root), Some(root.join("a.binvox")));
    }
}
