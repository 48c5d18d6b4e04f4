//! Point clouds stored as PLY.

use crate::dataset::{Attributes, Dataset, FileIndex, Partition, Sample, field};
use crate::error::DataError;
use crate::ply::load_ply;
use crate::rng::SeededRng;
use crate::types::PointCloud;
use std::path::Path;
use tracing::debug;

/// Point clouds read from `.ply` files.
///
/// Fields: `points` `(N, 3)` and, when every vertex carries `nx ny nz`,
/// `normals` `(N, 3)`.
#[derive(Debug, Clone)]
pub struct PointDataset {
    index: FileIndex,
    num_points: Option<usize>,
    seed: u64,
}

impl PointDataset {
    pub fn new(
        root: &Path,
        categories: &[String],
        train: bool,
        partition: Partition,
    ) -> Result<Self, DataError> {
        Ok(Self {
            index: FileIndex::scan(root, categories, train, partition, "ply")?,
            num_points: None,
            seed: 0,
        })
    }

    /// Resample every cloud to exactly `num_points` points.
    ///
    /// Sampling is without replacement when the cloud is large enough and
    /// with replacement otherwise. It depends only on `seed` and the sample
    /// index, so repeated reads return the same points.
    pub fn with_num_points(mut self, num_points: usize, seed: u64) -> Self {
        self.num_points = Some(num_points);
        self.seed = seed;
        self
    }
}

pub(crate) fn resample(cloud: &PointCloud, num_points: usize, rng: &mut SeededRng) -> PointCloud {
    let n = cloud.len();
    if n == 0 {
        return cloud.clone();
    }
    let indices: Vec<usize> = if n >= num_points {
        let mut all: Vec<usize> = (0..n).collect();
        rng.shuffle(&mut all);
        all.truncate(num_points);
        all
    } else {
        (0..num_points).map(|_| rng.below(n)).collect()
    };
    cloud.select(&indices)
}

impl Dataset for PointDataset {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        let entry = self.index.get(index)?;
        let ply = load_ply(&entry.path)?;
        let mut cloud = PointCloud::from(&ply);

        if let Some(num_points) = self.num_points {
            let mut rng = SeededRng::derive(self.seed, index as u64);
            debug!("Resampling {} points to {}", cloud.len(), num_points);
            cloud = resample(&cloud, num_points, &mut rng);
        }

        let attributes = Attributes {
            name: entry.name(),
            path: Some(entry.path.clone()),
            category: entry.category.clone(),
        };
        let mut sample = Sample::new(attributes).with_field(field::POINTS, cloud.points_tensor());
        if let Some(normals) = cloud.normals_tensor() {
            sample = sample.with_field(field::NORMALS, normals);
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn line(n: usize) -> PointCloud {
        PointCloud::with_normals(
            (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
            vec![Vec3::Y; n],
        )
    }

    #[test]
    fn test_resample_down_is_distinct() {
        let mut rng = SeededRng::new(9);
        let picked = resample(&line(100), 10, &mut rng);
        assert_eq!(picked.len(), 10);
        let mut xs: Vec<i32> = picked.points.iter().map(|p| p.x as i32).collect();
        xs.sort();
        xs.dedup();
        assert_eq!(xs.len(), 10);
        assert_eq!(picked.normals.unwrap().len(), 10);
    }

    #[test]
    fn test_resample_up_repeats() {
        let mut rng = SeededRng::new(9);
        let picked = resample(&line(3), 50, &mut rng);
        assert_eq!(picked.len(), 50);
        assert!(picked.points.iter().all(|p| p.x < 3.0));
    }

    #[test]
    fn test_resample_deterministic_per_seed() {
        let a = resample(&line(40), 5, &mut SeededRng::derive(1, 7));
        let b = resample(&line(40), 5, &mut SeededRng::derive(1, 7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_category() {
        let root = std::env::temp_dir().join("kiln-data-points-none");
        let result = PointDataset::new(&root, &["ghost".to_string()], true, Partition::Subdir);
        assert!(matches!(result, Err(DataError::MissingCategory(_))));
    }
}
