//! Mini-batching over a [`Dataset`].

use crate::dataset::{Attributes, Dataset, Fields, Sample};
use crate::error::DataError;
use crate::rng::SeededRng;
use ndarray::{ArrayD, ArrayViewD, Axis};
use tracing::debug;

/// Samples stacked along a new leading axis.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub data: Fields,
    pub attributes: Vec<Attributes>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn field(&self, name: &str) -> Result<&ArrayD<f32>, DataError> {
        self.data
            .get(name)
            .ok_or_else(|| DataError::MissingField(name.to_string()))
    }
}

/// Stack the fields of `samples` into one batch.
///
/// Every sample must carry the same field names with the same shapes.
pub fn collate(samples: Vec<Sample>) -> Result<Batch, DataError> {
    let Some(first) = samples.first() else {
        return Ok(Batch::default());
    };
    let names: Vec<String> = first.data.keys().cloned().collect();

    let mut data = Fields::new();
    for name in names {
        let views = samples
            .iter()
            .map(|s| {
                s.data.get(&name).map(|a| a.view()).ok_or_else(|| DataError::Collate {
                    field: name.clone(),
                    reason: format!("missing from sample '{}'", s.attributes.name),
                })
            })
            .collect::<Result<Vec<ArrayViewD<'_, f32>>, _>>()?;

        let stacked = ndarray::stack(Axis(0), &views).map_err(|e| DataError::Collate {
            field: name.clone(),
            reason: format!(
                "{} (shapes {:?})",
                e,
                views.iter().map(|v| v.shape().to_vec()).collect::<Vec<_>>()
            ),
        })?;
        data.insert(name, stacked);
    }

    let attributes = samples.into_iter().map(|s| s.attributes).collect();
    Ok(Batch { data, attributes })
}

/// Yields batches of `batch_size` samples; the last batch may be smaller.
#[derive(Debug, Clone)]
pub struct DataLoader<D> {
    dataset: D,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
    epoch: u64,
}

impl<D: Dataset> DataLoader<D> {
    pub fn new(dataset: D, batch_size: usize) -> Result<Self, DataError> {
        if batch_size == 0 {
            return Err(DataError::InvalidArgument(
                "batch size must be positive".to_string(),
            ));
        }
        Ok(Self {
            dataset,
            batch_size,
            shuffle: false,
            seed: 0,
            epoch: 0,
        })
    }

    /// Visit samples in a fresh random order every epoch.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    /// One pass over the dataset.
    pub fn iter(&mut self) -> Batches<'_, D> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            SeededRng::derive(self.seed, self.epoch).shuffle(&mut order);
        }
        self.epoch += 1;
        debug!(
            "Loader epoch {}: {} samples in {} batches",
            self.epoch,
            order.len(),
            self.num_batches()
        );
        Batches {
            dataset: &self.dataset,
            order,
            batch_size: self.batch_size,
            cursor: 0,
        }
    }
}

pub struct Batches<'a, D> {
    dataset: &'a D,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<D: Dataset> Iterator for Batches<'_, D> {
    type Item = Result<Batch, DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let samples = indices
            .iter()
            .map(|&i| self.dataset.get(i))
            .collect::<Result<Vec<_>, _>>();
        Some(samples.and_then(collate))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl<D: Dataset> ExactSizeIterator for Batches<'_, D> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TensorDataset;

    fn numbered(n: usize) -> TensorDataset {
        (0..n)
            .map(|i| {
                Sample::new(Attributes {
                    name: i.to_string(),
                    ..Default::default()
                })
                .with_field("x", ArrayD::from_elem(vec![2, 2], i as f32))
            })
            .collect()
    }

    fn seen(loader: &mut DataLoader<TensorDataset>) -> Vec<usize> {
        loader
            .iter()
            .flat_map(|b| b.unwrap().attributes)
            .map(|a| a.name.parse().unwrap())
            .collect()
    }

    #[test]
    fn test_batch_count_and_partial_batch() {
        let mut loader = DataLoader::new(numbered(10), 4).unwrap();
        assert_eq!(loader.num_batches(), 3);
        let batches: Vec<Batch> = loader.iter().map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].field("x").unwrap().shape(), &[4, 2, 2]);
        assert_eq!(batches[2].len(), 2);
        assert_eq!(batches[2].field("x").unwrap().shape(), &[2, 2, 2]);
    }

    #[test]
    fn test_sequential_order() {
        let mut loader = DataLoader::new(numbered(5), 2).unwrap();
        assert_eq!(seen(&mut loader), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shuffle_covers_every_sample_once() {
        let mut loader = DataLoader::new(numbered(20), 3).unwrap().shuffled(11);
        let first = seen(&mut loader);
        let second = seen(&mut loader);
        for order in [&first, &second] {
            let mut sorted = order.clone();
            sorted.sort();
            assert_eq!(sorted, (0..20).collect::<Vec<_>>());
        }
        assert_ne!(first, second);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(DataLoader::new(numbered(3), 0).is_err());
    }

    #[test]
    fn test_collate_shape_mismatch() {
        let a = Sample::new(Attributes::default()).with_field("x", ArrayD::zeros(vec![2]));
        let b = Sample::new(Attributes::default()).with_field("x", ArrayD::zeros(vec![3]));
        assert!(matches!(
            collate(vec![a, b]),
            Err(DataError::Collate { field, .. }) if field == "x"
        ));
    }

    #[test]
    fn test_collate_missing_field() {
        let a = Sample::new(Attributes::default()).with_field("x", ArrayD::zeros(vec![2]));
        let b = Sample::new(Attributes::default());
        assert!(matches!(collate(vec![a, b]), Err(DataError::Collate { .. })));
    }

    #[test]
    fn test_collate_values() {
        let batch = collate(vec![
            Sample::new(Attributes::default()).with_field("x", ArrayD::from_elem(vec![3], 1.0)),
            Sample::new(Attributes::default()).with_field("x", ArrayD::from_elem(vec![3], 2.0)),
        ])
        .unwrap();
        let x = batch.field("x").unwrap();
        assert_eq!(x.shape(), &[2, 3]);
        assert_eq!(x[[1, 0]], 2.0);
        assert_eq!(x.sum(), 9.0);
    }
}
