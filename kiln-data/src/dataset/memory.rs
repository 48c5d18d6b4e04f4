use crate::dataset::{Dataset, Sample, check_index};
use crate::error::DataError;

/// Samples held in memory.
#[derive(Debug, Clone, Default)]
pub struct TensorDataset {
    samples: Vec<Sample>,
}

impl TensorDataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }
}

impl FromIterator<Sample> for TensorDataset {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Dataset for TensorDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        check_index(index, self.samples.len())?;
        Ok(self.samples[index].clone())
    }
}
