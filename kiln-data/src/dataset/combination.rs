//! Several datasets read in lockstep.

use crate::dataset::{Dataset, Sample};
use crate::error::DataError;
use tracing::warn;

/// Merges the fields of equal-length datasets.
///
/// Sample `i` carries the union of every member's fields at `i`; attributes
/// come from the first member. A field name present in several members keeps
/// the value from the later one.
pub struct Combination {
    members: Vec<Box<dyn Dataset>>,
}

impl Combination {
    pub fn new(members: Vec<Box<dyn Dataset>>) -> Result<Self, DataError> {
        if members.is_empty() {
            return Err(DataError::InvalidArgument(
                "combination needs at least one dataset".to_string(),
            ));
        }
        let lengths: Vec<usize> = members.iter().map(|d| d.len()).collect();
        if lengths.windows(2).any(|w| w[0] != w[1]) {
            return Err(DataError::LengthMismatch(lengths));
        }
        Ok(Self { members })
    }
}

impl Dataset for Combination {
    fn len(&self) -> usize {
        self.members[0].len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        let mut merged = self.members[0].get(index)?;
        for member in &self.members[1..] {
            let sample = member.get(index)?;
            if sample.attributes.name != merged.attributes.name {
                warn!(
                    "Combining samples with different names: '{}' and '{}'",
                    merged.attributes.name, sample.attributes.name
                );
            }
            merged.data.extend(sample.data);
        }
        Ok(merged)
    }
}
