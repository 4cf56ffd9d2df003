use rand::seq::SliceRandom;
use rand::Rng;

use crate::utilities::validation::{validate_non_empty, ValidationError};

/// Treatment labels from consecutive, independently shuffled copies of
/// `block`, truncated to `n`.
pub fn randomize_by_fixed_block<R: Rng + ?Sized>(
    n: usize,
    block: &[String],
    rng: &mut R,
) -> Result<Vec<String>, ValidationError> {
    validate_non_empty(block, "block")?;
    let mut assignments = Vec::with_capacity(n);
    let mut current = block.to_vec();
    while assignments.len() < n {
        current.shuffle(rng);
        let take = (n - assignments.len()).min(current.len());
        assignments.extend_from_slice(&current[..take]);
    }
    Ok(assignments)
}
