mod initiate_validator_exit;
mod slash_validator;

pub mod altair;
pub mod attestation;
pub mod base;
pub mod sync_committee;

pub use attestation::{get_attesting_indices, get_indexed_attestation, is_valid_indexed_attestation};
pub use initiate_validator_exit::initiate_validator_exit;
pub use slash_validator::slash_validator;

/// Intersection of two strictly increasing index lists, in increasing order.
pub fn sorted_intersection(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut intersection = vec![];
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                intersection.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    intersection
}
