//! Operations on the per-validator participation flag byte.

use ember_consensus_misc::constants::NUM_FLAG_INDICES;

pub fn add_flag(flags: u8, flag_index: u8) -> u8 {
    flags | (1 << flag_index)
}

pub fn has_flag(flags: u8, flag_index: u8) -> bool {
    let flag = 1 << flag_index;
    flags & flag == flag
}

/// All flag indices, in weight order.
pub fn flag_indices() -> impl Iterator<Item = u8> {
    0..NUM_FLAG_INDICES as u8
}

#[cfg(test)]
mod tests {
    use ember_consensus_misc::constants::{
        TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX,
    };

    use super::*;

    #[test]
    fn test_flags_are_independent_bits() {
        let flags = add_flag(0, TIMELY_TARGET_FLAG_INDEX);
        assert_eq!(flags, 0b010);
        assert!(has_flag(flags, TIMELY_TARGET_FLAG_INDEX));
        assert!(!has_flag(flags, TIMELY_SOURCE_FLAG_INDEX));

        let flags = add_flag(add_flag(flags, TIMELY_HEAD_FLAG_INDEX), TIMELY_HEAD_FLAG_INDEX);
        assert_eq!(flags, 0b110);
        assert_eq!(flag_indices().filter(|&i| has_flag(flags, i)).count(), 2);
    }
}
