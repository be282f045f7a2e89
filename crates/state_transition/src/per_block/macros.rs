/// Returns `BlockOperationError::Invalid($reason)` unless `$condition` holds.
macro_rules! verify {
    ($condition: expr, $reason: expr) => {
        if !$condition {
            return Err($crate::errors::BlockOperationError::invalid($reason));
        }
    };
}
