pub mod altair;
pub mod block;
pub mod errors;
pub mod flat_validator;
pub mod forked;
pub mod phase0;
pub mod serde_helpers;
pub mod view;

pub use errors::BeaconStateError;
pub use forked::{ForkedBeaconState, ForkedSignedBeaconBlock};
