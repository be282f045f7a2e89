pub mod beacon_block;
pub mod beacon_state;
pub mod participation_flags;
pub mod sync_aggregate;
