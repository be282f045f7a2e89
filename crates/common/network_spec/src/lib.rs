pub mod b32_hex;
pub mod chain_spec;

pub use chain_spec::{ChainSpec, MAINNET, MINIMAL};
