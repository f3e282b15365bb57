mod bundler;
mod paymaster;
pub mod transport;

pub use bundler::*;
pub use paymaster::*;
