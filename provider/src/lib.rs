pub mod backend;
pub mod events;
pub mod internal;
pub mod login;
pub mod provider;
pub mod queue;
pub mod rpc;
pub mod storage;
pub mod store;
pub mod wallet;

pub use provider::Provider;
pub use wallet::{Wallet, WalletConfig};
