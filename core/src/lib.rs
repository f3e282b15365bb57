pub mod account;
pub mod chain;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod rpc_clients;
pub mod transaction;
pub mod userop;
