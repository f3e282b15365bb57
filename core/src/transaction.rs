use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A single call in a one-or-many batch.
///
/// Both the legacy single-transaction method and the batch method are
/// normalized into this shape before being handed to the user-operation
/// pipeline.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub to: Option<Address>,

    #[serde(default)]
    pub data: Bytes,

    #[serde(default)]
    pub value: U256,
}

impl Call {
    /// The target address, `Address::ZERO` when absent (contract creation
    /// is not supported through the batch encoding).
    pub fn target(&self) -> Address {
        self.to.unwrap_or(Address::ZERO)
    }
}
