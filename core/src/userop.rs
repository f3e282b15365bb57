use alloy::{
    core::sol_types::SolValue,
    primitives::{Address, B256, Bytes, ChainId, U256, keccak256},
    rpc::types::PackedUserOperation,
};

use crate::error::WalletError;

/// Pack two gas words into the 32-byte layout the v0.7 entrypoint hashes
/// (high word in the upper 16 bytes, low word in the lower 16).
fn pack_gas_pair(high: U256, low: U256, field: &str) -> Result<B256, WalletError> {
    let high: u128 = high
        .try_into()
        .map_err(|_| WalletError::validation(format!("{field} high word exceeds u128")))?;
    let low: u128 = low
        .try_into()
        .map_err(|_| WalletError::validation(format!("{field} low word exceeds u128")))?;

    let mut packed = [0u8; 32];
    packed[0..16].copy_from_slice(&high.to_be_bytes());
    packed[16..32].copy_from_slice(&low.to_be_bytes());
    Ok(B256::from(packed))
}

/// Reassemble `initCode` from the v0.7 split factory fields.
fn init_code(op: &PackedUserOperation) -> Bytes {
    match op.factory {
        Some(factory) if factory != Address::ZERO => {
            let mut out = factory.to_vec();
            out.extend_from_slice(&op.factory_data.clone().unwrap_or_default());
            out.into()
        }
        _ => Bytes::default(),
    }
}

/// Reassemble `paymasterAndData` from the v0.7 split paymaster fields.
fn paymaster_and_data(op: &PackedUserOperation) -> Result<Bytes, WalletError> {
    let Some(paymaster) = op.paymaster.filter(|addr| *addr != Address::ZERO) else {
        return Ok(Bytes::default());
    };

    let verification_gas: u128 = op
        .paymaster_verification_gas_limit
        .unwrap_or_default()
        .try_into()
        .map_err(|_| WalletError::validation("paymaster verification gas exceeds u128"))?;
    let post_op_gas: u128 = op
        .paymaster_post_op_gas_limit
        .unwrap_or_default()
        .try_into()
        .map_err(|_| WalletError::validation("paymaster post-op gas exceeds u128"))?;

    let mut out = paymaster.to_vec();
    out.extend_from_slice(&verification_gas.to_be_bytes());
    out.extend_from_slice(&post_op_gas.to_be_bytes());
    out.extend_from_slice(&op.paymaster_data.clone().unwrap_or_default());
    Ok(out.into())
}

/// Compute the v0.7 user operation hash: the value the designated owner key
/// signs over, and the handle the bundler indexes receipts by.
pub fn compute_user_op_hash(
    op: &PackedUserOperation,
    entrypoint: Address,
    chain_id: ChainId,
) -> Result<B256, WalletError> {
    let account_gas_limits = pack_gas_pair(
        op.verification_gas_limit,
        op.call_gas_limit,
        "accountGasLimits",
    )?;
    let gas_fees = pack_gas_pair(op.max_priority_fee_per_gas, op.max_fee_per_gas, "gasFees")?;

    // The signature is deliberately absent from the hashed tuple.
    let inner = (
        op.sender,
        op.nonce,
        keccak256(init_code(op)),
        keccak256(&op.call_data),
        account_gas_limits,
        op.pre_verification_gas,
        gas_fees,
        keccak256(paymaster_and_data(op)?),
    );
    let inner_hash = keccak256(inner.abi_encode());

    let outer = (inner_hash, entrypoint, U256::from(chain_id));
    Ok(keccak256(outer.abi_encode()))
}

/// The maximum native-token amount the entrypoint may pull from the sender
/// for an unsponsored operation. Checked against the account balance before
/// any signing attempt.
pub fn required_prefund(op: &PackedUserOperation) -> U256 {
    let mut gas = op.pre_verification_gas + op.verification_gas_limit + op.call_gas_limit;
    gas += op.paymaster_verification_gas_limit.unwrap_or_default();
    gas += op.paymaster_post_op_gas_limit.unwrap_or_default();
    gas * op.max_fee_per_gas
}
