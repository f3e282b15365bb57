use alloy::{
    primitives::{Address, B256, Bytes, bytes, keccak256},
    sol,
    sol_types::{SolCall, SolValue},
};

mod default;

pub use default::DefaultAccountFactory;

sol! {
    function createAccount(address owner, bytes salt) returns (address);
}

/// Interface for smart account factory implementations.
pub trait AccountFactory {
    fn factory_address(&self) -> &Address;

    /// Predicts the smart account address for a given owner without touching
    /// the chain.
    fn predict_address(&self, owner: &Address, salt_data: &Bytes) -> Address;

    /// Calldata for deploying the account through the factory, carried in
    /// the first user operation's init fields.
    fn init_calldata(&self, owner: Address, salt_data: Bytes) -> Vec<u8> {
        createAccountCall {
            owner,
            salt: salt_data,
        }
        .abi_encode()
    }
}

pub(crate) fn generate_salt(owner: &Address, data: &Bytes) -> B256 {
    keccak256((owner, data).abi_encode_params())
}

/// CREATE2 address of a minimal-proxy clone, the deployment shape the
/// default factory uses.
pub(crate) fn predict_clone_address(
    implementation: Address,
    salt: B256,
    deployer: Address,
) -> Address {
    let prefix = bytes!("0x3d602d80600a3d3981f3363d3d373d3d3d363d73");
    let suffix = bytes!("0x5af43d82803e903d91602b57fd5bf3");

    // The 55-byte EIP-1167 init code with the implementation spliced in.
    let mut init_code = Vec::with_capacity(55);
    init_code.extend_from_slice(&prefix);
    init_code.extend_from_slice(implementation.as_slice());
    init_code.extend_from_slice(&suffix);

    deployer.create2(salt, keccak256(&init_code))
}
