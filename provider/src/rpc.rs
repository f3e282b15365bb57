use alloy::primitives::{Address, Bytes, U64, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wallet_core::error::WalletError;
use wallet_core::transaction::Call;

use crate::queue::RpcCall;

/// Parameters of the legacy single-transaction method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    pub from: Address,
    pub to: Option<Address>,
    pub value: Option<U256>,
    pub data: Option<Bytes>,
    pub chain_id: Option<U64>,
}

impl TransactionParams {
    /// Normalize into the one-or-many batch shape.
    pub fn into_call(self) -> Call {
        Call {
            to: self.to,
            data: self.data.unwrap_or_default(),
            value: self.value.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParams {
    pub to: Option<Address>,
    pub value: Option<U256>,
    pub data: Option<Bytes>,
}

impl From<CallParams> for Call {
    fn from(params: CallParams) -> Self {
        Call {
            to: params.to,
            data: params.data.unwrap_or_default(),
            value: params.value.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterServiceCapability {
    pub url: Option<String>,
}

/// Optional request extensions negotiated between host and wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_service: Option<PaymasterServiceCapability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCallsParams {
    pub version: Option<String>,
    pub chain_id: Option<U64>,
    pub from: Option<Address>,
    pub calls: Vec<CallParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantPermissionsParams {
    pub address: Option<Address>,
    pub chain_id: Option<U64>,
    pub expiry: Option<u64>,
    #[serde(default)]
    pub permissions: Value,
}

/// The closed set of supported methods, each with its decoded parameters.
/// Anything outside this union is rejected or passed through at the
/// boundary; nothing downstream re-validates shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletMethodCall {
    EthAccounts,
    EthChainId,
    EthRequestAccounts,
    EthSendTransaction(TransactionParams),
    WalletSendCalls(SendCallsParams),
    WalletGetCallsStatus { user_op_hash: Bytes },
    WalletGetCapabilities,
    WalletGrantPermissions(GrantPermissionsParams),
    WalletRevokePermissions,
    PersonalSign { message: Bytes, address: Address },
    EthSignTypedData { address: Address, typed_data: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRequest {
    Method(WalletMethodCall),
    /// Not ours: forwarded verbatim to the active chain's general
    /// transport.
    Passthrough,
}

fn params<T: serde::de::DeserializeOwned>(call: &RpcCall) -> Result<T, WalletError> {
    serde_json::from_value(call.params.clone()).map_err(|err| {
        WalletError::validation(format!("invalid params for {}: {err}", call.method))
    })
}

/// Parse and validate a raw call against the method union.
///
/// Unknown `wallet_*` methods fail fast with an unsupported-method error;
/// every other unknown method is the pass-through escape hatch.
pub fn parse_request(call: &RpcCall) -> Result<ParsedRequest, WalletError> {
    let method = match call.method.as_str() {
        "eth_accounts" => WalletMethodCall::EthAccounts,
        "eth_chainId" => WalletMethodCall::EthChainId,
        "eth_requestAccounts" => WalletMethodCall::EthRequestAccounts,
        "wallet_getCapabilities" => WalletMethodCall::WalletGetCapabilities,
        "wallet_revokePermissions" => WalletMethodCall::WalletRevokePermissions,
        "eth_sendTransaction" => {
            let (transaction,): (TransactionParams,) = params(call)?;
            WalletMethodCall::EthSendTransaction(transaction)
        }
        "wallet_sendCalls" => {
            let (send_calls,): (SendCallsParams,) = params(call)?;
            if send_calls.calls.is_empty() {
                return Err(WalletError::validation("wallet_sendCalls: empty call batch"));
            }
            WalletMethodCall::WalletSendCalls(send_calls)
        }
        "wallet_getCallsStatus" => {
            let (user_op_hash,): (Bytes,) = params(call)?;
            WalletMethodCall::WalletGetCallsStatus { user_op_hash }
        }
        "wallet_grantPermissions" => {
            let (grant,): (GrantPermissionsParams,) = params(call)?;
            WalletMethodCall::WalletGrantPermissions(grant)
        }
        "personal_sign" => {
            let (message, address): (Bytes, Address) = params(call)?;
            WalletMethodCall::PersonalSign { message, address }
        }
        "eth_signTypedData_v4" => {
            let (address, typed_data): (Address, String) = params(call)?;
            WalletMethodCall::EthSignTypedData {
                address,
                typed_data,
            }
        }
        unknown if unknown.starts_with("wallet_") => {
            return Err(WalletError::UnsupportedMethod {
                method: unknown.to_string(),
            });
        }
        _ => return Ok(ParsedRequest::Passthrough),
    };

    Ok(ParsedRequest::Method(method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use serde_json::json;

    fn call(method: &str, params: Value) -> RpcCall {
        RpcCall {
            id: 1,
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn unknown_wallet_method_is_unsupported() {
        let err = parse_request(&call("wallet_doMagic", json!([]))).unwrap_err();
        assert!(matches!(err, WalletError::UnsupportedMethod { method } if method == "wallet_doMagic"));
    }

    #[test]
    fn unknown_non_wallet_method_passes_through() {
        let parsed = parse_request(&call("eth_blockNumber", json!([]))).unwrap();
        assert_eq!(parsed, ParsedRequest::Passthrough);
    }

    #[test]
    fn send_calls_params_decode() {
        let parsed = parse_request(&call(
            "wallet_sendCalls",
            json!([{
                "version": "1.0",
                "chainId": "0xaa36a7",
                "from": "0x1111111111111111111111111111111111111111",
                "calls": [
                    {"to": "0x2222222222222222222222222222222222222222", "value": "0x1", "data": "0xdead"},
                    {"to": "0x3333333333333333333333333333333333333333"}
                ]
            }]),
        ))
        .unwrap();

        let ParsedRequest::Method(WalletMethodCall::WalletSendCalls(send_calls)) = parsed else {
            panic!("expected wallet_sendCalls");
        };
        assert_eq!(send_calls.chain_id, Some(U64::from(11155111)));
        assert_eq!(send_calls.calls.len(), 2);
        assert_eq!(
            send_calls.calls[1].to,
            Some(address!("0x3333333333333333333333333333333333333333"))
        );
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = parse_request(&call(
            "wallet_sendCalls",
            json!([{"calls": []}]),
        ))
        .unwrap_err();
        assert!(matches!(err, WalletError::ValidationError { .. }));
    }

    #[test]
    fn malformed_transaction_params_are_a_validation_error() {
        let err = parse_request(&call(
            "eth_sendTransaction",
            json!([{"from": "not-an-address"}]),
        ))
        .unwrap_err();
        assert!(matches!(err, WalletError::ValidationError { .. }));
    }

    #[test]
    fn legacy_transaction_normalizes_to_a_call() {
        let parsed = parse_request(&call(
            "eth_sendTransaction",
            json!([{
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
                "value": "0x5",
                "data": "0xbeef"
            }]),
        ))
        .unwrap();

        let ParsedRequest::Method(WalletMethodCall::EthSendTransaction(transaction)) = parsed
        else {
            panic!("expected eth_sendTransaction");
        };
        let single = transaction.into_call();
        assert_eq!(single.value, U256::from(5));
        assert_eq!(single.data, Bytes::from(vec![0xbe, 0xef]));
    }
}
