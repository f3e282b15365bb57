use std::collections::HashMap;
use std::sync::Mutex;

use alloy::{
    providers::{ProviderBuilder, RootProvider},
    rpc::client::RpcClient,
    transports::http::reqwest::{ClientBuilder as HttpClientBuilder, Url},
};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::rpc_clients::{BundlerClient, PaymasterClient, transport::TransportPool};

/// One chain's set of network collaborators: general RPC, bundler, and an
/// optional paymaster, all selected by chain id.
pub trait Chain: Send + Sync {
    fn chain_id(&self) -> u64;
    fn rpc_url(&self) -> Url;
    fn bundler_url(&self) -> Url;
    fn paymaster_url(&self) -> Option<Url>;

    fn provider(&self) -> &RootProvider;
    fn bundler_client(&self) -> &BundlerClient;
    fn paymaster_client(&self) -> Option<&PaymasterClient>;
}

/// Static per-chain endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub bundler_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_url: Option<String>,
}

impl ChainDescriptor {
    pub fn to_chain(&self) -> Result<ConfiguredChain, WalletError> {
        let parse = |url: &str, what: &str| {
            Url::parse(url).map_err(|e| WalletError::RpcConfigError {
                message: format!("Failed to parse {what} URL for chain {}: {e}", self.chain_id),
            })
        };

        let rpc_url = parse(&self.rpc_url, "RPC")?;
        let bundler_url = parse(&self.bundler_url, "bundler")?;
        let paymaster_url = self
            .paymaster_url
            .as_deref()
            .map(|url| parse(url, "paymaster"))
            .transpose()?;

        let http_client =
            HttpClientBuilder::new()
                .build()
                .map_err(|e| WalletError::RpcConfigError {
                    message: format!("Failed to build HTTP client: {e}"),
                })?;
        let pool = TransportPool::new(http_client);

        let bundler_rpc_client =
            RpcClient::builder().transport(pool.transport(bundler_url.clone()), false);
        let paymaster_client = paymaster_url.clone().map(|url| {
            PaymasterClient::from_rpc_client(
                RpcClient::builder().transport(pool.transport(url), false),
            )
        });

        Ok(ConfiguredChain {
            chain_id: self.chain_id,
            name: self.name.clone(),
            rpc_url: rpc_url.clone(),
            bundler_url,
            paymaster_url,
            bundler_client: BundlerClient::from_rpc_client(bundler_rpc_client),
            paymaster_client,
            provider: ProviderBuilder::new()
                .disable_recommended_fillers()
                .connect_http(rpc_url),
        })
    }
}

/// A chain with its clients built. Clients are stateless request/response
/// wrappers, safe to clone and reuse concurrently.
#[derive(Clone)]
pub struct ConfiguredChain {
    chain_id: u64,
    pub name: String,

    rpc_url: Url,
    bundler_url: Url,
    paymaster_url: Option<Url>,

    pub provider: RootProvider,
    pub bundler_client: BundlerClient,
    pub paymaster_client: Option<PaymasterClient>,
}

impl Chain for ConfiguredChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn rpc_url(&self) -> Url {
        self.rpc_url.clone()
    }

    fn bundler_url(&self) -> Url {
        self.bundler_url.clone()
    }

    fn paymaster_url(&self) -> Option<Url> {
        self.paymaster_url.clone()
    }

    fn provider(&self) -> &RootProvider {
        &self.provider
    }

    fn bundler_client(&self) -> &BundlerClient {
        &self.bundler_client
    }

    fn paymaster_client(&self) -> Option<&PaymasterClient> {
        self.paymaster_client.as_ref()
    }
}

pub trait ChainService {
    fn get_chain(&self, chain_id: u64) -> Result<impl Chain, WalletError>;
}

/// The configured chain set, with clients cached per chain id for the
/// process lifetime.
pub struct ChainRegistry {
    descriptors: HashMap<u64, ChainDescriptor>,
    cache: Mutex<HashMap<u64, ConfiguredChain>>,
}

impl ChainRegistry {
    pub fn new(descriptors: Vec<ChainDescriptor>) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.chain_id, descriptor))
                .collect(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.descriptors.contains_key(&chain_id)
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.descriptors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn descriptor(&self, chain_id: u64) -> Option<&ChainDescriptor> {
        self.descriptors.get(&chain_id)
    }

    /// Concrete accessor for callers that need to hold on to the chain.
    pub fn get(&self, chain_id: u64) -> Result<ConfiguredChain, WalletError> {
        let mut cache = self.cache.lock().expect("chain cache lock poisoned");

        if let Some(chain) = cache.get(&chain_id) {
            return Ok(chain.clone());
        }

        let descriptor =
            self.descriptors
                .get(&chain_id)
                .ok_or_else(|| WalletError::RpcConfigError {
                    message: format!("chain {chain_id} is not configured"),
                })?;

        let chain = descriptor.to_chain()?;
        cache.insert(chain_id, chain.clone());
        Ok(chain)
    }
}

impl ChainService for ChainRegistry {
    fn get_chain(&self, chain_id: u64) -> Result<impl Chain, WalletError> {
        self.get(chain_id)
    }
}
