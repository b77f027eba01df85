use crate::program;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use solana_commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_pubkey::{Pubkey, pubkey};
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use std::{collections::HashMap, num::NonZeroUsize, str::FromStr, time::Duration};
use thiserror::Error as ThisError;

/// Environment variables read by [`ClaimConfig::from_env`].
pub mod env {
    pub const NETWORK: &str = "SOLANA_NETWORK";
    pub const RPC_URL: &str = "SOLANA_RPC_URL";
    pub const PROGRAM_ID: &str = "REFERRAL_PROGRAM_ID";
    pub const LOOKUP_TABLE: &str = "LOOKUP_TABLE";
    pub const CLAIMS_PER_TRANSACTION: &str = "CLAIMS_PER_TRANSACTION";
    pub const COMPUTE_UNIT_MARGIN: &str = "COMPUTE_UNIT_MARGIN";
    pub const PRIORITY_FEE: &str = "PRIORITY_FEE";
    pub const HELIUS_API_KEY: &str = "HELIUS_API_KEY";
    pub const MAX_ACCOUNTS_PER_REQUEST: &str = "MAX_ACCOUNTS_PER_REQUEST";
    pub const COMMITMENT_LEVEL: &str = "COMMITMENT_LEVEL";
    pub const SKIP_PREFLIGHT: &str = "SKIP_PREFLIGHT";
}

pub const MAINNET_LOOKUP_TABLE: Pubkey = pubkey!("GBzQG2iFrPwXjGtCnwNt9S5eHd8xAR8jUMt3QDJpnjud");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SolanaNet {
    #[serde(rename = "devnet")]
    Devnet,
    #[default]
    #[serde(rename = "mainnet-beta")]
    Mainnet,
}

/// Unknown Solana network.
#[derive(Debug, ThisError)]
#[error("unknown network: {0}")]
pub struct UnknownNetwork(pub String);

impl FromStr for SolanaNet {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "devnet" => Ok(Self::Devnet),
            "mainnet" | "mainnet-beta" => Ok(Self::Mainnet),
            s => Err(UnknownNetwork(s.to_owned())),
        }
    }
}

impl SolanaNet {
    pub fn url(&self) -> &'static str {
        match self {
            SolanaNet::Devnet => "https://api.devnet.solana.com",
            SolanaNet::Mainnet => "https://api.mainnet-beta.solana.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolanaNet::Devnet => "devnet",
            SolanaNet::Mainnet => "mainnet-beta",
        }
    }
}

/// How the compute-unit price is obtained for each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorityFee {
    /// Jupiter's reference fee for referral claims.
    #[default]
    Reference,
    /// Helius `getPriorityFeeEstimate`, mainnet only.
    Helius,
    /// Fixed price in micro-lamports per compute unit.
    Value(u64),
}

impl FromStr for PriorityFee {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reference" => Ok(Self::Reference),
            "helius" => Ok(Self::Helius),
            s => s
                .parse()
                .map(Self::Value)
                .map_err(|_| ConfigError::invalid(env::PRIORITY_FEE, s)),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error(transparent)]
    UnknownNetwork(#[from] UnknownNetwork),
    #[error("{0}")]
    Constraint(String),
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str) -> Self {
        Self::Invalid {
            key,
            value: value.to_owned(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    pub network: SolanaNet,
    pub rpc_url: Option<String>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub program_id: Option<Pubkey>,
    /// `None` uses the network default. Mainnet defaults to Jupiter's table.
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub lookup_table: Option<Pubkey>,
    /// Overrides the derived ceiling of claim sets per transaction.
    pub claims_per_transaction: Option<NonZeroUsize>,
    pub compute_unit_margin: f64,
    pub priority_fee: PriorityFee,
    #[serde(skip_serializing)]
    pub helius_api_key: Option<String>,
    pub max_accounts_per_request: NonZeroUsize,
    pub commitment: CommitmentLevel,
    pub skip_preflight: bool,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            network: SolanaNet::default(),
            rpc_url: None,
            program_id: None,
            lookup_table: None,
            claims_per_transaction: None,
            compute_unit_margin: 1.2,
            priority_fee: PriorityFee::default(),
            helius_api_key: None,
            max_accounts_per_request: crate::chunks::MAX_ACCOUNTS_PER_REQUEST,
            commitment: CommitmentLevel::Confirmed,
            skip_preflight: true,
        }
    }
}

fn parse<T: FromStr>(
    map: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    map.get(key)
        .map(|v| v.parse::<T>().map_err(|_| ConfigError::invalid(key, v)))
        .transpose()
}

impl ClaimConfig {
    /// Overlay environment values on top of `self`.
    pub fn merge_env(mut self, map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        if let Some(network) = map.get(env::NETWORK) {
            self.network = network.parse()?;
        }
        if let Some(url) = map.get(env::RPC_URL) {
            self.rpc_url = Some(url.clone());
        }
        if let Some(id) = parse(map, env::PROGRAM_ID)? {
            self.program_id = Some(id);
        }
        if let Some(table) = parse(map, env::LOOKUP_TABLE)? {
            self.lookup_table = Some(table);
        }
        if let Some(n) = parse(map, env::CLAIMS_PER_TRANSACTION)? {
            self.claims_per_transaction = Some(n);
        }
        if let Some(margin) = parse(map, env::COMPUTE_UNIT_MARGIN)? {
            self.compute_unit_margin = margin;
        }
        if let Some(fee) = map.get(env::PRIORITY_FEE) {
            self.priority_fee = fee.parse()?;
        }
        if let Some(key) = map.get(env::HELIUS_API_KEY) {
            self.helius_api_key = Some(key.clone());
        }
        if let Some(n) = parse(map, env::MAX_ACCOUNTS_PER_REQUEST)? {
            self.max_accounts_per_request = n;
        }
        if let Some(level) = parse(map, env::COMMITMENT_LEVEL)? {
            self.commitment = level;
        }
        if let Some(skip) = parse(map, env::SKIP_PREFLIGHT)? {
            self.skip_preflight = skip;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn from_env(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::default().merge_env(map)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.compute_unit_margin >= 1.0 && self.compute_unit_margin.is_finite()) {
            return Err(ConfigError::Constraint(format!(
                "compute_unit_margin must be a finite value >= 1.0, got {}",
                self.compute_unit_margin
            )));
        }
        if self.priority_fee == PriorityFee::Helius && self.helius_api_key.is_none() {
            return Err(ConfigError::Constraint(format!(
                "priority_fee = \"helius\" requires {}",
                env::HELIUS_API_KEY
            )));
        }
        Ok(())
    }

    pub fn rpc_url(&self) -> &str {
        self.rpc_url.as_deref().unwrap_or(self.network.url())
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id.unwrap_or(match self.network {
            SolanaNet::Mainnet => program::MAINNET_PROGRAM_ID,
            SolanaNet::Devnet => program::DEVNET_PROGRAM_ID,
        })
    }

    pub fn lookup_table(&self) -> Option<Pubkey> {
        self.lookup_table.or(match self.network {
            SolanaNet::Mainnet => Some(MAINNET_LOOKUP_TABLE),
            SolanaNet::Devnet => None,
        })
    }

    pub fn claims_per_transaction(&self) -> NonZeroUsize {
        self.claims_per_transaction
            .unwrap_or(crate::batch::budget::MAX_CLAIMS_PER_TRANSACTION)
    }

    pub fn commitment(&self) -> CommitmentConfig {
        CommitmentConfig {
            commitment: self.commitment,
        }
    }

    pub fn build_client(&self) -> RpcClient {
        RpcClient::new_with_timeouts_and_commitment(
            self.rpc_url().to_owned(),
            Duration::from_secs(30),
            self.commitment(),
            Duration::from_secs(180),
        )
    }
}
