//! Chain query capability consumed by the engine, and its RPC implementation.

use crate::Error;
use async_trait::async_trait;
use serde_json::json;
use solana_account::Account;
use solana_account_decoder_client_types::UiAccount;
use solana_address_lookup_table_interface::state::AddressLookupTable;
use solana_commitment_config::CommitmentConfig;
use solana_program::{hash::Hash, message::AddressLookupTableAccount};
use solana_pubkey::Pubkey;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{
    config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
    request::RpcRequest,
    response::{Response, RpcKeyedAccount},
};
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction_error::TransactionError;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationResult {
    pub err: Option<TransactionError>,
    pub units_consumed: Option<u64>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    Confirmed,
    Failed(TransactionError),
    /// The blockhash expired before the transaction was observed.
    Expired,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Index-aligned with `pubkeys`. Callers respect the per-request address ceiling.
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>, Error>;

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, Error> {
        Ok(self
            .get_multiple_accounts(std::slice::from_ref(pubkey))
            .await?
            .into_iter()
            .next()
            .flatten())
    }

    /// All accounts of `token_program` whose token authority is `owner`.
    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Vec<(Pubkey, Account)>, Error>;

    async fn get_latest_blockhash(&self) -> Result<Hash, Error>;

    /// Simulate without signature verification, replacing the recent blockhash.
    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> Result<SimulationResult, Error>;

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, Error>;

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        recent_blockhash: &Hash,
    ) -> Result<Confirmation, Error>;
}

pub async fn fetch_address_lookup_table(
    chain: &dyn ChainClient,
    pubkey: &Pubkey,
) -> Result<AddressLookupTableAccount, Error> {
    let account = chain
        .get_account(pubkey)
        .await?
        .ok_or(Error::AccountNotFound(*pubkey))?;
    let table = AddressLookupTable::deserialize(&account.data)
        .map_err(|e| Error::invalid_data(*pubkey, e))?;
    Ok(AddressLookupTableAccount {
        key: *pubkey,
        addresses: table.addresses.to_vec(),
    })
}

#[derive(Clone)]
pub struct RpcChain {
    rpc: Arc<RpcClient>,
    commitment: CommitmentConfig,
    skip_preflight: bool,
    poll_interval: Duration,
}

impl RpcChain {
    pub fn new(rpc: Arc<RpcClient>, commitment: CommitmentConfig, skip_preflight: bool) -> Self {
        Self {
            rpc,
            commitment,
            skip_preflight,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>, Error> {
        Ok(self
            .rpc
            .get_multiple_accounts_with_commitment(pubkeys, self.commitment)
            .await?
            .value)
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Vec<(Pubkey, Account)>, Error> {
        // the client helper forces jsonParsed, raw bytes are decoded locally instead
        let params = json!([
            owner.to_string(),
            { "programId": token_program.to_string() },
            { "encoding": "base64", "commitment": self.commitment.commitment },
        ]);
        let response = self
            .rpc
            .send::<Response<Vec<RpcKeyedAccount>>>(RpcRequest::GetTokenAccountsByOwner, params)
            .await?;
        response
            .value
            .into_iter()
            .map(|keyed| {
                let address = keyed
                    .pubkey
                    .parse::<Pubkey>()
                    .map_err(|e| anyhow::anyhow!("invalid pubkey {}: {}", keyed.pubkey, e))?;
                let account = decode_ui_account(&address, &keyed.account)?;
                Ok((address, account))
            })
            .collect()
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, Error> {
        Ok(self
            .rpc
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?
            .0)
    }

    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> Result<SimulationResult, Error> {
        let result = self
            .rpc
            .simulate_transaction_with_config(
                tx,
                RpcSimulateTransactionConfig {
                    sig_verify: false,
                    replace_recent_blockhash: true,
                    commitment: Some(self.commitment),
                    ..Default::default()
                },
            )
            .await?
            .value;
        Ok(SimulationResult {
            err: result.err,
            units_consumed: result.units_consumed,
            logs: result.logs.unwrap_or_default(),
        })
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, Error> {
        Ok(self
            .rpc
            .send_transaction_with_config(
                tx,
                RpcSendTransactionConfig {
                    skip_preflight: self.skip_preflight,
                    preflight_commitment: Some(self.commitment.commitment),
                    ..Default::default()
                },
            )
            .await?)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        recent_blockhash: &Hash,
    ) -> Result<Confirmation, Error> {
        confirm_transaction(
            &self.rpc,
            signature,
            recent_blockhash,
            self.commitment,
            self.poll_interval,
        )
        .await
    }
}

fn decode_ui_account(address: &Pubkey, account: &UiAccount) -> Result<Account, Error> {
    account
        .decode::<Account>()
        .ok_or_else(|| Error::invalid_data(*address, "could not decode base64 account"))
}

/// Poll until `signature` reaches `commitment`, or `recent_blockhash` stops being valid.
pub async fn confirm_transaction(
    rpc: &RpcClient,
    signature: &Signature,
    recent_blockhash: &Hash,
    commitment: CommitmentConfig,
    poll_interval: Duration,
) -> Result<Confirmation, Error> {
    let start = Instant::now();
    loop {
        let status = rpc
            .get_signature_status_with_commitment(signature, commitment)
            .await?;
        match status {
            Some(Ok(())) => {
                tracing::debug!("{} confirmed after {:?}", signature, start.elapsed());
                return Ok(Confirmation::Confirmed);
            }
            Some(Err(error)) => return Ok(Confirmation::Failed(error)),
            None => {
                let valid = rpc
                    .is_blockhash_valid(recent_blockhash, CommitmentConfig::processed())
                    .await?;
                if !valid {
                    // one last look, the status may have landed between the two calls
                    let status = rpc
                        .get_signature_status_with_commitment(signature, commitment)
                        .await?;
                    return Ok(match status {
                        Some(Ok(())) => Confirmation::Confirmed,
                        Some(Err(error)) => Confirmation::Failed(error),
                        None => Confirmation::Expired,
                    });
                }
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}
