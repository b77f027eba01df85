//! End-to-end claim flows over the engine components.

use crate::{
    Error,
    batch::{RejectedBatch, TransactionBatch, TransactionBatcher},
    chain::{ChainClient, RpcChain, fetch_address_lookup_table},
    chunks::get_multiple_accounts_chunked,
    claim::{ClaimInstructionSet, Layout, ReferralContext},
    config::{ClaimConfig, PriorityFee},
    discovery::{AccountDiscovery, Discovered, Strategy, TokenListSource},
    fee::{FeeEstimator, PriceSource, SimulatingEstimator},
    sources::{FixedPrice, HeliusFee, ReferenceFee},
    submit::{SubmissionOrchestrator, SubmissionReport},
    token::{TokenHolding, TokenProgram},
    value::{PriceQuote, UnclaimedValue, unclaimed_value},
};
use jup_api::Jupiter;
use solana_program::{hash::Hash, message::AddressLookupTableAccount};
use solana_pubkey::Pubkey;
use solana_signer::signers::Signers;
use solana_transaction::versioned::VersionedTransaction;
use std::sync::Arc;

/// A claim that was left out of every batch.
#[derive(Debug)]
pub struct SkippedClaim {
    /// The holding account, or the mint when no holding address was derived.
    pub address: Pubkey,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct ClaimPlan {
    pub batches: Vec<TransactionBatch>,
    pub rejected: Vec<RejectedBatch>,
    pub skipped: Vec<SkippedClaim>,
}

impl ClaimPlan {
    pub fn claim_count(&self) -> usize {
        self.batches.iter().map(TransactionBatch::claim_count).sum()
    }

    pub fn sign_all<T: Signers + ?Sized>(
        &self,
        signers: &T,
    ) -> Result<Vec<VersionedTransaction>, Error> {
        self.batches.iter().map(|b| b.sign(signers)).collect()
    }
}

#[derive(bon::Builder)]
pub struct Claimer {
    chain: Arc<dyn ChainClient>,
    estimator: Arc<dyn FeeEstimator>,
    tokens: Arc<dyn TokenListSource>,
    prices: Option<Arc<dyn PriceQuote>>,
    #[builder(default)]
    config: ClaimConfig,
}

impl Claimer {
    /// RPC chain, Jupiter token lists and prices, and the configured fee source.
    pub fn from_config(config: ClaimConfig, http: reqwest::Client) -> Result<Self, Error> {
        config.validate()?;
        let chain: Arc<dyn ChainClient> = Arc::new(RpcChain::new(
            Arc::new(config.build_client()),
            config.commitment(),
            config.skip_preflight,
        ));
        let jupiter = Arc::new(Jupiter::new(http.clone()));
        let price: Arc<dyn PriceSource> = match config.priority_fee {
            PriorityFee::Reference => Arc::new(ReferenceFee::new(Jupiter::clone(&jupiter))),
            PriorityFee::Helius => {
                let key = config
                    .helius_api_key
                    .as_deref()
                    .ok_or_else(|| Error::Config("missing helius api key".to_owned()))?;
                Arc::new(HeliusFee::for_network(http, key, config.network))
            }
            PriorityFee::Value(price) => Arc::new(FixedPrice(price)),
        };
        let estimator = Arc::new(SimulatingEstimator::new(
            chain.clone(),
            price,
            config.compute_unit_margin,
        ));
        Ok(Self::builder()
            .chain(chain)
            .estimator(estimator)
            .tokens(jupiter.clone())
            .prices(jupiter)
            .config(config)
            .build())
    }

    pub fn config(&self) -> &ClaimConfig {
        &self.config
    }

    pub fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }

    pub async fn referral_context(
        &self,
        referral: &Pubkey,
        layout: Layout,
    ) -> Result<ReferralContext, Error> {
        ReferralContext::fetch(
            self.chain.as_ref(),
            self.config.program_id(),
            *referral,
            layout,
        )
        .await
    }

    pub async fn discover(
        &self,
        context: &ReferralContext,
        strategy: &Strategy,
    ) -> Result<Discovered, Error> {
        AccountDiscovery::new(
            self.chain.as_ref(),
            self.tokens.as_ref(),
            self.config.max_accounts_per_request,
        )
        .discover(context, strategy)
        .await
    }

    async fn lookup_tables(&self) -> Result<Vec<AddressLookupTableAccount>, Error> {
        match self.config.lookup_table() {
            Some(pubkey) => Ok(vec![
                fetch_address_lookup_table(self.chain.as_ref(), &pubkey).await?,
            ]),
            None => Ok(Vec::new()),
        }
    }

    /// Context, fresh blockhash and lookup tables, fetched concurrently.
    async fn prepare(
        &self,
        referral: &Pubkey,
        layout: Layout,
    ) -> Result<(ReferralContext, Hash, Vec<AddressLookupTableAccount>), Error> {
        futures::try_join!(
            self.referral_context(referral, layout),
            self.chain.get_latest_blockhash(),
            self.lookup_tables(),
        )
    }

    async fn batch(
        &self,
        sets: Vec<ClaimInstructionSet>,
        payer: &Pubkey,
        blockhash: Hash,
        lookup_tables: &[AddressLookupTableAccount],
        skipped: Vec<SkippedClaim>,
    ) -> Result<ClaimPlan, Error> {
        let batcher =
            TransactionBatcher::new(self.estimator.as_ref(), self.config.claims_per_transaction());
        let output = batcher.batch(sets, payer, blockhash, lookup_tables).await?;
        let plan = ClaimPlan {
            batches: output.batches,
            rejected: output.rejected,
            skipped,
        };
        tracing::info!(
            "{} claims in {} transactions, {} rejected batches, {} skipped",
            plan.claim_count(),
            plan.batches.len(),
            plan.rejected.len(),
            plan.skipped.len()
        );
        Ok(plan)
    }

    async fn plan_holdings(
        &self,
        context: &ReferralContext,
        payer: &Pubkey,
        holdings: Vec<TokenHolding>,
        blockhash: Hash,
        lookup_tables: &[AddressLookupTableAccount],
        mut skipped: Vec<SkippedClaim>,
    ) -> Result<ClaimPlan, Error> {
        let mut sets = Vec::new();
        for holding in holdings.iter().filter(|h| h.is_claimable()) {
            match context.build_for_holding(holding, payer) {
                Ok(set) => sets.push(set),
                Err(error @ Error::InvalidMint { .. }) => {
                    tracing::warn!("skipping {}: {}", holding.address, error);
                    skipped.push(SkippedClaim {
                        address: holding.address,
                        error,
                    });
                }
                Err(error) => return Err(error),
            }
        }
        self.batch(sets, payer, blockhash, lookup_tables, skipped)
            .await
    }

    /// Claim every claimable holding found by `strategy`.
    #[tracing::instrument(skip_all, fields(referral = %referral))]
    pub async fn claim_all(
        &self,
        payer: &Pubkey,
        referral: &Pubkey,
        layout: Layout,
        strategy: &Strategy,
    ) -> Result<ClaimPlan, Error> {
        let (context, blockhash, lookup_tables) = self.prepare(referral, layout).await?;
        let discovered = self.discover(&context, strategy).await?;
        let skipped = discovered
            .unsupported
            .iter()
            .map(|unsupported| {
                let error = unsupported.error();
                tracing::warn!("skipping {}: {}", unsupported.address, error);
                SkippedClaim {
                    address: unsupported.address,
                    error,
                }
            })
            .collect();
        self.plan_holdings(
            &context,
            payer,
            discovered.holdings,
            blockhash,
            &lookup_tables,
            skipped,
        )
        .await
    }

    /// Claim the given token accounts of the referral.
    #[tracing::instrument(skip_all, fields(referral = %referral, accounts = addresses.len()))]
    pub async fn claim_partially(
        &self,
        payer: &Pubkey,
        referral: &Pubkey,
        layout: Layout,
        addresses: &[Pubkey],
    ) -> Result<ClaimPlan, Error> {
        let (context, blockhash, lookup_tables) = self.prepare(referral, layout).await?;
        let accounts = get_multiple_accounts_chunked(
            self.chain.as_ref(),
            addresses,
            self.config.max_accounts_per_request,
        )
        .await?;

        let mut holdings = Vec::new();
        let mut skipped = Vec::new();
        for (address, account) in addresses.iter().zip(accounts) {
            let Some(account) = account else {
                tracing::warn!("skipping {}: account not found", address);
                skipped.push(SkippedClaim {
                    address: *address,
                    error: Error::AccountNotFound(*address),
                });
                continue;
            };
            match TokenHolding::decode(*address, &account)? {
                Some(holding) => holdings.push(holding),
                None => {
                    // token layouts start with the mint
                    let mint = account
                        .data
                        .get(..32)
                        .and_then(|b| Pubkey::try_from(b).ok())
                        .ok_or_else(|| Error::invalid_data(*address, "not a token account"))?;
                    let error = TokenProgram::for_mint(&mint, &account.owner)
                        .err()
                        .unwrap_or_else(|| Error::invalid_data(*address, "not a token account"));
                    tracing::warn!("skipping {}: {}", address, error);
                    skipped.push(SkippedClaim {
                        address: *address,
                        error,
                    });
                }
            }
        }
        self.plan_holdings(
            &context,
            payer,
            holdings,
            blockhash,
            &lookup_tables,
            skipped,
        )
        .await
    }

    /// Claim a single mint. Fails when the mint is not owned by a token program.
    #[tracing::instrument(skip_all, fields(referral = %referral, mint = %mint))]
    pub async fn claim(
        &self,
        payer: &Pubkey,
        referral: &Pubkey,
        layout: Layout,
        mint: &Pubkey,
    ) -> Result<ClaimPlan, Error> {
        let ((context, blockhash, lookup_tables), mint_account) = futures::try_join!(
            self.prepare(referral, layout),
            self.chain.get_account(mint),
        )?;
        let mint_account = mint_account.ok_or(Error::AccountNotFound(*mint))?;
        let set = context.build_claim_set(mint, payer, &mint_account.owner)?;
        self.batch(vec![set], payer, blockhash, &lookup_tables, Vec::new())
            .await
    }

    pub async fn submit(&self, transactions: Vec<VersionedTransaction>) -> SubmissionReport {
        SubmissionOrchestrator::new(self.chain.as_ref())
            .submit(transactions)
            .await
    }

    /// USD value of the claimable holdings found by `strategy`.
    #[tracing::instrument(skip_all, fields(referral = %referral))]
    pub async fn unclaimed(
        &self,
        referral: &Pubkey,
        layout: Layout,
        strategy: &Strategy,
    ) -> Result<UnclaimedValue, Error> {
        let prices = self
            .prices
            .as_deref()
            .ok_or_else(|| Error::Config("no price source configured".to_owned()))?;
        let context = self.referral_context(referral, layout).await?;
        let holdings = self
            .discover(&context, strategy)
            .await?
            .holdings
            .into_iter()
            .filter(TokenHolding::is_claimable)
            .collect::<Vec<_>>();
        unclaimed_value(prices, &holdings).await
    }
}
