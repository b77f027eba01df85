//! Jupiter and Helius behind the engine's capability traits.

use crate::{
    Error,
    config::SolanaNet,
    discovery::{TokenList, TokenListSource},
    fee::PriceSource,
    value::{PriceQuote, TokenPrice},
};
use async_trait::async_trait;
use jup_api::{
    Jupiter,
    helius::{Helius, PriorityLevel},
};
use rust_decimal::Decimal;
use solana_pubkey::Pubkey;
use std::collections::{BTreeSet, HashMap};

/// Micro-lamports from a float quote, rounded up.
fn micro_lamports(value: f64) -> Result<u64, Error> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Http(anyhow::anyhow!("invalid fee quote: {value}")));
    }
    Ok(value.ceil() as u64)
}

fn parse_mints(ids: Vec<String>) -> Result<Vec<Pubkey>, Error> {
    ids.into_iter()
        .map(|id| {
            id.parse::<Pubkey>()
                .map_err(|e| Error::Http(anyhow::anyhow!("invalid mint {id}: {e}")))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPrice(pub u64);

#[async_trait]
impl PriceSource for FixedPrice {
    async fn compute_unit_price(&self, _: &BTreeSet<Pubkey>) -> Result<u64, Error> {
        Ok(self.0)
    }
}

/// The `referral` entry of Jupiter's reference fees.
#[derive(Clone)]
pub struct ReferenceFee {
    jupiter: Jupiter,
}

impl ReferenceFee {
    pub fn new(jupiter: Jupiter) -> Self {
        Self { jupiter }
    }
}

#[async_trait]
impl PriceSource for ReferenceFee {
    async fn compute_unit_price(&self, _: &BTreeSet<Pubkey>) -> Result<u64, Error> {
        let fees = self.jupiter.reference_fees().await.map_err(Error::Http)?;
        let price = micro_lamports(fees.referral)?;
        tracing::debug!("reference fee {} micro-lamports", price);
        Ok(price)
    }
}

pub struct HeliusFee {
    helius: Helius,
    level: PriorityLevel,
}

impl HeliusFee {
    pub fn new(helius: Helius) -> Self {
        Self {
            helius,
            level: PriorityLevel::default(),
        }
    }

    /// The Helius endpoint of `network`.
    pub fn for_network(http: reqwest::Client, api_key: &str, network: SolanaNet) -> Self {
        let helius = match network {
            SolanaNet::Mainnet => Helius::mainnet(http, api_key),
            SolanaNet::Devnet => Helius::devnet(http, api_key),
        };
        Self::new(helius)
    }

    pub fn with_level(mut self, level: PriorityLevel) -> Self {
        self.level = level;
        self
    }
}

#[async_trait]
impl PriceSource for HeliusFee {
    async fn compute_unit_price(&self, accounts: &BTreeSet<Pubkey>) -> Result<u64, Error> {
        let keys = accounts.iter().map(|pk| pk.to_string()).collect::<Vec<_>>();
        let estimate = self
            .helius
            .priority_fee(&keys, self.level)
            .await
            .map_err(Error::Http)?;
        let price = micro_lamports(estimate)?;
        tracing::debug!("helius fee {} micro-lamports", price);
        Ok(price)
    }
}

#[async_trait]
impl TokenListSource for Jupiter {
    async fn token_list(&self, list: &TokenList) -> Result<Vec<Pubkey>, Error> {
        let ids = self.tagged_mints(&list.tags).await.map_err(Error::Http)?;
        parse_mints(ids)
    }

    async fn top_traded(&self, limit: usize) -> Result<Vec<Pubkey>, Error> {
        let mut ids = self.top_tokens().await.map_err(Error::Http)?;
        ids.truncate(limit);
        parse_mints(ids)
    }
}

#[async_trait]
impl PriceQuote for Jupiter {
    async fn usd_prices(&self, mints: &[Pubkey]) -> Result<HashMap<Pubkey, TokenPrice>, Error> {
        let ids = mints.iter().map(|pk| pk.to_string()).collect::<Vec<_>>();
        let prices = self.prices(&ids).await.map_err(Error::Http)?;
        let mut quotes = HashMap::with_capacity(prices.len());
        for (id, info) in prices {
            let Ok(mint) = id.parse::<Pubkey>() else {
                tracing::warn!("ignoring price for invalid mint {}", id);
                continue;
            };
            let Ok(usd_price) = Decimal::try_from(info.usd_price) else {
                tracing::warn!("ignoring price {} for {}", info.usd_price, id);
                continue;
            };
            quotes.insert(
                mint,
                TokenPrice {
                    usd_price,
                    decimals: info.decimals,
                },
            );
        }
        Ok(quotes)
    }
}
