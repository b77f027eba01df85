use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};

pub mod helius;

pub const CACHE_URL: &str = "https://cache.jup.ag";
pub const LITE_API_URL: &str = "https://lite-api.jup.ag";

/// Maximum number of ids accepted by one price request.
pub const PRICE_IDS_PER_REQUEST: usize = 50;

/// Jupiter ids are base58 mint addresses.
fn check_mint_id(id: &str) -> Result<(), anyhow::Error> {
    let bytes = bs58::decode(id)
        .into_vec()
        .with_context(|| format!("mint id {id} is not base58"))?;
    ensure!(bytes.len() == 32, "mint id {id} is {} bytes long", bytes.len());
    Ok(())
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Fee {
    /// medium
    #[serde(default)]
    pub m: f64,
    /// high
    #[serde(default)]
    pub h: f64,
    /// very high
    #[serde(default)]
    pub vh: f64,
}

/// Network fee benchmarks, in micro-lamports per compute unit.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketReferenceFee {
    #[serde(default)]
    pub claim: Option<f64>,
    #[serde(default)]
    pub jup: Option<Fee>,
    #[serde(default)]
    pub jup2: Option<Fee>,
    #[serde(default, rename = "loAndDCA")]
    pub lo_and_dca: Option<f64>,
    pub referral: f64,
    #[serde(default)]
    pub perps: Option<Fee>,
    #[serde(default)]
    pub swap_fee: Option<f64>,
    #[serde(default)]
    pub last_updated_at: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceInfo {
    pub usd_price: f64,
    pub decimals: u8,
    #[serde(default)]
    pub block_id: Option<u64>,
    #[serde(default)]
    pub price_change_24h: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Jupiter {
    client: reqwest::Client,
    cache_url: String,
    lite_api_url: String,
}

impl Jupiter {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_urls(client, CACHE_URL, LITE_API_URL)
    }

    pub fn with_urls(client: reqwest::Client, cache_url: &str, lite_api_url: &str) -> Self {
        Self {
            client,
            cache_url: cache_url.trim_end_matches('/').to_owned(),
            lite_api_url: lite_api_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn get_json(&self, url: &str) -> Result<JsonValue, anyhow::Error> {
        tracing::debug!("GET {}", url);
        let json = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<JsonValue>()
            .await?;
        Ok(json)
    }

    pub async fn reference_fees(&self) -> Result<MarketReferenceFee, anyhow::Error> {
        let url = format!("{}/reference-fees", self.cache_url);
        let json = self.get_json(&url).await?;
        Ok(serde_json::from_value(json)?)
    }

    /// Mints ordered by recent trading volume, most traded first.
    pub async fn top_tokens(&self) -> Result<Vec<String>, anyhow::Error> {
        let url = format!("{}/top-tokens", self.cache_url);
        let json = self.get_json(&url).await?;
        let tokens = serde_json::from_value::<Vec<String>>(json)?;
        for id in &tokens {
            check_mint_id(id)?;
        }
        Ok(tokens)
    }

    pub async fn tokens_by_tag(&self, tag: &str) -> Result<Vec<TokenInfo>, anyhow::Error> {
        let url = format!("{}/tokens/v2/tag?query={}", self.lite_api_url, tag);
        let json = self.get_json(&url).await?;
        Ok(serde_json::from_value(json)?)
    }

    /// Union of the mints carrying any of `tags`, first occurrence wins.
    pub async fn tagged_mints(&self, tags: &[String]) -> Result<Vec<String>, anyhow::Error> {
        let mut seen = BTreeSet::new();
        let mut mints = Vec::new();
        for tag in tags {
            for token in self.tokens_by_tag(tag).await? {
                check_mint_id(&token.id)?;
                if seen.insert(token.id.clone()) {
                    mints.push(token.id);
                }
            }
        }
        Ok(mints)
    }

    /// USD prices for `ids`. Mints unknown to the price service are absent from the result.
    pub async fn prices(&self, ids: &[String]) -> Result<HashMap<String, PriceInfo>, anyhow::Error> {
        let mut result = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(PRICE_IDS_PER_REQUEST) {
            let url = format!("{}/price/v3?ids={}", self.lite_api_url, chunk.join(","));
            let json = self.get_json(&url).await?;
            // entries with a null price are skipped
            let page = serde_json::from_value::<HashMap<String, Option<PriceInfo>>>(json)?;
            result.extend(page.into_iter().filter_map(|(k, v)| Some((k, v?))));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_mint_id() {
        assert!(check_mint_id("So11111111111111111111111111111111111111112").is_ok());
        let err = check_mint_id("So1111").unwrap_err();
        assert!(err.to_string().starts_with("mint id So1111 is"), "{err}");
        assert!(check_mint_id("not base58 0OIl").is_err());
    }

    #[test]
    fn test_parse_reference_fees() {
        let json = serde_json::json!({
            "claim": 5000,
            "jup": { "m": 10000, "h": 50000, "vh": 100000 },
            "jup2": { "m": 10000, "h": 50000, "vh": 100000 },
            "loAndDCA": 2000,
            "referral": 12345,
            "perps": { "m": 1, "h": 2, "vh": 3 },
            "swapFee": 0.5,
            "lastUpdatedAt": 1718000000000u64
        });
        let fee: MarketReferenceFee = serde_json::from_value(json).unwrap();
        assert_eq!(fee.referral, 12345.0);
        assert_eq!(fee.lo_and_dca, Some(2000.0));
        assert_eq!(fee.jup.unwrap().vh, 100000.0);

        let fee: MarketReferenceFee =
            serde_json::from_value(serde_json::json!({ "referral": 1 })).unwrap();
        assert_eq!(fee.referral, 1.0);
        assert!(fee.jup.is_none());
    }

    #[test]
    fn test_parse_prices() {
        let json = serde_json::json!({
            "So11111111111111111111111111111111111111112": {
                "usdPrice": 150.25,
                "blockId": 348004023,
                "decimals": 9,
                "priceChange24h": -1.5
            },
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v": null
        });
        let page: HashMap<String, Option<PriceInfo>> = serde_json::from_value(json).unwrap();
        let sol = page["So11111111111111111111111111111111111111112"]
            .as_ref()
            .unwrap();
        assert_eq!(sol.decimals, 9);
        assert_eq!(sol.usd_price, 150.25);
        assert!(page["EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"].is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_reference_fees() {
        let jup = Jupiter::new(reqwest::Client::new());
        let fee = jup.reference_fees().await.unwrap();
        dbg!(fee);
    }

    #[tokio::test]
    #[ignore]
    async fn test_top_tokens() {
        let jup = Jupiter::new(reqwest::Client::new());
        let tokens = jup.top_tokens().await.unwrap();
        assert!(!tokens.is_empty());
    }
}
