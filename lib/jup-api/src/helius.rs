//! Helius `getPriorityFeeEstimate`, the one Helius method the claim flow needs.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const MAINNET_URL: &str = "https://mainnet.helius-rpc.com";
pub const DEVNET_URL: &str = "https://devnet.helius-rpc.com";

/// Percentile of recent fees paid by transactions touching the same accounts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityLevel {
    Min,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
    UnsafeMax,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EstimateParams<'a> {
    account_keys: &'a [String],
    options: EstimateOptions,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EstimateOptions {
    priority_level: PriorityLevel,
}

#[derive(Deserialize, Debug)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize, Debug)]
struct RpcResponse {
    #[serde(default)]
    result: Option<EstimateResult>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EstimateResult {
    #[serde(default)]
    priority_fee_estimate: Option<f64>,
}

/// Estimate in micro-lamports per compute unit, or the JSON-RPC error Helius replied with.
fn parse_estimate(json: JsonValue) -> Result<f64, anyhow::Error> {
    let resp = serde_json::from_value::<RpcResponse>(json).context("malformed helius response")?;
    if let Some(RpcError { code, message }) = resp.error {
        return Err(anyhow!("helius error {code}: {message}"));
    }
    resp.result
        .and_then(|r| r.priority_fee_estimate)
        .ok_or_else(|| anyhow!("helius returned no estimate"))
}

/// One Helius endpoint, keyed at construction.
#[derive(Debug, Clone)]
pub struct Helius {
    client: reqwest::Client,
    url: String,
}

impl Helius {
    pub fn mainnet(client: reqwest::Client, api_key: &str) -> Self {
        Self::with_url(client, MAINNET_URL, api_key)
    }

    pub fn devnet(client: reqwest::Client, api_key: &str) -> Self {
        Self::with_url(client, DEVNET_URL, api_key)
    }

    pub fn with_url(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            url: format!("{}/?api-key={}", base_url.trim_end_matches('/'), api_key),
        }
    }

    pub async fn priority_fee(
        &self,
        account_keys: &[String],
        level: PriorityLevel,
    ) -> Result<f64, anyhow::Error> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "referral-claim",
            "method": "getPriorityFeeEstimate",
            "params": [EstimateParams {
                account_keys,
                options: EstimateOptions { priority_level: level },
            }],
        });
        tracing::debug!("getPriorityFeeEstimate over {} accounts", account_keys.len());
        let json = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<JsonValue>()
            .await?;
        parse_estimate(json)
    }
}
