use crate::{Error, token::TokenHolding};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use solana_pubkey::Pubkey;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPrice {
    pub usd_price: Decimal,
    pub decimals: u8,
}

/// USD quotes for mints. Mints without a quote are absent from the result.
#[async_trait]
pub trait PriceQuote: Send + Sync {
    async fn usd_prices(&self, mints: &[Pubkey]) -> Result<HashMap<Pubkey, TokenPrice>, Error>;
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldingValue {
    #[serde_as(as = "DisplayFromStr")]
    pub address: Pubkey,
    #[serde_as(as = "DisplayFromStr")]
    pub mint: Pubkey,
    pub amount: Decimal,
    pub usd: Decimal,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct UnclaimedValue {
    pub total_usd: Decimal,
    pub priced: Vec<HoldingValue>,
    /// Holdings whose mint has no quote.
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub unpriced: Vec<Pubkey>,
}

/// `amount / 10^decimals`, `None` past the decimal scale limit.
pub fn ui_amount(amount: u64, decimals: u8) -> Option<Decimal> {
    Decimal::try_from_i128_with_scale(amount as i128, decimals as u32).ok()
}

pub async fn unclaimed_value(
    prices: &dyn PriceQuote,
    holdings: &[TokenHolding],
) -> Result<UnclaimedValue, Error> {
    let mut seen = BTreeSet::new();
    let mints = holdings
        .iter()
        .map(|h| h.mint)
        .filter(|mint| seen.insert(*mint))
        .collect::<Vec<_>>();
    let quotes = if mints.is_empty() {
        HashMap::new()
    } else {
        prices.usd_prices(&mints).await?
    };

    let mut value = UnclaimedValue::default();
    for holding in holdings {
        let priced = quotes.get(&holding.mint).and_then(|price| {
            let amount = ui_amount(holding.amount, price.decimals)?;
            let usd = amount.checked_mul(price.usd_price)?;
            Some(HoldingValue {
                address: holding.address,
                mint: holding.mint,
                amount,
                usd,
            })
        });
        match priced {
            Some(priced) => {
                value.total_usd += priced.usd;
                value.priced.push(priced);
            }
            None => {
                tracing::debug!("no price for {}", holding.mint);
                value.unpriced.push(holding.address);
            }
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing::FakeTokens, token::TokenProgram};
    use rust_decimal_macros::dec;
    use spl_token_2022_interface::state::AccountState;

    fn holding(mint: Pubkey, amount: u64) -> TokenHolding {
        TokenHolding {
            address: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            mint,
            amount,
            state: AccountState::Initialized,
            token_program: TokenProgram::Legacy,
        }
    }

    #[test]
    fn test_ui_amount() {
        assert_eq!(ui_amount(1_500_000, 6), Some(dec!(1.5)));
        assert_eq!(ui_amount(7, 0), Some(dec!(7)));
        assert_eq!(ui_amount(1, 29), None);
    }

    #[tokio::test]
    async fn test_unclaimed_value() {
        let usdc = Pubkey::new_unique();
        let sol = Pubkey::new_unique();
        let unknown = Pubkey::new_unique();
        let prices = FakeTokens::default()
            .with_price(usdc, dec!(0.9998), 6)
            .with_price(sol, dec!(150), 9);
        let holdings = [
            holding(usdc, 2_500_000),
            holding(sol, 100_000_000),
            holding(unknown, 1),
        ];
        let value = unclaimed_value(&prices, &holdings).await.unwrap();
        assert_eq!(value.priced.len(), 2);
        assert_eq!(value.priced[0].usd, dec!(2.4995));
        assert_eq!(value.priced[1].usd, dec!(15));
        assert_eq!(value.total_usd, dec!(17.4995));
        assert_eq!(value.unpriced, [holdings[2].address]);
    }

    #[tokio::test]
    async fn test_no_holdings() {
        let value = unclaimed_value(&FakeTokens::failing(), &[]).await.unwrap();
        assert_eq!(value, UnclaimedValue::default());
    }
}
