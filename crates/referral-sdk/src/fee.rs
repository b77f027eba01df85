use crate::{
    Error,
    chain::{ChainClient, SimulationResult},
};
use async_trait::async_trait;
use serde::Serialize;
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_program::{
    hash::Hash,
    instruction::Instruction,
    message::{AddressLookupTableAccount, VersionedMessage, v0},
};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use std::{collections::BTreeSet, sync::Arc};

/// Compute-unit ceiling of one transaction, also used as the simulation ceiling.
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

pub const DEFAULT_COMPUTE_UNIT_MARGIN: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeEstimate {
    /// `None` when simulation did not report usable consumption.
    pub compute_unit_limit: Option<u32>,
    /// Micro-lamports per compute unit.
    pub compute_unit_price: u64,
}

impl FeeEstimate {
    /// Compute-budget instructions to prepend: the limit (if known), then the price.
    pub fn instructions(&self) -> Vec<Instruction> {
        self.compute_unit_limit
            .map(ComputeBudgetInstruction::set_compute_unit_limit)
            .into_iter()
            .chain(std::iter::once(
                ComputeBudgetInstruction::set_compute_unit_price(self.compute_unit_price),
            ))
            .collect()
    }
}

/// Current price of a compute unit for transactions touching `accounts`.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn compute_unit_price(&self, accounts: &BTreeSet<Pubkey>) -> Result<u64, Error>;
}

#[async_trait]
pub trait FeeEstimator: Send + Sync {
    async fn estimate(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<FeeEstimate, Error>;
}

pub fn unique_accounts(payer: &Pubkey, instructions: &[Instruction]) -> BTreeSet<Pubkey> {
    std::iter::once(*payer)
        .chain(instructions.iter().flat_map(|i| {
            std::iter::once(i.program_id).chain(i.accounts.iter().map(|a| a.pubkey))
        }))
        .collect()
}

/// `floor(units * margin)`, capped at [`MAX_COMPUTE_UNIT_LIMIT`].
pub fn apply_margin(units: u64, margin: f64) -> u32 {
    let limit = (units as f64 * margin).floor();
    if limit >= MAX_COMPUTE_UNIT_LIMIT as f64 {
        MAX_COMPUTE_UNIT_LIMIT
    } else {
        limit as u32
    }
}

/// Limit from a simulation against the maximum ceiling, price from a [`PriceSource`].
#[derive(Clone)]
pub struct SimulatingEstimator {
    chain: Arc<dyn ChainClient>,
    price: Arc<dyn PriceSource>,
    margin: f64,
}

impl SimulatingEstimator {
    pub fn new(chain: Arc<dyn ChainClient>, price: Arc<dyn PriceSource>, margin: f64) -> Self {
        Self {
            chain,
            price,
            margin,
        }
    }

    pub async fn simulate(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<SimulationResult, Error> {
        let ixs = std::iter::once(ComputeBudgetInstruction::set_compute_unit_limit(
            MAX_COMPUTE_UNIT_LIMIT,
        ))
        .chain(instructions.iter().cloned())
        .collect::<Vec<_>>();
        // the node replaces the blockhash
        let message = v0::Message::try_compile(payer, &ixs, lookup_tables, Hash::default())?;
        let tx = VersionedTransaction {
            signatures: vec![
                Signature::default();
                message.header.num_required_signatures as usize
            ],
            message: VersionedMessage::V0(message),
        };
        self.chain.simulate_transaction(&tx).await
    }

    pub async fn compute_unit_limit(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<Option<u32>, Error> {
        let result = self.simulate(instructions, payer, lookup_tables).await?;
        if let Some(error) = result.err {
            tracing::warn!("simulation error: {}", error);
            for log in &result.logs {
                tracing::info!("{}", log);
            }
            return Err(Error::Simulation {
                error,
                logs: result.logs,
            });
        }
        for log in &result.logs {
            tracing::debug!("{}", log);
        }
        match result.units_consumed {
            None | Some(0) => {
                tracing::warn!("simulation did not report consumed units");
                Ok(None)
            }
            Some(units) => {
                let limit = apply_margin(units, self.margin);
                tracing::debug!("consumed {} units, limit {}", units, limit);
                Ok(Some(limit))
            }
        }
    }
}

#[async_trait]
impl FeeEstimator for SimulatingEstimator {
    async fn estimate(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<FeeEstimate, Error> {
        let accounts = unique_accounts(payer, instructions);
        let (compute_unit_limit, compute_unit_price) = futures::try_join!(
            self.compute_unit_limit(instructions, payer, lookup_tables),
            self.price.compute_unit_price(&accounts),
        )?;
        Ok(FeeEstimate {
            compute_unit_limit,
            compute_unit_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sources::FixedPrice, testing::FakeChain};
    use solana_program::instruction::AccountMeta;
    use solana_transaction_error::TransactionError;

    fn ix(program_id: Pubkey, payer: Pubkey) -> Instruction {
        Instruction::new_with_bytes(
            program_id,
            &[1, 2, 3],
            vec![
                AccountMeta::new(payer, true),
                AccountMeta::new(Pubkey::new_unique(), false),
            ],
        )
    }

    #[test]
    fn test_apply_margin() {
        assert_eq!(apply_margin(100_000, 1.2), 120_000);
        assert_eq!(apply_margin(33_333, 1.2), 39_999);
        assert_eq!(apply_margin(1_300_000, 1.2), MAX_COMPUTE_UNIT_LIMIT);
    }

    #[test]
    fn test_instructions() {
        let with_limit = FeeEstimate {
            compute_unit_limit: Some(200_000),
            compute_unit_price: 1000,
        }
        .instructions();
        assert_eq!(
            with_limit,
            [
                ComputeBudgetInstruction::set_compute_unit_limit(200_000),
                ComputeBudgetInstruction::set_compute_unit_price(1000),
            ]
        );
        let without = FeeEstimate {
            compute_unit_limit: None,
            compute_unit_price: 1000,
        }
        .instructions();
        assert_eq!(
            without,
            [ComputeBudgetInstruction::set_compute_unit_price(1000)]
        );
    }

    #[tokio::test]
    async fn test_estimate() {
        tracing_subscriber::fmt::try_init().ok();

        let chain = Arc::new(FakeChain::default());
        chain.set_units_consumed(Some(50_000));
        let estimator = SimulatingEstimator::new(chain.clone(), Arc::new(FixedPrice(777)), 1.2);
        let payer = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let ixs = [ix(program, payer), ix(program, payer)];

        let fee = estimator.estimate(&ixs, &payer, &[]).await.unwrap();
        assert_eq!(
            fee,
            FeeEstimate {
                compute_unit_limit: Some(60_000),
                compute_unit_price: 777,
            }
        );

        // simulation sees the maximum ceiling first
        let simulated = chain.simulated();
        assert_eq!(simulated.len(), 1);
        let message = &simulated[0].message;
        let first = &message.instructions()[0];
        assert_eq!(
            message.static_account_keys()[first.program_id_index as usize],
            solana_compute_budget_interface::ID
        );
        assert_eq!(
            first.data,
            ComputeBudgetInstruction::set_compute_unit_limit(MAX_COMPUTE_UNIT_LIMIT).data
        );
        assert_eq!(message.instructions().len(), 3);
    }

    #[tokio::test]
    async fn test_estimate_unknown_units() {
        let chain = Arc::new(FakeChain::default());
        chain.set_units_consumed(Some(0));
        let estimator = SimulatingEstimator::new(chain.clone(), Arc::new(FixedPrice(1)), 1.2);
        let payer = Pubkey::new_unique();
        let ixs = [ix(Pubkey::new_unique(), payer)];
        let fee = estimator.estimate(&ixs, &payer, &[]).await.unwrap();
        assert_eq!(fee.compute_unit_limit, None);

        chain.set_units_consumed(None);
        let fee = estimator.estimate(&ixs, &payer, &[]).await.unwrap();
        assert_eq!(fee.compute_unit_limit, None);
        assert_eq!(fee.instructions().len(), 1);
    }

    #[tokio::test]
    async fn test_estimate_simulation_error() {
        let chain = Arc::new(FakeChain::default());
        let program = Pubkey::new_unique();
        chain.fail_simulation_on(program);
        let estimator = SimulatingEstimator::new(chain.clone(), Arc::new(FixedPrice(1)), 1.2);
        let payer = Pubkey::new_unique();
        let err = estimator
            .estimate(&[ix(program, payer)], &payer, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Simulation {
                error: TransactionError::InstructionError(..),
                ..
            }
        ));
    }
}
