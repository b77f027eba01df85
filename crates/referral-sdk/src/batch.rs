use crate::{
    Error,
    chunks::chunks,
    claim::ClaimInstructionSet,
    fee::{FeeEstimate, FeeEstimator},
};
use base64::prelude::*;
use futures::future::join_all;
use solana_program::{
    hash::Hash,
    message::{AddressLookupTableAccount, VersionedMessage, v0},
};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::signers::Signers;
use solana_transaction::versioned::VersionedTransaction;
use std::num::NonZeroUsize;

/// Maximum serialized size of a transaction.
pub const PACKET_DATA_SIZE: usize = 1280 - 40 - 8;

/// Wire-size and compute model of a claim transaction, used to derive how many
/// claim sets fit in one transaction.
///
/// The lookup table is assumed to hold only the program-wide accounts: project,
/// admin, project authority, system program and token program. Everything that
/// varies per referral or per mint stays static.
pub mod budget {
    use super::PACKET_DATA_SIZE;
    use crate::fee::MAX_COMPUTE_UNIT_LIMIT;
    use std::num::NonZeroUsize;

    const PUBKEY: usize = 32;

    /// Signature count and one signature for the payer.
    pub const SIGNATURE_BYTES: usize = 1 + 64;
    /// Version prefix, header, key count, blockhash, instruction count, lookup count.
    pub const MESSAGE_BYTES: usize = 1 + 3 + 1 + 32 + 1 + 1;
    /// Payer, compute budget program, associated token program, referral program,
    /// referral account and partner.
    pub const SHARED_STATIC_KEYS: usize = 6;
    /// `set_compute_unit_limit` and `set_compute_unit_price`.
    pub const COMPUTE_BUDGET_BYTES: usize = (3 + 5) + (3 + 9);
    /// Table address, two index vectors, five indexes.
    pub const LOOKUP_BYTES: usize = PUBKEY + 2 + 5;

    pub const FIXED_BYTES: usize = SIGNATURE_BYTES
        + MESSAGE_BYTES
        + SHARED_STATIC_KEYS * PUBKEY
        + COMPUTE_BUDGET_BYTES
        + LOOKUP_BYTES;

    /// Mint, holding account, partner token account and admin token account.
    pub const CLAIM_SET_KEYS: usize = 4;
    /// Compiled partner account creation (6 accounts, 1 byte of data), admin account
    /// creation (8 accounts, 8 bytes) and claim (12 accounts, 8 bytes).
    pub const CLAIM_SET_INSTRUCTION_BYTES: usize =
        (1 + 1 + 6 + 1 + 1) + (1 + 1 + 8 + 1 + 8) + (1 + 1 + 12 + 1 + 8);
    pub const CLAIM_SET_BYTES: usize = CLAIM_SET_KEYS * PUBKEY + CLAIM_SET_INSTRUCTION_BYTES;

    /// Upper bound of one claim set: two account creations and two checked transfers.
    pub const CLAIM_SET_COMPUTE_UNITS: u32 = 120_000;

    pub const fn max_claims_per_transaction() -> usize {
        let by_size = (PACKET_DATA_SIZE - FIXED_BYTES) / CLAIM_SET_BYTES;
        let by_compute = (MAX_COMPUTE_UNIT_LIMIT / CLAIM_SET_COMPUTE_UNITS) as usize;
        if by_size < by_compute {
            by_size
        } else {
            by_compute
        }
    }

    pub const MAX_CLAIMS_PER_TRANSACTION: NonZeroUsize =
        NonZeroUsize::new(max_claims_per_transaction()).unwrap();
}

/// A sealed group of claim sets compiled into one message.
#[derive(Debug, Clone)]
pub struct TransactionBatch {
    pub mints: Vec<Pubkey>,
    pub fee: FeeEstimate,
    pub message: VersionedMessage,
}

impl TransactionBatch {
    pub fn claim_count(&self) -> usize {
        self.mints.len()
    }

    pub fn payer(&self) -> Pubkey {
        self.message.static_account_keys()[0]
    }

    pub fn recent_blockhash(&self) -> &Hash {
        self.message.recent_blockhash()
    }

    pub fn sign<T: Signers + ?Sized>(&self, signers: &T) -> Result<VersionedTransaction, Error> {
        Ok(VersionedTransaction::try_new(self.message.clone(), signers)?)
    }

    /// Transaction with placeholder signatures, for signing by an external wallet.
    pub fn unsigned(&self) -> VersionedTransaction {
        let num_sig = self.message.header().num_required_signatures as usize;
        VersionedTransaction {
            signatures: vec![Signature::default(); num_sig],
            message: self.message.clone(),
        }
    }

    pub fn serialize_unsigned(&self) -> Result<Vec<u8>, Error> {
        serialize(&self.unsigned())
    }

    pub fn to_base64(&self) -> Result<String, Error> {
        Ok(BASE64_STANDARD.encode(self.serialize_unsigned()?))
    }
}

fn serialize(tx: &VersionedTransaction) -> Result<Vec<u8>, Error> {
    bincode1::serialize(tx).map_err(|e| Error::Other(e.into()))
}

/// A group whose simulation failed. It must not be submitted.
#[derive(Debug)]
pub struct RejectedBatch {
    pub mints: Vec<Pubkey>,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct BatchOutput {
    pub batches: Vec<TransactionBatch>,
    pub rejected: Vec<RejectedBatch>,
}

pub struct TransactionBatcher<'a> {
    estimator: &'a dyn FeeEstimator,
    ceiling: NonZeroUsize,
}

impl<'a> TransactionBatcher<'a> {
    pub fn new(estimator: &'a dyn FeeEstimator, ceiling: NonZeroUsize) -> Self {
        Self { estimator, ceiling }
    }

    /// Pack claim sets in input order, `ceiling` per batch. The last batch may be shorter.
    pub async fn batch(
        &self,
        claim_sets: impl IntoIterator<Item = ClaimInstructionSet>,
        payer: &Pubkey,
        blockhash: Hash,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<BatchOutput, Error> {
        let groups = chunks(claim_sets, self.ceiling);
        tracing::debug!("sealing {} batches", groups.len());
        let sealed = join_all(
            groups
                .into_iter()
                .map(|group| self.seal(group, payer, blockhash, lookup_tables)),
        )
        .await;

        let mut output = BatchOutput::default();
        for result in sealed {
            match result? {
                Ok(batch) => output.batches.push(batch),
                Err(rejected) => output.rejected.push(rejected),
            }
        }
        Ok(output)
    }

    async fn seal(
        &self,
        group: Vec<ClaimInstructionSet>,
        payer: &Pubkey,
        blockhash: Hash,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<Result<TransactionBatch, RejectedBatch>, Error> {
        let mints = group.iter().map(|set| set.mint).collect::<Vec<_>>();
        let instructions = group
            .into_iter()
            .flat_map(ClaimInstructionSet::into_instructions)
            .collect::<Vec<_>>();

        let fee = match self
            .estimator
            .estimate(&instructions, payer, lookup_tables)
            .await
        {
            Ok(fee) => fee,
            Err(error @ Error::Simulation { .. }) => {
                tracing::warn!("rejecting batch of {} claims: {}", mints.len(), error);
                return Ok(Err(RejectedBatch { mints, error }));
            }
            Err(error) => return Err(error),
        };

        let instructions = fee
            .instructions()
            .into_iter()
            .chain(instructions)
            .collect::<Vec<_>>();
        let message = v0::Message::try_compile(payer, &instructions, lookup_tables, blockhash)?;
        let batch = TransactionBatch {
            mints,
            fee,
            message: VersionedMessage::V0(message),
        };

        let size = batch.serialize_unsigned()?.len();
        if size > PACKET_DATA_SIZE {
            return Err(Error::TransactionTooLarge {
                size,
                limit: PACKET_DATA_SIZE,
            });
        }
        tracing::info!(
            "sealed batch: {} claims, {} bytes, limit {:?}, price {}",
            batch.claim_count(),
            size,
            fee.compute_unit_limit,
            fee.compute_unit_price
        );
        Ok(Ok(batch))
    }
}
