//! In-memory collaborators for tests.

use crate::{
    Error,
    chain::{ChainClient, Confirmation, SimulationResult},
    claim::{Layout, ReferralContext},
    discovery::{TokenList, TokenListSource},
    fee::{FeeEstimate, FeeEstimator},
    program::{self, AnchorAccount, Project, ReferralAccount},
    token::{TokenHolding, TokenProgram},
    value::{PriceQuote, TokenPrice},
};
use async_trait::async_trait;
use borsh::BorshSerialize;
use rust_decimal::Decimal;
use solana_account::Account;
use solana_address_lookup_table_interface::state::{AddressLookupTable, LookupTableMeta};
use solana_program::{
    hash::Hash,
    instruction::{Instruction, InstructionError},
    message::AddressLookupTableAccount,
    program_pack::Pack,
};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction_error::TransactionError;
use spl_token_2022_interface::state::{Account as TokenAccount, AccountState};
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Mutex,
};

pub fn token_account_data(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
    let mut data = vec![0u8; TokenAccount::LEN];
    TokenAccount {
        mint: *mint,
        owner: *owner,
        amount,
        state: AccountState::Initialized,
        ..Default::default()
    }
    .pack_into_slice(&mut data);
    data
}

pub fn token_account(mint: &Pubkey, owner: &Pubkey, amount: u64, program: TokenProgram) -> Account {
    Account {
        lamports: 2039280,
        data: token_account_data(mint, owner, amount),
        owner: program.id(),
        executable: false,
        rent_epoch: 0,
    }
}

pub fn mint_account(program: &Pubkey) -> Account {
    Account {
        lamports: 1461600,
        data: vec![0; 82],
        owner: *program,
        executable: false,
        rent_epoch: 0,
    }
}

pub fn lookup_table_account(addresses: Vec<Pubkey>) -> Account {
    let table = AddressLookupTable {
        meta: LookupTableMeta::default(),
        addresses: Cow::Owned(addresses),
    };
    Account {
        lamports: 1,
        data: table.serialize_for_tests().unwrap(),
        owner: solana_address_lookup_table_interface::program::ID,
        executable: false,
        rent_epoch: 0,
    }
}

/// A context with fresh keys, not stored anywhere until [`store_referral`].
pub fn referral_context(layout: Layout) -> ReferralContext {
    let program_id = program::MAINNET_PROGRAM_ID;
    let base = Pubkey::new_unique();
    let referral = ReferralAccount {
        partner: Pubkey::new_unique(),
        project: program::project_address(&program_id, &base),
        share_bps: 5000,
        name: Some("test".to_owned()),
    };
    let project = Project {
        base,
        admin: Pubkey::new_unique(),
        name: "test".to_owned(),
        default_share_bps: 1000,
    };
    ReferralContext::new(program_id, Pubkey::new_unique(), &referral, &project, layout)
}

fn anchor_data<T: AnchorAccount + BorshSerialize>(value: &T) -> Vec<u8> {
    let mut data = program::account_discriminator(T::NAME).to_vec();
    borsh::to_writer(&mut data, value).unwrap();
    // allocation padding
    data.extend([0; 32]);
    data
}

pub fn store_referral(chain: &FakeChain, ctx: &ReferralContext) {
    let referral = ReferralAccount {
        partner: ctx.partner,
        project: ctx.project,
        share_bps: 5000,
        name: Some("test".to_owned()),
    };
    let project = Project {
        base: ctx.project_base,
        admin: ctx.admin,
        name: "test".to_owned(),
        default_share_bps: 1000,
    };
    for (address, data) in [
        (ctx.referral_account, anchor_data(&referral)),
        (ctx.project, anchor_data(&project)),
    ] {
        chain.set_account(
            address,
            Account {
                lamports: 1,
                data,
                owner: ctx.program_id,
                executable: false,
                rent_epoch: 0,
            },
        );
    }
}

struct ChainState {
    accounts: BTreeMap<Pubkey, Account>,
    multiple_accounts_calls: usize,
    fail_requests: bool,
    units_consumed: Option<u64>,
    fail_simulation: BTreeSet<Pubkey>,
    simulated: Vec<VersionedTransaction>,
    fail_on_chain: BTreeSet<Pubkey>,
    reject: BTreeSet<Pubkey>,
    expire: BTreeSet<Pubkey>,
    sent: Vec<VersionedTransaction>,
}

/// Accounts in memory. Simulation and submission outcomes are scripted by
/// the static keys of the transaction.
pub struct FakeChain {
    blockhash: Hash,
    state: Mutex<ChainState>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            blockhash: Hash::new_unique(),
            state: Mutex::new(ChainState {
                accounts: BTreeMap::new(),
                multiple_accounts_calls: 0,
                fail_requests: false,
                units_consumed: Some(50_000),
                fail_simulation: BTreeSet::new(),
                simulated: Vec::new(),
                fail_on_chain: BTreeSet::new(),
                reject: BTreeSet::new(),
                expire: BTreeSet::new(),
                sent: Vec::new(),
            }),
        }
    }
}

fn touches(tx: &VersionedTransaction, keys: &BTreeSet<Pubkey>) -> bool {
    tx.message
        .static_account_keys()
        .iter()
        .any(|k| keys.contains(k))
}

impl FakeChain {
    pub fn set_account(&self, pubkey: Pubkey, account: Account) {
        self.state.lock().unwrap().accounts.insert(pubkey, account);
    }

    pub fn multiple_accounts_calls(&self) -> usize {
        self.state.lock().unwrap().multiple_accounts_calls
    }

    pub fn fail_requests(&self, fail: bool) {
        self.state.lock().unwrap().fail_requests = fail;
    }

    pub fn set_units_consumed(&self, units: Option<u64>) {
        self.state.lock().unwrap().units_consumed = units;
    }

    pub fn fail_simulation_on(&self, key: Pubkey) {
        self.state.lock().unwrap().fail_simulation.insert(key);
    }

    pub fn simulated(&self) -> Vec<VersionedTransaction> {
        self.state.lock().unwrap().simulated.clone()
    }

    /// Transactions touching `key` land and fail.
    pub fn fail_on(&self, key: Pubkey) {
        self.state.lock().unwrap().fail_on_chain.insert(key);
    }

    /// Transactions touching `key` are refused at send.
    pub fn reject_on(&self, key: Pubkey) {
        self.state.lock().unwrap().reject.insert(key);
    }

    /// Transactions touching `key` are never observed.
    pub fn expire_on(&self, key: Pubkey) {
        self.state.lock().unwrap().expire.insert(key);
    }

    pub fn sent(&self) -> Vec<VersionedTransaction> {
        self.state.lock().unwrap().sent.clone()
    }

    fn check(&self) -> Result<(), Error> {
        if self.state.lock().unwrap().fail_requests {
            return Err(anyhow::anyhow!("connection refused").into());
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>, Error> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.multiple_accounts_calls += 1;
        Ok(pubkeys
            .iter()
            .map(|pk| state.accounts.get(pk).cloned())
            .collect())
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Vec<(Pubkey, Account)>, Error> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .iter()
            .filter(|(address, account)| {
                account.owner == *token_program
                    && TokenHolding::decode(**address, account)
                        .ok()
                        .flatten()
                        .is_some_and(|h| h.authority == *owner)
            })
            .map(|(address, account)| (*address, account.clone()))
            .collect())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, Error> {
        self.check()?;
        Ok(self.blockhash)
    }

    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> Result<SimulationResult, Error> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.simulated.push(tx.clone());
        if touches(tx, &state.fail_simulation) {
            return Ok(SimulationResult {
                err: Some(TransactionError::InstructionError(
                    1,
                    InstructionError::Custom(6000),
                )),
                units_consumed: Some(1_000),
                logs: vec!["Program log: failed".to_owned()],
            });
        }
        Ok(SimulationResult {
            err: None,
            units_consumed: state.units_consumed,
            logs: Vec::new(),
        })
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, Error> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if touches(tx, &state.reject) {
            return Err(anyhow::anyhow!("Transaction simulation failed: Blockhash not found").into());
        }
        state.sent.push(tx.clone());
        Ok(tx.signatures[0])
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        _: &Hash,
    ) -> Result<Confirmation, Error> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let Some(tx) = state.sent.iter().find(|tx| tx.signatures[0] == *signature) else {
            return Ok(Confirmation::Expired);
        };
        Ok(if touches(tx, &state.fail_on_chain) {
            Confirmation::Failed(TransactionError::InstructionError(
                4,
                InstructionError::Custom(6001),
            ))
        } else if touches(tx, &state.expire) {
            Confirmation::Expired
        } else {
            Confirmation::Confirmed
        })
    }
}

/// Fee estimator without a chain.
pub struct FixedEstimator {
    limit: Option<u32>,
    price: u64,
    fail_on: Option<Pubkey>,
}

impl Default for FixedEstimator {
    fn default() -> Self {
        Self::new(Some(200_000), 1_000)
    }
}

impl FixedEstimator {
    pub fn new(limit: Option<u32>, price: u64) -> Self {
        Self {
            limit,
            price,
            fail_on: None,
        }
    }

    /// Fail simulation of instruction lists calling `program_id`.
    pub fn fail_on(mut self, program_id: Pubkey) -> Self {
        self.fail_on = Some(program_id);
        self
    }
}

#[async_trait]
impl FeeEstimator for FixedEstimator {
    async fn estimate(
        &self,
        instructions: &[Instruction],
        _: &Pubkey,
        _: &[AddressLookupTableAccount],
    ) -> Result<FeeEstimate, Error> {
        if let Some(program_id) = self.fail_on {
            if let Some(index) = instructions.iter().position(|i| i.program_id == program_id) {
                return Err(Error::Simulation {
                    error: TransactionError::InstructionError(
                        index as u8,
                        InstructionError::Custom(6000),
                    ),
                    logs: Vec::new(),
                });
            }
        }
        Ok(FeeEstimate {
            compute_unit_limit: self.limit,
            compute_unit_price: self.price,
        })
    }
}

/// Token lists and prices in memory.
#[derive(Default)]
pub struct FakeTokens {
    mints: Vec<Pubkey>,
    prices: HashMap<Pubkey, TokenPrice>,
    fail: bool,
}

impl FakeTokens {
    pub fn new(mints: Vec<Pubkey>) -> Self {
        Self {
            mints,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_price(mut self, mint: Pubkey, usd_price: Decimal, decimals: u8) -> Self {
        self.prices.insert(
            mint,
            TokenPrice {
                usd_price,
                decimals,
            },
        );
        self
    }

    fn check(&self) -> Result<(), Error> {
        if self.fail {
            return Err(Error::Http(anyhow::anyhow!("503 Service Unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenListSource for FakeTokens {
    async fn token_list(&self, _: &TokenList) -> Result<Vec<Pubkey>, Error> {
        self.check()?;
        Ok(self.mints.clone())
    }

    async fn top_traded(&self, limit: usize) -> Result<Vec<Pubkey>, Error> {
        self.check()?;
        Ok(self.mints.iter().take(limit).copied().collect())
    }
}

#[async_trait]
impl PriceQuote for FakeTokens {
    async fn usd_prices(&self, mints: &[Pubkey]) -> Result<HashMap<Pubkey, TokenPrice>, Error> {
        self.check()?;
        Ok(mints
            .iter()
            .filter_map(|mint| Some((*mint, *self.prices.get(mint)?)))
            .collect())
    }
}
