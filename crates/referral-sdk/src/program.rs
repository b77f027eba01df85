//! Wire contract of the on-chain referral program: account layouts, PDA seeds
//! and instruction encoding. Account orders must match the program exactly.

use crate::Error;
use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_program::instruction::{AccountMeta, Instruction};
use solana_sdk_ids::system_program;
use solana_pubkey::{Pubkey, pubkey};
use spl_associated_token_account_interface::address::get_associated_token_address_with_program_id;

pub const MAINNET_PROGRAM_ID: Pubkey = pubkey!("REFER4ZgmyYx9c6He5XfaTMiGfdLwRnkV4RPp9t9iF3");
pub const DEVNET_PROGRAM_ID: Pubkey = pubkey!("9vhgK3i91cTwTHQag85zoA3PmJUTfgvgYFc9AJPRNhGn");

pub const PROJECT_SEED: &[u8] = b"project";
pub const PROJECT_AUTHORITY_SEED: &[u8] = b"project_authority";
pub const REFERRAL_ATA_SEED: &[u8] = b"referral_ata";

/// `sha256("<namespace>:<name>")[..8]`
fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let mut h = Sha256::new();
    h.update(format!("{namespace}:{name}").as_bytes());
    let out = h.finalize();
    let mut d = [0u8; 8];
    d.copy_from_slice(&out[..8]);
    d
}

pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    discriminator("global", name)
}

pub fn account_discriminator(name: &str) -> [u8; 8] {
    discriminator("account", name)
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub base: Pubkey,
    pub admin: Pubkey,
    pub name: String,
    pub default_share_bps: u16,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReferralAccount {
    pub partner: Pubkey,
    pub project: Pubkey,
    pub share_bps: u16,
    pub name: Option<String>,
}

/// Types stored behind an 8-byte anchor account discriminator.
pub trait AnchorAccount: BorshDeserialize {
    const NAME: &'static str;

    fn decode(address: &Pubkey, data: &[u8]) -> Result<Self, Error> {
        if data.len() < 8 {
            return Err(Error::invalid_data(*address, "account too small"));
        }
        let (head, mut body) = data.split_at(8);
        if head != account_discriminator(Self::NAME) {
            return Err(Error::invalid_data(
                *address,
                format!("not a {} account", Self::NAME),
            ));
        }
        // accounts are allocated with padding, trailing bytes are ignored
        Self::deserialize(&mut body).map_err(|e| Error::invalid_data(*address, e))
    }
}

impl AnchorAccount for Project {
    const NAME: &'static str = "Project";
}

impl AnchorAccount for ReferralAccount {
    const NAME: &'static str = "ReferralAccount";
}

pub fn project_address(program_id: &Pubkey, base: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[PROJECT_SEED, base.as_ref()], program_id).0
}

pub fn project_authority(program_id: &Pubkey, base: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[PROJECT_AUTHORITY_SEED, base.as_ref()], program_id).0
}

/// Holding account of the first layout: a program PDA whose token authority is the project.
pub fn referral_token_account_v1(program_id: &Pubkey, referral: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[REFERRAL_ATA_SEED, referral.as_ref(), mint.as_ref()],
        program_id,
    )
    .0
}

/// Holding account of the second layout: the associated token account of the referral account.
pub fn referral_token_account_v2(referral: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(referral, mint, token_program)
}

/// Accounts shared by `claim` and `claim_v2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimAccounts {
    pub payer: Pubkey,
    pub project: Pubkey,
    pub admin: Pubkey,
    pub project_admin_token_account: Pubkey,
    pub referral_account: Pubkey,
    pub referral_token_account: Pubkey,
    pub partner: Pubkey,
    pub partner_token_account: Pubkey,
    pub mint: Pubkey,
    pub token_program: Pubkey,
}

impl ClaimAccounts {
    fn head(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(self.payer, true),
            AccountMeta::new_readonly(self.project, false),
            AccountMeta::new_readonly(self.admin, false),
            AccountMeta::new(self.project_admin_token_account, false),
            AccountMeta::new_readonly(self.referral_account, false),
            AccountMeta::new(self.referral_token_account, false),
            AccountMeta::new_readonly(self.partner, false),
            AccountMeta::new(self.partner_token_account, false),
            AccountMeta::new_readonly(self.mint, false),
        ]
    }
}

pub fn claim(program_id: &Pubkey, accounts: &ClaimAccounts) -> Instruction {
    let mut metas = accounts.head();
    metas.extend([
        AccountMeta::new_readonly(spl_associated_token_account_interface::program::ID, false),
        AccountMeta::new_readonly(system_program::ID, false),
        AccountMeta::new_readonly(accounts.token_program, false),
    ]);
    Instruction::new_with_bytes(*program_id, &instruction_discriminator("claim"), metas)
}

pub fn claim_v2(program_id: &Pubkey, accounts: &ClaimAccounts) -> Instruction {
    let mut metas = accounts.head();
    metas.extend([
        AccountMeta::new_readonly(system_program::ID, false),
        AccountMeta::new_readonly(accounts.token_program, false),
        AccountMeta::new_readonly(spl_associated_token_account_interface::program::ID, false),
    ]);
    Instruction::new_with_bytes(*program_id, &instruction_discriminator("claim_v2"), metas)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAdminTokenAccount {
    pub project: Pubkey,
    pub project_authority: Pubkey,
    pub admin: Pubkey,
    pub project_admin_token_account: Pubkey,
    pub mint: Pubkey,
    pub token_program: Pubkey,
}

/// Creates the admin's associated token account if absent. Rent is paid by the project authority.
pub fn create_admin_token_account(
    program_id: &Pubkey,
    accounts: &CreateAdminTokenAccount,
) -> Instruction {
    Instruction::new_with_bytes(
        *program_id,
        &instruction_discriminator("create_admin_token_account"),
        vec![
            AccountMeta::new_readonly(accounts.project, false),
            AccountMeta::new(accounts.project_authority, false),
            AccountMeta::new_readonly(accounts.admin, false),
            AccountMeta::new(accounts.project_admin_token_account, false),
            AccountMeta::new_readonly(accounts.mint, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(accounts.token_program, false),
            AccountMeta::new_readonly(spl_associated_token_account_interface::program::ID, false),
        ],
    )
}
