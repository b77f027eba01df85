use crate::{
    Error,
    chain::ChainClient,
    program::{
        self, AnchorAccount, ClaimAccounts, CreateAdminTokenAccount, Project, ReferralAccount,
    },
    token::{TokenHolding, TokenProgram},
};
use serde::{Deserialize, Serialize};
use solana_program::instruction::Instruction;
use solana_pubkey::Pubkey;
use spl_associated_token_account_interface::{
    address::get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use std::str::FromStr;

/// Token-account layout of a referral account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Holdings are program PDAs under the project's token authority, claimed with `claim`.
    V1,
    /// Holdings are associated token accounts of the referral account, claimed with `claim_v2`.
    #[default]
    V2,
}

impl FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" | "1" => Ok(Self::V1),
            "v2" | "2" => Ok(Self::V2),
            s => Err(Error::Config(format!("unknown layout: {s}"))),
        }
    }
}

/// On-chain view of one referral account, fetched once per flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralContext {
    pub program_id: Pubkey,
    pub referral_account: Pubkey,
    pub partner: Pubkey,
    pub project: Pubkey,
    pub project_base: Pubkey,
    pub admin: Pubkey,
    pub project_authority: Pubkey,
    pub layout: Layout,
}

impl ReferralContext {
    pub fn new(
        program_id: Pubkey,
        referral_account: Pubkey,
        referral: &ReferralAccount,
        project: &Project,
        layout: Layout,
    ) -> Self {
        Self {
            program_id,
            referral_account,
            partner: referral.partner,
            project: referral.project,
            project_base: project.base,
            admin: project.admin,
            project_authority: program::project_authority(&program_id, &project.base),
            layout,
        }
    }

    pub async fn fetch(
        chain: &dyn ChainClient,
        program_id: Pubkey,
        referral_account: Pubkey,
        layout: Layout,
    ) -> Result<Self, Error> {
        let account = chain
            .get_account(&referral_account)
            .await?
            .ok_or(Error::AccountNotFound(referral_account))?;
        let referral = ReferralAccount::decode(&referral_account, &account.data)?;
        let account = chain
            .get_account(&referral.project)
            .await?
            .ok_or(Error::AccountNotFound(referral.project))?;
        let project = Project::decode(&referral.project, &account.data)?;
        if layout == Layout::V2 && referral.name.is_none() {
            tracing::warn!(
                "referral account {} has no name, claim_v2 requires one",
                referral_account
            );
        }
        Ok(Self::new(program_id, referral_account, &referral, &project, layout))
    }

    /// Token authority of this referral's holdings.
    pub fn holding_authority(&self) -> Pubkey {
        match self.layout {
            Layout::V1 => self.project,
            Layout::V2 => self.referral_account,
        }
    }

    pub fn referral_token_account(&self, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
        match self.layout {
            Layout::V1 => {
                program::referral_token_account_v1(&self.program_id, &self.referral_account, mint)
            }
            Layout::V2 => {
                program::referral_token_account_v2(&self.referral_account, mint, token_program)
            }
        }
    }

    /// Instructions claiming the balance of `mint`: idempotent creation of the partner
    /// and admin destination accounts, then the claim itself.
    pub fn build_claim_set(
        &self,
        mint: &Pubkey,
        payer: &Pubkey,
        token_program_owner: &Pubkey,
    ) -> Result<ClaimInstructionSet, Error> {
        let token_program = TokenProgram::for_mint(mint, token_program_owner)?.id();
        let partner_token_account =
            get_associated_token_address_with_program_id(&self.partner, mint, &token_program);
        let project_admin_token_account =
            get_associated_token_address_with_program_id(&self.admin, mint, &token_program);

        let setup = vec![
            create_associated_token_account_idempotent(payer, &self.partner, mint, &token_program),
            program::create_admin_token_account(
                &self.program_id,
                &CreateAdminTokenAccount {
                    project: self.project,
                    project_authority: self.project_authority,
                    admin: self.admin,
                    project_admin_token_account,
                    mint: *mint,
                    token_program,
                },
            ),
        ];

        let accounts = ClaimAccounts {
            payer: *payer,
            project: self.project,
            admin: self.admin,
            project_admin_token_account,
            referral_account: self.referral_account,
            referral_token_account: self.referral_token_account(mint, &token_program),
            partner: self.partner,
            partner_token_account,
            mint: *mint,
            token_program,
        };
        let claim = match self.layout {
            Layout::V1 => program::claim(&self.program_id, &accounts),
            Layout::V2 => program::claim_v2(&self.program_id, &accounts),
        };

        Ok(ClaimInstructionSet {
            mint: *mint,
            setup,
            claim,
        })
    }

    pub fn build_for_holding(
        &self,
        holding: &TokenHolding,
        payer: &Pubkey,
    ) -> Result<ClaimInstructionSet, Error> {
        self.build_claim_set(&holding.mint, payer, &holding.token_program.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimInstructionSet {
    pub mint: Pubkey,
    pub setup: Vec<Instruction>,
    pub claim: Instruction,
}

impl ClaimInstructionSet {
    pub fn instruction_count(&self) -> usize {
        self.setup.len() + 1
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.setup.iter().chain(std::iter::once(&self.claim))
    }

    pub fn into_instructions(self) -> impl Iterator<Item = Instruction> {
        self.setup.into_iter().chain(std::iter::once(self.claim))
    }
}
