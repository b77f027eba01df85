use crate::Error;
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use solana_account::Account;
use solana_pubkey::Pubkey;
use spl_token_2022_interface::{
    extension::StateWithExtensions,
    state::{Account as TokenAccount, AccountState},
};

/// The two recognized token-program variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenProgram {
    Legacy,
    Extended,
}

impl TokenProgram {
    pub const ALL: [TokenProgram; 2] = [TokenProgram::Legacy, TokenProgram::Extended];

    pub fn id(&self) -> Pubkey {
        match self {
            TokenProgram::Legacy => spl_token_interface::ID,
            TokenProgram::Extended => spl_token_2022_interface::ID,
        }
    }

    pub fn from_owner(owner: &Pubkey) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == *owner)
    }

    /// Resolve the program owning `mint`, or fail with [`Error::InvalidMint`].
    pub fn for_mint(mint: &Pubkey, owner: &Pubkey) -> Result<Self, Error> {
        Self::from_owner(owner).ok_or(Error::InvalidMint {
            mint: *mint,
            owner: *owner,
        })
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenHolding {
    #[serde_as(as = "DisplayFromStr")]
    pub address: Pubkey,
    /// Token authority of the holding: the referral account, or the project for the first layout.
    #[serde_as(as = "DisplayFromStr")]
    pub authority: Pubkey,
    #[serde_as(as = "DisplayFromStr")]
    pub mint: Pubkey,
    pub amount: u64,
    #[serde(skip)]
    pub state: AccountState,
    pub token_program: TokenProgram,
}

impl TokenHolding {
    /// Returns `None` when the account is not owned by a token program.
    pub fn decode(address: Pubkey, account: &Account) -> Result<Option<Self>, Error> {
        let Some(token_program) = TokenProgram::from_owner(&account.owner) else {
            return Ok(None);
        };
        let state = StateWithExtensions::<TokenAccount>::unpack(&account.data)
            .map_err(|e| Error::invalid_data(address, e))?;
        Ok(Some(Self {
            address,
            authority: state.base.owner,
            mint: state.base.mint,
            amount: state.base.amount,
            state: state.base.state,
            token_program,
        }))
    }

    pub fn is_claimable(&self) -> bool {
        self.amount > 0 && self.state == AccountState::Initialized
    }
}
