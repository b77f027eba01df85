use crate::{
    Error,
    chain::ChainClient,
    chunks::get_multiple_accounts_chunked,
    claim::{Layout, ReferralContext},
    program,
    token::{TokenHolding, TokenProgram},
};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use solana_pubkey::Pubkey;
use std::{
    collections::{BTreeMap, BTreeSet},
    num::NonZeroUsize,
    str::FromStr,
};

pub const DEFAULT_TOP_TRADED: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenList {
    pub tags: Vec<String>,
}

impl Default for TokenList {
    fn default() -> Self {
        Self {
            tags: vec!["verified".to_owned(), "lst".to_owned()],
        }
    }
}

/// Which holdings to look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Derive candidate holdings from a named list of mints.
    KnownTokenList(TokenList),
    /// Derive candidate holdings from the `limit` most traded mints.
    TopTraded { limit: usize },
    /// Ask the chain for every token account under the holding authority.
    DirectOwnerScan,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::TopTraded {
            limit: DEFAULT_TOP_TRADED,
        }
    }
}

/// `scan`, `top`, `top:<n>`, `list` or `list:<tag>,<tag>`
impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        match (name, arg) {
            ("scan", None) => Ok(Self::DirectOwnerScan),
            ("top", None) => Ok(Self::default()),
            ("top", Some(n)) => n
                .parse()
                .map(|limit| Self::TopTraded { limit })
                .map_err(|_| Error::Config(format!("invalid top-traded limit: {n}"))),
            ("list", None) => Ok(Self::KnownTokenList(TokenList::default())),
            ("list", Some(tags)) => Ok(Self::KnownTokenList(TokenList {
                tags: tags.split(',').map(str::to_owned).collect(),
            })),
            _ => Err(Error::Config(format!("unknown strategy: {s}"))),
        }
    }
}

/// A mint left out of discovery because no token program owns it.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsupportedMint {
    /// The holding account, or the mint when no holding address could be derived.
    #[serde_as(as = "DisplayFromStr")]
    pub address: Pubkey,
    #[serde_as(as = "DisplayFromStr")]
    pub mint: Pubkey,
    #[serde_as(as = "DisplayFromStr")]
    pub owner: Pubkey,
}

impl UnsupportedMint {
    pub fn error(&self) -> Error {
        Error::InvalidMint {
            mint: self.mint,
            owner: self.owner,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Discovered {
    pub holdings: Vec<TokenHolding>,
    pub unsupported: Vec<UnsupportedMint>,
}

/// Source of known mint addresses.
#[async_trait]
pub trait TokenListSource: Send + Sync {
    async fn token_list(&self, list: &TokenList) -> Result<Vec<Pubkey>, Error>;

    /// Most traded first.
    async fn top_traded(&self, limit: usize) -> Result<Vec<Pubkey>, Error>;
}

pub struct AccountDiscovery<'a> {
    chain: &'a dyn ChainClient,
    tokens: &'a dyn TokenListSource,
    chunk_size: NonZeroUsize,
}

impl<'a> AccountDiscovery<'a> {
    pub fn new(
        chain: &'a dyn ChainClient,
        tokens: &'a dyn TokenListSource,
        chunk_size: NonZeroUsize,
    ) -> Self {
        Self {
            chain,
            tokens,
            chunk_size,
        }
    }

    /// Token holdings of the referral account, fresh from the chain.
    ///
    /// Any failed request fails the whole call. Mints whose account is owned
    /// by neither token program are reported in [`Discovered::unsupported`].
    #[tracing::instrument(skip_all, fields(referral = %context.referral_account))]
    pub async fn discover(
        &self,
        context: &ReferralContext,
        strategy: &Strategy,
    ) -> Result<Discovered, Error> {
        let mut found = match strategy {
            Strategy::KnownTokenList(list) => {
                let mints = self.tokens.token_list(list).await.map_err(Error::discovery)?;
                self.from_mints(context, mints).await
            }
            Strategy::TopTraded { limit } => {
                let mints = self
                    .tokens
                    .top_traded(*limit)
                    .await
                    .map_err(Error::discovery)?;
                self.from_mints(context, mints).await
            }
            Strategy::DirectOwnerScan => self.scan(context).await,
        }
        .map_err(Error::discovery)?;
        found.holdings = dedup(found.holdings);
        let mut seen = BTreeSet::new();
        found.unsupported.retain(|u| seen.insert(u.address));
        tracing::info!(
            "found {} holdings, {} unsupported mints",
            found.holdings.len(),
            found.unsupported.len()
        );
        Ok(found)
    }

    async fn from_mints(
        &self,
        context: &ReferralContext,
        mints: Vec<Pubkey>,
    ) -> Result<Discovered, Error> {
        let mints = unique(mints);
        let accounts = get_multiple_accounts_chunked(self.chain, &mints, self.chunk_size).await?;
        let mut unsupported = Vec::new();
        let mut candidates = Vec::new();
        for (mint, account) in mints.iter().zip(accounts) {
            let program = match account {
                Some(account) => match TokenProgram::from_owner(&account.owner) {
                    Some(program) => Some(program),
                    None => {
                        unsupported.push(UnsupportedMint {
                            address: *mint,
                            mint: *mint,
                            owner: account.owner,
                        });
                        continue;
                    }
                },
                None => None,
            };
            match (context.layout, program) {
                // seeds do not involve the token program
                (Layout::V1, _) => candidates.push((
                    *mint,
                    context.referral_token_account(mint, &TokenProgram::Legacy.id()),
                )),
                (Layout::V2, Some(program)) => {
                    candidates.push((*mint, context.referral_token_account(mint, &program.id())))
                }
                // no such mint
                (Layout::V2, None) => {}
            }
        }
        tracing::debug!("{} candidates from {} mints", candidates.len(), mints.len());

        let addresses = candidates.iter().map(|(_, address)| *address).collect::<Vec<_>>();
        let accounts = get_multiple_accounts_chunked(self.chain, &addresses, self.chunk_size).await?;
        let mut holdings = Vec::new();
        for ((mint, address), account) in candidates.into_iter().zip(accounts) {
            // never initialized
            let Some(account) = account else { continue };
            match TokenHolding::decode(address, &account)? {
                Some(holding) => holdings.push(holding),
                None => unsupported.push(UnsupportedMint {
                    address,
                    mint,
                    owner: account.owner,
                }),
            }
        }
        Ok(Discovered {
            holdings,
            unsupported,
        })
    }

    async fn scan(&self, context: &ReferralContext) -> Result<Discovered, Error> {
        let authority = context.holding_authority();
        let pages = try_join_all(TokenProgram::ALL.map(|program| async move {
            let id = program.id();
            self.chain.get_token_accounts_by_owner(&authority, &id).await
        }))
        .await?;

        let mut holdings = Vec::new();
        for (address, account) in pages.into_iter().flatten() {
            if let Some(holding) = TokenHolding::decode(address, &account)? {
                holdings.push(holding);
            }
        }

        if context.layout == Layout::V1 {
            // the project owns holdings of every referral, keep the ones derived from ours
            let expected = unique(holdings.iter().map(|h| h.mint))
                .into_iter()
                .map(|mint| {
                    program::referral_token_account_v1(
                        &context.program_id,
                        &context.referral_account,
                        &mint,
                    )
                })
                .collect::<BTreeSet<_>>();
            holdings.retain(|h| expected.contains(&h.address));
        }
        self.check_mints(holdings).await
    }

    /// Split off holdings whose mint account is owned by neither token program.
    async fn check_mints(&self, holdings: Vec<TokenHolding>) -> Result<Discovered, Error> {
        let mints = unique(holdings.iter().map(|h| h.mint));
        let accounts = get_multiple_accounts_chunked(self.chain, &mints, self.chunk_size).await?;
        let owners = mints
            .into_iter()
            .zip(accounts)
            .filter_map(|(mint, account)| {
                let owner = account?.owner;
                TokenProgram::from_owner(&owner)
                    .is_none()
                    .then_some((mint, owner))
            })
            .collect::<BTreeMap<_, _>>();

        let mut found = Discovered::default();
        for holding in holdings {
            match owners.get(&holding.mint) {
                Some(owner) => found.unsupported.push(UnsupportedMint {
                    address: holding.address,
                    mint: holding.mint,
                    owner: *owner,
                }),
                None => found.holdings.push(holding),
            }
        }
        Ok(found)
    }
}

fn unique(items: impl IntoIterator<Item = Pubkey>) -> Vec<Pubkey> {
    let mut seen = BTreeSet::new();
    items.into_iter().filter(|pk| seen.insert(*pk)).collect()
}

/// Drop repeated `(mint, address)` pairs, keeping the first.
fn dedup(mut holdings: Vec<TokenHolding>) -> Vec<TokenHolding> {
    let mut seen = BTreeSet::new();
    holdings.retain(|h| seen.insert((h.mint, h.address)));
    holdings
}
