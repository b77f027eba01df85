use crate::{Error, chain::ChainClient};
use futures::future::try_join_all;
use solana_account::Account;
use solana_pubkey::Pubkey;
use std::num::NonZeroUsize;

/// Address ceiling of one `getMultipleAccounts` request.
pub const MAX_ACCOUNTS_PER_REQUEST: NonZeroUsize = NonZeroUsize::new(100).unwrap();

/// Partition `items` into groups of `size`, preserving order. The last group may be shorter.
pub fn chunks<T>(items: impl IntoIterator<Item = T>, size: NonZeroUsize) -> Vec<Vec<T>> {
    let size = size.get();
    let mut groups = Vec::new();
    let mut current = Vec::with_capacity(size);
    for item in items {
        current.push(item);
        if current.len() == size {
            groups.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Fetch any number of accounts, `size` addresses per request.
/// The result is index-aligned with `pubkeys`.
pub async fn get_multiple_accounts_chunked(
    chain: &dyn ChainClient,
    pubkeys: &[Pubkey],
    size: NonZeroUsize,
) -> Result<Vec<Option<Account>>, Error> {
    let requests = chunks(pubkeys.iter().copied(), size)
        .into_iter()
        .map(|group| async move { chain.get_multiple_accounts(&group).await });
    let pages = try_join_all(requests).await?;
    Ok(pages.into_iter().flatten().collect())
}
