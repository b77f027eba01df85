use solana_program::message::CompileError;
use solana_pubkey::Pubkey;
use solana_rpc_client_api::{
    client_error::{Error as ClientError, ErrorKind as ClientErrorKind},
    request::{RpcError, RpcResponseErrorData},
    response::RpcSimulateTransactionResult,
};
use solana_signer::SignerError;
use solana_transaction_error::TransactionError;
use std::sync::Arc;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("invalid mint {mint}: owned by {owner}, which is not a token program")]
    InvalidMint { mint: Pubkey, owner: Pubkey },
    #[error("account discovery failed: {0}")]
    Discovery(#[source] Box<Error>),
    #[error("transaction simulation failed: {error}")]
    Simulation {
        error: TransactionError,
        logs: Vec<String>,
    },
    #[error("transaction too large: {size} bytes, limit is {limit}")]
    TransactionTooLarge { size: usize, limit: usize },
    #[error("account not found: {0}")]
    AccountNotFound(Pubkey),
    #[error("invalid account data for {address}: {reason}")]
    InvalidAccountData { address: Pubkey, reason: String },
    #[error("{}", verbose_solana_error(.error))]
    Solana {
        #[source]
        error: Arc<ClientError>,
    },
    #[error(transparent)]
    Signer(#[from] Arc<SignerError>),
    #[error(transparent)]
    Compile(#[from] Arc<CompileError>),
    #[error("http request failed: {0:#}")]
    Http(anyhow::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn solana(error: ClientError) -> Self {
        Self::Solana {
            error: Arc::new(error),
        }
    }

    pub fn invalid_data(address: Pubkey, reason: impl ToString) -> Self {
        Self::InvalidAccountData {
            address,
            reason: reason.to_string(),
        }
    }

    pub fn discovery(error: Error) -> Self {
        match error {
            e @ Error::Discovery(_) => e,
            e => Error::Discovery(Box::new(e)),
        }
    }
}

impl From<ClientError> for Error {
    fn from(value: ClientError) -> Self {
        Error::solana(value)
    }
}

impl From<SignerError> for Error {
    fn from(value: SignerError) -> Self {
        Error::Signer(Arc::new(value))
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(value: crate::config::ConfigError) -> Self {
        Error::Config(value.to_string())
    }
}

impl From<CompileError> for Error {
    fn from(value: CompileError) -> Self {
        Error::Compile(Arc::new(value))
    }
}

pub fn verbose_solana_error(err: &ClientError) -> String {
    use std::fmt::Write;
    if let ClientErrorKind::RpcError(RpcError::RpcResponseError {
        code,
        message,
        data,
    }) = &err.kind
    {
        let mut s = format!("{message} ({code})");
        if let RpcResponseErrorData::SendTransactionPreflightFailure(
            RpcSimulateTransactionResult {
                logs: Some(logs), ..
            },
        ) = data
        {
            for (i, log) in logs.iter().enumerate() {
                write!(s, "\n{}: {}", i + 1, log).ok();
            }
        }
        s
    } else {
        err.to_string()
    }
}
