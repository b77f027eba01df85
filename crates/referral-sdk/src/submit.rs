use crate::chain::{ChainClient, Confirmation};
use futures::future::join_all;
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction_error::TransactionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Failure {
    /// Landed and failed.
    OnChain(#[serde(serialize_with = "display")] TransactionError),
    /// Refused by the node at send time.
    Rejected(String),
}

fn display<S: serde::Serializer>(e: &TransactionError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(e)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Confirmed,
    Failed(Failure),
    /// The blockhash expired, or confirmation could not be observed.
    TimedOut,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionResult {
    /// Fee-payer signature, known before sending.
    #[serde_as(as = "DisplayFromStr")]
    pub signature: Signature,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct SubmissionReport {
    pub results: Vec<SubmissionResult>,
}

impl SubmissionReport {
    pub fn succeeded(&self) -> Vec<Signature> {
        self.results
            .iter()
            .filter(|r| r.outcome == Outcome::Confirmed)
            .map(|r| r.signature)
            .collect()
    }

    pub fn failed(&self) -> Vec<&SubmissionResult> {
        self.results
            .iter()
            .filter(|r| r.outcome != Outcome::Confirmed)
            .collect()
    }

    pub fn all_confirmed(&self) -> bool {
        self.results.iter().all(|r| r.outcome == Outcome::Confirmed)
    }
}

pub struct SubmissionOrchestrator<'a> {
    chain: &'a dyn ChainClient,
}

impl<'a> SubmissionOrchestrator<'a> {
    pub fn new(chain: &'a dyn ChainClient) -> Self {
        Self { chain }
    }

    /// Send and confirm every transaction concurrently. Results are in input order.
    pub async fn submit(&self, transactions: Vec<VersionedTransaction>) -> SubmissionReport {
        let results = join_all(transactions.iter().map(|tx| self.submit_one(tx))).await;
        let report = SubmissionReport { results };
        tracing::info!(
            "{} of {} transactions confirmed",
            report.succeeded().len(),
            report.results.len()
        );
        report
    }

    async fn submit_one(&self, tx: &VersionedTransaction) -> SubmissionResult {
        let signature = tx.signatures.first().copied().unwrap_or_default();
        let outcome = match self.chain.send_transaction(tx).await {
            Err(error) => {
                tracing::warn!("{} rejected: {}", signature, error);
                Outcome::Failed(Failure::Rejected(error.to_string()))
            }
            Ok(_) => {
                let blockhash = tx.message.recent_blockhash();
                match self.chain.confirm_transaction(&signature, blockhash).await {
                    Ok(Confirmation::Confirmed) => {
                        tracing::info!("{} confirmed", signature);
                        Outcome::Confirmed
                    }
                    Ok(Confirmation::Failed(error)) => {
                        tracing::warn!("{} failed: {}", signature, error);
                        Outcome::Failed(Failure::OnChain(error))
                    }
                    Ok(Confirmation::Expired) => {
                        tracing::warn!("{} expired", signature);
                        Outcome::TimedOut
                    }
                    Err(error) => {
                        tracing::warn!("could not confirm {}: {}", signature, error);
                        Outcome::TimedOut
                    }
                }
            }
        };
        SubmissionResult { signature, outcome }
    }
}
