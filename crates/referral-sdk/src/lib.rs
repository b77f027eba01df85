//! Claim engine for referral fee accounts: find holdings, build claim
//! instructions, pack them into fee-estimated v0 transactions and submit them.

pub mod batch;
pub mod chain;
pub mod chunks;
pub mod claim;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fee;
pub mod flow;
pub mod program;
pub mod sources;
pub mod submit;
pub mod token;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Error;

pub use flow::{ClaimPlan, Claimer};

pub use jup_api;
