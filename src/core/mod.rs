//! Core business logic
//!
//! Framework-agnostic operations over the card, transaction and control
//! tables. Every function takes a `SeaORM` connection (or transaction) and
//! returns [`crate::errors::Result`].

/// Purchase authorization pipeline
pub mod authorization;
/// Card ledger: balances, limits, status
pub mod card;
/// Company onboarding
pub mod company;
/// Structured advisory denials
pub mod denial;
/// Paged transaction history
pub mod history;
/// Bulk card issuance
pub mod issuance;
/// Spending control evaluation
pub mod policy;
/// Spending control persistence
pub mod spending_control;
/// Transaction store and spend-to-date aggregation
pub mod transaction;
