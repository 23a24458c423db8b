//! SeaORM entities: companies, their cards and cards-to-issue, and the
//! transactions and spending controls hanging off each card.

pub mod card;
pub mod card_to_issue;
pub mod company;
pub mod spending_control;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use card::{Column as CardColumn, Entity as Card, Model as CardModel};
pub use card_to_issue::{
    Column as CardToIssueColumn, Entity as CardToIssue, Model as CardToIssueModel,
};
pub use company::{Column as CompanyColumn, Entity as Company, Model as CompanyModel};
pub use spending_control::{
    Column as SpendingControlColumn, Entity as SpendingControl, Model as SpendingControlModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};
