pub mod audit;
pub mod compensation;
pub mod error;
pub mod loan_ledger;
pub mod matcher;
pub mod settlement;
