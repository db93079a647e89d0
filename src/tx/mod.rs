//! Contract write submission with gas buffering and revert decoding

mod gas;
mod sender;

pub use gas::GasEstimator;
pub use sender::{contract_error, TransactionSender};
