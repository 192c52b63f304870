pub mod submitter;

pub use submitter::{FailedAttempt, Settled, TransactionSubmitter, TxAttempt, TxState};
