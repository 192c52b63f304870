pub mod affordability;

pub use affordability::{check_affordable, Affordability};
