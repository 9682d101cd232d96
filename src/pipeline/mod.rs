//! Style transfer pipeline: configuration, the inference executor, and async delivery.

mod config;
mod executor;
mod stylizer;

pub use config::Config;
pub use executor::{Executor, Stage};
pub use stylizer::{PendingStylization, Stylizer};
