pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, SearchAdCredentials, Timeouts};
pub use error::{BlockRankError, Result, SessionError};
pub use types::*;
