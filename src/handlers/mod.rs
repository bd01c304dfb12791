pub mod config;
pub mod topics;

pub use config::*;
pub use topics::*;
