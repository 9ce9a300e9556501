mod account_service;
mod token_service;

pub use account_service::*;
pub use token_service::*;
