mod principal;
mod token;
mod user;

pub use principal::*;
pub use token::*;
pub use user::*;
