mod error;
mod gate;
mod handler;
mod router;

pub use router::routes;
pub use error::recover_error;
pub use gate::AuthGate;
