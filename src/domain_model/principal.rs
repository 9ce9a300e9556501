use super::{Role, UserId};
use serde::Serialize;

/// The authenticated identity attached to a request after the gate has
/// verified its bearer token. Request-scoped; never stored.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}
