use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a persisted refresh-token record. Doubles as the `jti`
/// claim of the refresh token it backs.
#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct RefreshTokenId(pub uuid::Uuid);

impl RefreshTokenId {
    pub fn generate() -> Self {
        RefreshTokenId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for RefreshTokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RefreshTokenId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(RefreshTokenId)
    }
}
