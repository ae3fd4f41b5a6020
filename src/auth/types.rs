//! Authentication context types.

use crate::cipher::IdentityClaim;
use crate::db::User;

/// Identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Claim decrypted from the access token
    pub claim: IdentityClaim,
    /// User record as read from the database during authentication
    pub user: User,
}
