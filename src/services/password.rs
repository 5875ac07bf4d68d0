use crate::error::{ApiError, ApiResult};

/// The bcrypt work factor for stored passwords.
pub const HASH_COST: u32 = 10;

/// bcrypt only reads this many bytes of input and ignores the rest.
pub const MAX_PASSWORD_BYTES: usize = 72;

pub fn hash_password(plain: &str, cost: u32) -> ApiResult<String> {
    if plain.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::PasswordTooLong(MAX_PASSWORD_BYTES));
    }

    bcrypt::hash(plain, cost).map_err(|err| {
        tracing::error!(error = %err, "failed to hash password");
        ApiError::Hashing(err)
    })
}

/// Checks a plaintext password against a stored hash.
///
/// A mismatch is [ApiError::InvalidPassword]; a malformed hash or any other
/// bcrypt failure is [ApiError::Hashing]. Plaintexts too long to have been
/// hashed never match.
pub fn verify_password(plain: &str, hash: &str) -> ApiResult<()> {
    if plain.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::InvalidPassword);
    }

    match bcrypt::verify(plain, hash) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ApiError::InvalidPassword),
        Err(err) => {
            tracing::error!(error = %err, "failed to compare password with stored hash");
            Err(ApiError::Hashing(err))
        }
    }
}
