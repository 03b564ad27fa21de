//! Transport credentials derived from the account password.
//!
//! The password never reaches local storage; it is only turned into the API
//! key sent with each request.

use crate::error::{CliError, CliResult};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Size of the derived API key in bytes.
pub const KEY_SIZE: usize = 32;

const KEY_INFO: &[u8] = b"sshconf-api-key-v1";

/// Username and API key for the remote service.
pub struct Credentials {
    username: String,
    api_key: Zeroizing<String>,
}

impl Credentials {
    /// Derives the API key from a password using HKDF-SHA256.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Credentials`] if the expansion fails.
    pub fn derive(username: &str, password: &[u8], salt: &[u8]) -> CliResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(salt), password);
        let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
        hk.expand(KEY_INFO, &mut okm[..])
            .map_err(|_| CliError::Credentials("HKDF expand failed".into()))?;
        Ok(Self {
            username: username.to_string(),
            api_key: Zeroizing::new(hex::encode(&okm[..])),
        })
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the `Authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("ApiKey {}:{}", self.username, self.api_key.as_str()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
