//! Secret handling for provider credentials
//!
//! Credentials are never stored in provider or registry state that
//! could be serialized. Providers hold an opaque `credential_ref` and
//! resolve it through a process-scoped [`SecretResolver`] at request
//! time.

use crate::error::{Error, Result};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string that is wiped from memory when dropped
///
/// Debug and Display are redacted; comparison is constant-time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Create a new secure string
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    /// Temporarily expose the value; do not store the reference
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Length of the secret in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the secret is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureString([REDACTED, {} bytes])", self.inner.len())
    }
}

impl std::fmt::Display for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        self.inner.as_bytes().ct_eq(other.inner.as_bytes()).into()
    }
}

impl Eq for SecureString {}

/// Resolves an opaque credential reference to a secret
pub trait SecretResolver: Send + Sync {
    /// Resolve `credential_ref` to the secret it names.
    ///
    /// Resolution failure is an auth failure: the request that needed
    /// the secret cannot proceed.
    fn resolve(&self, credential_ref: &str) -> Result<SecureString>;
}

/// Resolver that reads secrets from process environment variables.
///
/// The credential reference is the variable name, e.g.
/// `OPENROUTER_API_KEY`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, credential_ref: &str) -> Result<SecureString> {
        match std::env::var(credential_ref) {
            Ok(value) if !value.is_empty() => Ok(SecureString::new(value)),
            _ => Err(Error::Auth(format!(
                "credential reference {credential_ref} did not resolve"
            ))),
        }
    }
}

/// Fixed-value resolver for tests.
pub struct StaticSecretResolver {
    secret: SecureString,
}

impl StaticSecretResolver {
    /// Create a resolver that answers every reference with `secret`
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecureString::new(secret),
        }
    }
}

impl SecretResolver for StaticSecretResolver {
    fn resolve(&self, _credential_ref: &str) -> Result<SecureString> {
        Ok(self.secret.clone())
    }
}
