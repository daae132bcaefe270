//! Authenticator capability — pluggable username/password validation.
//!
//! The server never talks to PAM or the account database directly; it goes
//! through the [`Authenticator`] trait. A successful check yields the numeric
//! identity of the user at that moment. Group membership is a separate query
//! because Bearer requests re-resolve groups from the username stored in the
//! token, not from a password check.
//!
//! The only implementation shipped here is [`TestAuthenticator`], driven by
//! the `TestPassword` configuration directive. OS back-ends (PAM, BSD auth)
//! plug in behind the trait when embedding the server.

use subtle::ConstantTimeEq;

/// Upper bound on the number of supplementary groups attached to a request.
pub const MAX_GROUPS: usize = 100;

/// Numeric identity of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    /// POSIX user id
    pub uid: u32,
    /// Primary POSIX group id
    pub gid: u32,
}

/// Capability that validates a username/password pair against an account
/// database and resolves group membership.
pub trait Authenticator: Send + Sync {
    /// Validate the pair; `Some` carries the user's numeric identity.
    fn authenticate(&self, username: &str, password: &str) -> Option<UserIdentity>;

    /// All group ids for `username`, primary group included.
    ///
    /// Implementations must not return more than [`MAX_GROUPS`] entries.
    fn groups(&self, username: &str, primary_gid: u32) -> Vec<u32> {
        let _ = username;
        vec![primary_gid]
    }
}

/// Test back-end: accepts any username whose password equals the configured
/// plaintext. Identity and groups are fixed at construction.
pub struct TestAuthenticator {
    password: String,
    identity: UserIdentity,
    groups: Vec<u32>,
}

impl TestAuthenticator {
    /// Create a test authenticator with the identity of the current process.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        let (uid, gid) = process_identity();
        Self::with_identity(password, UserIdentity { uid, gid }, vec![gid])
    }

    /// Create a test authenticator with an explicit identity and group list.
    #[must_use]
    pub fn with_identity(
        password: impl Into<String>,
        identity: UserIdentity,
        mut groups: Vec<u32>,
    ) -> Self {
        groups.truncate(MAX_GROUPS);
        Self {
            password: password.into(),
            identity,
            groups,
        }
    }
}

impl Authenticator for TestAuthenticator {
    fn authenticate(&self, _username: &str, password: &str) -> Option<UserIdentity> {
        // Constant-time comparison; the password is the only secret here.
        let ok: bool = self
            .password
            .as_bytes()
            .ct_eq(password.as_bytes())
            .into();
        ok.then_some(self.identity)
    }

    fn groups(&self, _username: &str, _primary_gid: u32) -> Vec<u32> {
        self.groups.clone()
    }
}

/// Best-effort uid/gid of the running process without unsafe code.
///
/// On Linux `/proc/self` is owned by the process credentials; elsewhere the
/// lookup falls back to 0/0, which only affects the test back-end defaults.
#[must_use]
pub fn process_identity() -> (u32, u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let Ok(meta) = std::fs::metadata("/proc/self") {
            return (meta.uid(), meta.gid());
        }
    }
    (0, 0)
}
