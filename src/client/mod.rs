//! Client helper for the Authorization Code flow.
//!
//! Discovers a server's endpoints from its root URL, builds PKCE-protected
//! authorization URLs, opens them in the user's browser, and exchanges the
//! resulting codes for tokens.
//!
//! ```no_run
//! use authgate::client::Provider;
//! use authgate::pkce;
//!
//! # async fn example() -> authgate::Result<()> {
//! let provider = Provider::connect("https://auth.example.com:9443/").await?;
//!
//! let verifier = pkce::generate_verifier();
//! let state = pkce::generate_state();
//! provider.authorize(
//!     "https://app.example.com/cb",
//!     "app1",
//!     Some(state.as_str()),
//!     Some(verifier.as_str()),
//!     None,
//! )?;
//! // ... receive the code on the redirect URI ...
//! # Ok(())
//! # }
//! ```

mod authorize;
mod discovery;
mod token;

pub use discovery::Provider;
pub use token::TokenGrant;
