//! Token module
//!
//! Serialized form: `p=<principal>&t=<scheme>&e=<expiry millis>&s=<signature>`
//!
//! The client holds a [`Token`] and echoes it unchanged. The server turns it
//! back into an [`AuthToken`] through a [`Signer`] that owns the secret.

mod signer;
mod types;

pub use signer::{Signer, MIN_SECRET_LEN};
pub use types::{AuthToken, Token};
