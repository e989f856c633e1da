//! Provider implementations.
//!
//! Each provider implements the [`Provider`](crate::Provider) trait.
//!
//! ## Available Providers
//!
//! | Provider | Registry Name | Description |
//! |----------|---------------|-------------|
//! | [`SmtpProvider`] | `email` | Email over SMTP, with session reuse |

pub mod email;
pub use email::SmtpProvider;
