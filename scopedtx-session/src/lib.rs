//! scopedtx-session: named-parameter SQL sessions
//!
//! A [`Session`] wraps whichever connection a [`scopedtx_core::Context`]
//! resolves to, so repository code written against sessions joins an
//! enclosing transaction without knowing about it.

pub mod error;
pub mod named;
pub mod params;
pub mod session;

pub use error::{Error, Result};
pub use params::{Params, Value};
pub use session::{with_session, Session};
