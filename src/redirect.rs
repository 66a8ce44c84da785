//! Redirect following.
//!
//! One [`Session::perform`](crate::session::Session::perform) call runs one
//! [`RedirectChain`]: a bounded loop over hops, driven by a
//! [`RedirectContext`] that carries everything that has to survive from one
//! hop to the next.

mod chain;
mod location;

pub use chain::{is_redirect_status, redirect_method, ChainOutcome, RedirectChain, RedirectContext, RedirectPolicy};
pub use location::resolve_location;
