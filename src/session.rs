//! Sessions: [`Session`], [`SessionId`] and [`SessionHandle`].

mod session;

pub use session::Session;
pub use session::SessionHandle;
pub use session::SessionId;
