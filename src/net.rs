//! Network model: requests, responses, the transport seam, proxy selection and
//! HTTP date parsing.

pub mod http_date;
pub mod proxy;
mod request;
mod response;
mod transport;

pub use proxy::{ProxyConfig, ProxyScheme, ProxyTarget};
pub use request::Request;
pub use response::{ReleaseHook, Response};
pub use transport::{HttpTransport, HttpTransportBuilder, Transport};
