//! Session clients for the two upstream APIs: the container API (primary)
//! and the reverse-proxy manager (optional secondary source).

pub mod error;
pub mod primary;
pub mod proxy;
pub mod session;
pub mod source;

pub use error::UpstreamError;
pub use primary::{PrimaryClient, PrimaryLogin};
pub use proxy::{ProxyManagerClient, ProxyManagerLogin};
pub use session::{Authenticator, Credential, SessionClient};
pub use source::{ContainerSource, ProxyHostSource};
