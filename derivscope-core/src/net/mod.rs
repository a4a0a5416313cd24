//! Networking: throttle, transport seam, and the retrying fetch client.

pub mod fetch;
pub mod throttle;
pub mod transport;

pub use fetch::{
    Endpoint, FetchClient, FetchError, FetchErrorKind, FetchObserver, RetryPolicy, StderrObserver,
};
pub use throttle::Throttle;
pub use transport::{HttpTransport, RawResponse, Transport, TransportError};
