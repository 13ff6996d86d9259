pub mod dispatch;
pub mod forwarder;
pub mod handler;

pub use dispatch::{DispatchError, DispatchState, Dispatcher, RetryPolicy};
pub use forwarder::{ForwardError, ForwardRequest, Forwarder, HttpForwarder};
