//! Client event sessions
//!
//! A [`ClientSession`] serves one external subscriber over a transport.
//! Requests are `subscribe{topic, limit?}` and `unsubscribe{subscriptionId}`;
//! every matching publication is pushed as an `event` frame tagged with the
//! subscription id, after the subscription's stream query (if any) has
//! filtered and projected it.

mod client_session;
pub mod error;
pub mod frame;


pub use client_session::{ClientSession, ClientSessionHandle};
pub use error::ProtocolError;
pub use frame::{ClientFrame, ClientRequest, RejectedRequest};
