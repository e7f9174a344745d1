//! Subscription brokering
//!
//! The [`EventBrokerActor`] reference-counts interest per topic key and per
//! upstream: the local `PubSub`, device-query observers and peer links.
//! Overlapping subscriptions share one upstream, which is torn down when the
//! last of them goes away.

pub mod error;
mod event_broker;
mod interest;
mod metrics;


pub use error::BrokerError;
pub use event_broker::{
	BrokerSnapshot, EventBrokerActor, EventBrokerController, EventBrokerHandle,
	SubscribeQuery,
};
pub use interest::{ClientId, ClientRegistration, Delivery, SubscriptionId};
pub use metrics::{BrokerMetrics, MetricsSnapshot};
