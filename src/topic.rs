//! Topic handling module
//!
//! Subscription topics come in three shapes:
//!
//! - stream topics `[server/]type/id/stream`, where any segment may be `*`
//!   (one segment), `**` (one or more) or `{regex}`, optionally followed by
//!   `?<ql>` to filter and project matched events;
//! - peer lifecycle topics `_peer/<event>`;
//! - device query topics `query/<ql>` and `query:<id>/<ql>`.

pub mod error;
pub mod query_topic;
pub mod topic_path;
pub mod topic_pattern;
pub mod topic_segment;

#[cfg(test)]
mod topic_pattern_tests;

pub use error::{TopicError, TopicResult, limits};
pub use query_topic::QueryTopic;
pub use topic_path::{PEER_TOPIC_PREFIX, TopicPath};
pub use topic_pattern::{Topic, TopicKind};
pub use topic_segment::TopicSegment;

/// Published when a peer link is confirmed.
pub const PEER_CONNECT_TOPIC: &str = "_peer/connect";
/// Published when a peer link goes away.
pub const PEER_DISCONNECT_TOPIC: &str = "_peer/disconnect";
