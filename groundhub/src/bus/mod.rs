//! # Pub/sub message bus
//!
//! The bus is a set of named [`Topic`]s and [`Endpoint`]s owned by a [`Hub`].
//!
//! Each topic runs its own dispatch loop ([`TopicDispatcher`]) which fans out published messages
//! to subscribers. Every subscriber owns a bounded outbound queue and an independent token-bucket
//! rate limiter. The bus never blocks publishers and never waits for slow subscribers:
//!
//! * [`Topic::publish`] returns `false` when the topic inbox is full;
//! * a subscriber which is rate limited or whose queue is full simply misses the message.
//!
//! Messages reach a particular subscriber in publish order, but there is no ordering across
//! topics and no delivery guarantee at all.
//!
//! External parties address topics and endpoints by name through [`Envelope`]s handled by
//! [`Hub::handle_message`].

mod endpoint;
mod envelope;
mod hub;
mod message;
mod rate;
mod topic;

pub mod topics;

pub use endpoint::{Endpoint, QueueEndpoint};
pub use envelope::{Envelope, EnvelopeKind};
pub use hub::{Hub, HubBuilder};
pub use message::Message;
pub use rate::RateLimit;
pub use topic::{SubscriberId, Subscription, Topic, TopicConf, TopicDispatcher};

pub(crate) use rate::RateLimiter;
