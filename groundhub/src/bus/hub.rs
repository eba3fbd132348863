use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::bus::topics::DEFAULT_TOPICS;
use crate::bus::{Endpoint, Envelope, EnvelopeKind, Message, RateLimit, Subscription};
use crate::bus::{Topic, TopicConf};
use crate::prelude::*;

/// Message hub.
///
/// Owns a fixed set of [`Topic`]s created at startup and a dynamic set of named [`Endpoint`]s.
/// [`Hub`] is a cheap handle and can be cloned and shared between tasks.
#[derive(Clone, Debug)]
pub struct Hub(Arc<HubInner>);

#[derive(Debug)]
struct HubInner {
    topics: HashMap<String, Topic>,
    endpoints: RwLock<HashMap<String, Arc<dyn Endpoint>>>,
}

/// Builder for [`Hub`].
#[derive(Clone, Debug, Default)]
pub struct HubBuilder {
    conf: TopicConf,
    topics: Vec<String>,
}

impl HubBuilder {
    /// Topic configuration shared by all topics.
    pub fn conf(mut self, conf: TopicConf) -> Self {
        self.conf = conf;
        self
    }

    /// Adds a topic.
    pub fn topic(mut self, name: impl Into<String>) -> Self {
        self.topics.push(name.into());
        self
    }

    /// Adds all well-known topics.
    pub fn default_topics(mut self) -> Self {
        self.topics
            .extend(DEFAULT_TOPICS.iter().map(|name| name.to_string()));
        self
    }

    /// Creates topics, spawns their dispatchers and returns a hub.
    ///
    /// Must be called within a Tokio runtime. Fails if a topic name is repeated.
    pub fn build(self) -> Result<Hub> {
        let mut topics = HashMap::with_capacity(self.topics.len());

        for name in self.topics {
            if topics.contains_key(&name) {
                return Err(BusError::DuplicateTopic(name).into());
            }
            let topic = Topic::spawn(name.clone(), self.conf);
            topics.insert(name, topic);
        }

        Ok(Hub(Arc::new(HubInner {
            topics,
            endpoints: RwLock::new(HashMap::new()),
        })))
    }
}

impl Hub {
    /// Instantiates an empty [`HubBuilder`].
    pub fn builder() -> HubBuilder {
        HubBuilder::default()
    }

    /// Creates a hub with all well-known topics and default configuration.
    pub fn with_default_topics() -> Self {
        let mut topics = HashMap::with_capacity(DEFAULT_TOPICS.len());
        for name in DEFAULT_TOPICS {
            topics.insert(name.to_string(), Topic::spawn(name, TopicConf::default()));
        }

        Hub(Arc::new(HubInner {
            topics,
            endpoints: RwLock::new(HashMap::new()),
        }))
    }

    /// Topic by name.
    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.0.topics.get(name)
    }

    /// Sorted names of all topics.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Publishes a message to a topic.
    ///
    /// Returns `false` if the topic doesn't exist or the message was dropped.
    pub fn publish(&self, topic: &str, message: Message) -> bool {
        match self.topic(topic) {
            Some(topic) => topic.publish(message),
            None => {
                log::debug!("[hub] unknown topic `{topic}`, message dropped");
                false
            }
        }
    }

    /// Serializes `value` and publishes it to a topic.
    pub fn publish_json<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> Result<bool> {
        Ok(self.publish(topic, Message::encode(value)?))
    }

    /// Subscribes to a topic.
    pub fn subscribe(&self, topic: &str, limit: RateLimit) -> Result<Subscription> {
        match self.topic(topic) {
            Some(topic) => Ok(topic.subscribe(limit)),
            None => Err(BusError::UnknownTopic(topic.to_string()).into()),
        }
    }

    /// Registers an endpoint under its own name, replacing and closing a previous one.
    pub fn register_endpoint(&self, endpoint: Arc<dyn Endpoint>) {
        let name = endpoint.name().to_string();
        let previous = self
            .0
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), endpoint);

        if let Some(previous) = previous {
            log::debug!("[hub] endpoint `{name}` replaced");
            previous.close();
        } else {
            log::debug!("[hub] endpoint `{name}` registered");
        }
    }

    /// Removes an endpoint by name and closes it.
    pub fn remove_endpoint(&self, name: &str) -> Option<Arc<dyn Endpoint>> {
        let removed = self
            .0
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        if let Some(endpoint) = &removed {
            log::debug!("[hub] endpoint `{name}` removed");
            endpoint.close();
        }
        removed
    }

    /// Endpoint by name.
    pub fn endpoint(&self, name: &str) -> Option<Arc<dyn Endpoint>> {
        self.0
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Sends a payload to an endpoint.
    pub fn send(&self, endpoint: &str, payload: &[u8]) -> Result<bool> {
        match self.endpoint(endpoint) {
            Some(endpoint) => Ok(endpoint.send(payload)),
            None => Err(BusError::UnknownEndpoint(endpoint.to_string()).into()),
        }
    }

    /// Connectivity of all registered endpoints by name.
    pub fn endpoint_status(&self) -> BTreeMap<String, bool> {
        self.0
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, endpoint)| (name.clone(), endpoint.is_connected()))
            .collect()
    }

    /// Routes an inbound [`Envelope`] encoded as JSON.
    ///
    /// `stream` envelopes are published to the topic named by `rec`, `send` envelopes are
    /// delivered to the endpoint named by `rec`. Malformed envelopes, unknown kinds and unknown
    /// recipients are logged and dropped. Returns `true` if the payload was accepted.
    pub fn handle_message(&self, bytes: &[u8]) -> bool {
        let envelope = match Envelope::from_slice(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("[hub] malformed envelope: {err:?}");
                return false;
            }
        };
        self.route(envelope)
    }

    /// Routes a parsed [`Envelope`]. See [`Hub::handle_message`].
    pub fn route(&self, envelope: Envelope) -> bool {
        match envelope.kind {
            EnvelopeKind::Stream => {
                if self.topic(&envelope.rec).is_none() {
                    log::warn!("[hub] stream to unknown topic `{}`", envelope.rec);
                    return false;
                }
                self.publish(&envelope.rec, Message::new(envelope.data))
            }
            EnvelopeKind::Send => {
                let payload = envelope.data.to_string().into_bytes();
                match self.send(&envelope.rec, &payload) {
                    Ok(delivered) => delivered,
                    Err(err) => {
                        log::warn!("[hub] send failed: {err}");
                        false
                    }
                }
            }
            EnvelopeKind::Unknown => {
                log::warn!("[hub] unknown envelope type for `{}`", envelope.rec);
                false
            }
        }
    }

    /// Closes and removes all endpoints.
    pub fn close_endpoints(&self) {
        let endpoints: Vec<_> = self
            .0
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (_, endpoint) in endpoints {
            endpoint.close();
        }
    }
}
