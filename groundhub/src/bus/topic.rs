use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::Stream;

use crate::bus::{Message, RateLimit, RateLimiter};
use crate::consts::{DEFAULT_SUBSCRIBER_CAPACITY, DEFAULT_TOPIC_CAPACITY};

/// Subscriber `ID`, unique for the process lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriberId {
    fn new() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Topic configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TopicConf {
    /// Number of published messages a topic may hold before dispatching them.
    pub capacity: usize,
    /// Number of dispatched messages a subscriber may hold before it starts missing messages.
    pub subscriber_capacity: usize,
}

impl Default for TopicConf {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TOPIC_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

/// Named broadcast channel.
///
/// [`Topic`] is a cheap handle to a running [`TopicDispatcher`]. It can be cloned and shared
/// between tasks. Once all handles are dropped, the dispatcher stops.
#[derive(Clone)]
pub struct Topic {
    name: Arc<str>,
    conf: TopicConf,
    messages: mpsc::Sender<Message>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Dispatch loop of a [`Topic`].
///
/// Handles subscriber registrations, unregistrations and published messages one at a time.
/// Pending registration commands always take precedence over buffered messages.
pub struct TopicDispatcher {
    name: Arc<str>,
    messages: mpsc::Receiver<Message>,
    commands: mpsc::UnboundedReceiver<Command>,
    subscribers: Vec<SubscriberEntry>,
}

/// Receive handle of a topic subscriber.
///
/// Dropping the handle unsubscribes it. Messages that were already queued are discarded.
/// [`Subscription`] also implements [`Stream`].
pub struct Subscription {
    id: SubscriberId,
    topic: Arc<str>,
    receiver: mpsc::Receiver<Message>,
    commands: mpsc::UnboundedSender<Command>,
}

enum Command {
    Subscribe(SubscriberEntry),
    Unsubscribe(SubscriberId),
}

struct SubscriberEntry {
    id: SubscriberId,
    sender: mpsc::Sender<Message>,
    limiter: RateLimiter,
}

impl Topic {
    /// Creates a topic and its dispatcher.
    ///
    /// The dispatcher has to be driven by [`TopicDispatcher::run`]. Use [`Topic::spawn`] to do both
    /// at once.
    ///
    /// # Panics
    ///
    /// Panics if either capacity in `conf` is zero.
    pub fn new(name: impl Into<String>, conf: TopicConf) -> (Self, TopicDispatcher) {
        let name: Arc<str> = name.into().into();
        let (messages_tx, messages_rx) = mpsc::channel(conf.capacity);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let topic = Self {
            name: name.clone(),
            conf,
            messages: messages_tx,
            commands: commands_tx,
        };
        let dispatcher = TopicDispatcher {
            name,
            messages: messages_rx,
            commands: commands_rx,
            subscribers: Vec::new(),
        };

        (topic, dispatcher)
    }

    /// Creates a topic and spawns its dispatcher on the current Tokio runtime.
    pub fn spawn(name: impl Into<String>, conf: TopicConf) -> Self {
        let (topic, dispatcher) = Self::new(name, conf);
        tokio::spawn(dispatcher.run());
        topic
    }

    /// Topic name.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Enqueues a message for broadcast without blocking.
    ///
    /// Returns `false` if the message was dropped because the topic inbox is full or the
    /// dispatcher is gone.
    pub fn publish(&self, message: Message) -> bool {
        match self.messages.try_send(message) {
            Ok(_) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("[{}] inbox is full, message dropped", self.name);
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("[{}] dispatcher is closed, message dropped", self.name);
                false
            }
        }
    }

    /// Registers a new subscriber with its own outbound queue and rate limiter.
    pub fn subscribe(&self, limit: RateLimit) -> Subscription {
        let id = SubscriberId::new();
        let (sender, receiver) = mpsc::channel(self.conf.subscriber_capacity);

        let entry = SubscriberEntry {
            id,
            sender,
            limiter: RateLimiter::new(limit),
        };
        if self.commands.send(Command::Subscribe(entry)).is_err() {
            log::debug!("[{}] dispatcher is closed, subscriber {id:?} is dead", self.name);
        }

        Subscription {
            id,
            topic: self.name.clone(),
            receiver,
            commands: self.commands.clone(),
        }
    }

    /// Removes subscriber with the specified `id`.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.commands.send(Command::Unsubscribe(id));
    }
}

impl Debug for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("conf", &self.conf)
            .finish_non_exhaustive()
    }
}

impl TopicDispatcher {
    /// Runs the dispatch loop until every [`Topic`] handle is dropped.
    pub async fn run(mut self) {
        log::trace!("[{}] dispatcher started", self.name);
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command),
                    None => commands_open = false,
                },
                message = self.messages.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => break,
                },
            }
        }

        log::trace!("[{}] dispatcher stopped", self.name);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Subscribe(entry) => {
                log::debug!("[{}] subscriber {:?} registered", self.name, entry.id);
                self.subscribers.push(entry);
            }
            Command::Unsubscribe(id) => {
                let before = self.subscribers.len();
                self.subscribers.retain(|entry| entry.id != id);
                if self.subscribers.len() != before {
                    log::debug!("[{}] subscriber {id:?} unregistered", self.name);
                }
            }
        }
    }

    fn dispatch(&mut self, message: Message) {
        let name = &self.name;

        self.subscribers.retain_mut(|entry| {
            if entry.sender.is_closed() {
                log::debug!("[{name}] subscriber {:?} is gone", entry.id);
                return false;
            }
            if !entry.limiter.try_acquire() {
                return true;
            }

            match entry.sender.try_send(message.clone()) {
                Ok(_) => true,
                Err(TrySendError::Full(_)) => {
                    log::trace!("[{name}] subscriber {:?} is lagging, message dropped", entry.id);
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }
}

impl Subscription {
    /// Subscriber `ID`.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Name of the topic this subscription belongs to.
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    /// Receives the next message.
    ///
    /// Returns `None` once the topic is closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Receives the next message, waiting at most `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns the next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }

    /// Unsubscribes from the topic and discards queued messages.
    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe(self.id));
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
