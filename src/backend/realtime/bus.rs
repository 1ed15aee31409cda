/**
 * Message Bus
 *
 * Topic-addressed fan-out with one `tokio::sync::broadcast` channel per
 * conversation. Channels are created lazily by the first subscriber of a
 * topic and dropped once nobody listens any more.
 *
 * # Delivery
 *
 * Every channel is a bounded ring of `capacity` events. `publish` never
 * waits on a slow subscriber: a subscriber that falls more than `capacity`
 * events behind loses the oldest ones and carries on from the newest. Each
 * subscriber therefore sees at most one copy of every event, in publish
 * order per topic. Nothing is replayed to late subscribers.
 *
 * # Shutdown
 *
 * `close` wakes every subscriber with end-of-stream and rejects further
 * `subscribe`/`publish` calls.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{StreamExt, StreamMap};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::shared::RealtimeEvent;

type Channels = HashMap<Uuid, broadcast::Sender<RealtimeEvent>>;

/// Per-conversation publish/subscribe hub
#[derive(Clone)]
pub struct MessageBus {
    channels: Arc<Mutex<Channels>>,
    capacity: usize,
    closed: CancellationToken,
}

impl MessageBus {
    /// Create a bus whose topics buffer up to `capacity` events each
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            closed: CancellationToken::new(),
        }
    }

    fn channels(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber on every topic in `topics`
    pub fn subscribe(&self, topics: &[Uuid]) -> Result<Subscriber, BackendError> {
        if self.is_closed() {
            return Err(BackendError::transient("message bus is closed"));
        }

        let mut streams = StreamMap::new();
        {
            let mut channels = self.channels();
            for topic in topics {
                if streams.contains_key(topic) {
                    continue;
                }
                streams.insert(*topic, self.receiver(&mut channels, *topic));
            }
        }

        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            streams,
            bus: self.clone(),
            closed: self.closed.child_token(),
        };
        tracing::debug!(
            "[Bus] subscriber {} registered on {} topic(s)",
            subscriber.id,
            subscriber.streams.len()
        );
        Ok(subscriber)
    }

    fn receiver(&self, channels: &mut Channels, topic: Uuid) -> BroadcastStream<RealtimeEvent> {
        let receiver = channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        BroadcastStream::new(receiver)
    }

    /// Deliver `event` to every current subscriber of `topic`
    ///
    /// Returns how many subscribers the event was queued for; zero when the
    /// topic has no listeners.
    pub fn publish(&self, topic: Uuid, event: RealtimeEvent) -> Result<usize, BackendError> {
        if self.is_closed() {
            return Err(BackendError::transient("message bus is closed"));
        }

        let sender = match self.channels().get(&topic) {
            Some(sender) => sender.clone(),
            None => return Ok(0),
        };

        match sender.send(event) {
            Ok(count) => {
                tracing::debug!("[Bus] event on {} fanned out to {} subscriber(s)", topic, count);
                Ok(count)
            }
            Err(_) => Ok(0),
        }
    }

    /// Number of live subscribers on `topic`
    pub fn subscriber_count(&self, topic: Uuid) -> usize {
        self.channels()
            .get(&topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of topics with a channel
    pub fn topic_count(&self) -> usize {
        self.channels().len()
    }

    /// Drop every channel that has no subscribers left
    pub fn cleanup_inactive_channels(&self) -> usize {
        let mut channels = self.channels();
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    fn prune(&self, topics: &[Uuid]) {
        let mut channels = self.channels();
        for topic in topics {
            if channels
                .get(topic)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                channels.remove(topic);
            }
        }
    }

    /// Close the bus, ending every subscriber's stream
    pub fn close(&self) {
        self.closed.cancel();
        self.channels().clear();
        tracing::info!("[Bus] closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// One subscription handle over a set of topics
///
/// Topics can be added and removed while the handle lives. Dropping the
/// handle deregisters it from all its topics.
pub struct Subscriber {
    id: Uuid,
    streams: StreamMap<Uuid, BroadcastStream<RealtimeEvent>>,
    bus: MessageBus,
    closed: CancellationToken,
}

impl Subscriber {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event from any topic, or `None` once the subscriber or the bus
    /// has been closed
    ///
    /// A subscriber with no topics simply waits for closure.
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.recv_from().await.map(|(_, event)| event)
    }

    /// Like [`Subscriber::recv`], also naming the topic the event arrived on
    pub async fn recv_from(&mut self) -> Option<(Uuid, RealtimeEvent)> {
        loop {
            if self.streams.is_empty() {
                self.closed.cancelled().await;
                return None;
            }

            tokio::select! {
                biased;
                _ = self.closed.cancelled() => return None,
                item = self.streams.next() => match item {
                    Some((topic, Ok(event))) => return Some((topic, event)),
                    Some((topic, Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                        tracing::warn!(
                            "[Bus] subscriber {} lagged on {}: {} event(s) dropped",
                            self.id,
                            topic,
                            skipped
                        );
                    }
                    None => continue,
                },
            }
        }
    }

    /// Token that closes this subscriber when cancelled
    ///
    /// Lets a task that does not own the handle unblock `recv`.
    pub fn closer(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn topics(&self) -> Vec<Uuid> {
        self.streams.keys().copied().collect()
    }

    pub fn is_subscribed(&self, topic: Uuid) -> bool {
        self.streams.contains_key(&topic)
    }

    /// Start receiving `topic`; `false` if already subscribed
    ///
    /// Events published before this call are not replayed.
    pub fn subscribe_to(&mut self, topic: Uuid) -> Result<bool, BackendError> {
        if self.bus.is_closed() {
            return Err(BackendError::transient("message bus is closed"));
        }
        if self.streams.contains_key(&topic) {
            return Ok(false);
        }

        let stream = {
            let mut channels = self.bus.channels();
            self.bus.receiver(&mut channels, topic)
        };
        self.streams.insert(topic, stream);
        tracing::debug!("[Bus] subscriber {} added {}", self.id, topic);
        Ok(true)
    }

    /// Stop receiving `topic`, discarding anything still queued for it
    pub fn unsubscribe_from(&mut self, topic: Uuid) -> bool {
        if self.streams.remove(&topic).is_none() {
            return false;
        }
        self.bus.prune(&[topic]);
        tracing::debug!("[Bus] subscriber {} removed {}", self.id, topic);
        true
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        let topics = self.topics();
        // Receivers must be gone before the channels are checked for listeners
        drop(std::mem::replace(&mut self.streams, StreamMap::new()));
        self.bus.prune(&topics);
        tracing::debug!("[Bus] subscriber {} released", self.id);
    }
}
