//! Shared fixtures for the integration tests
//!
//! Everything here runs against `MemoryStore` and in-process channels; no
//! database or socket is needed.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use relaychat::backend::conversations::ConversationService;
use relaychat::backend::db::MemoryStore;
use relaychat::backend::error::BackendError;
use relaychat::backend::membership::{EventSink, ParticipantEvent, ParticipantService};
use relaychat::backend::realtime::{Authenticator, FrameReader, FrameWriter, MessageBus};
use relaychat::shared::{Conversation, CreateConversationRequest};

/// Event sink that records what it was given, or fails every call
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ParticipantEvent>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    pub fn events(&self) -> Vec<ParticipantEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn produce(&self, event: ParticipantEvent) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::transient("sink offline"));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Stores and services wired to one in-memory store
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub participants: ParticipantService<MemoryStore>,
    pub conversations: ConversationService<MemoryStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_sink(RecordingSink::default())
    }

    pub fn with_sink(sink: RecordingSink) -> Self {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(sink);
        Self {
            participants: ParticipantService::new(Arc::clone(&store), sink.clone()),
            conversations: ConversationService::new(Arc::clone(&store)),
            store,
            sink,
        }
    }

    /// A fresh user id known to the store
    pub fn user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store.register_user(id);
        id
    }

    /// A group owned by `admin` with `members` joined
    pub async fn group(&self, admin: Uuid, members: &[Uuid]) -> Conversation {
        self.conversations
            .create(
                admin,
                CreateConversationRequest::Group {
                    name: "Team".to_string(),
                    description: None,
                    member_ids: members.to_vec(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn dialog(&self, me: Uuid, peer: Uuid) -> Conversation {
        self.conversations
            .create(me, CreateConversationRequest::Dialog { peer_id: peer })
            .await
            .unwrap()
    }
}

/// Maps fixed tokens to user ids
#[derive(Default)]
pub struct StaticAuthenticator {
    tokens: HashMap<String, Uuid>,
}

impl StaticAuthenticator {
    pub fn with(mut self, token: &str, user_id: Uuid) -> Self {
        self.tokens.insert(token.to_string(), user_id);
        self
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, credentials: &str) -> Result<Uuid, BackendError> {
        self.tokens
            .get(credentials)
            .copied()
            .ok_or_else(|| BackendError::unauthorized("unknown token"))
    }
}

/// What the server side wrote to a fake connection
#[derive(Debug, Clone, PartialEq)]
pub enum Written {
    Frame(serde_json::Value),
    Closed,
}

pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

#[async_trait]
impl FrameReader for ChannelReader {
    async fn read_frame(&mut self) -> Result<Option<Bytes>, BackendError> {
        Ok(self.rx.recv().await)
    }
}

pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<Written>,
}

#[async_trait]
impl FrameWriter for ChannelWriter {
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), BackendError> {
        let value = serde_json::from_slice(&frame)?;
        self.tx
            .send(Written::Frame(value))
            .map_err(|_| BackendError::transient("client gone"))
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        let _ = self.tx.send(Written::Closed);
        Ok(())
    }
}

/// The client's end of a fake duplex connection
pub struct ClientEnd {
    to_server: Option<mpsc::UnboundedSender<Bytes>>,
    from_server: mpsc::UnboundedReceiver<Written>,
}

impl ClientEnd {
    pub fn send_json(&self, value: serde_json::Value) {
        self.send_raw(value.to_string().into_bytes());
    }

    pub fn send_raw(&self, payload: impl Into<Bytes>) {
        if let Some(tx) = &self.to_server {
            tx.send(payload.into()).unwrap();
        }
    }

    /// Close the client's sending half
    pub fn hang_up(&mut self) {
        self.to_server = None;
    }

    pub async fn next(&mut self) -> Option<Written> {
        tokio::time::timeout(Duration::from_secs(2), self.from_server.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn next_frame(&mut self) -> serde_json::Value {
        match self.next().await {
            Some(Written::Frame(value)) => value,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    /// Nothing arrives within a short window
    pub async fn assert_silent(&mut self) {
        let result =
            tokio::time::timeout(Duration::from_millis(150), self.from_server.recv()).await;
        assert!(result.is_err(), "unexpected output: {:?}", result);
    }
}

pub fn duplex() -> (ChannelReader, ChannelWriter, ClientEnd) {
    let (to_server, rx) = mpsc::unbounded_channel();
    let (tx, from_server) = mpsc::unbounded_channel();
    (
        ChannelReader { rx },
        ChannelWriter { tx },
        ClientEnd {
            to_server: Some(to_server),
            from_server,
        },
    )
}

/// Wait until `topic` has `count` live subscribers
pub async fn wait_for_subscribers(bus: &MessageBus, topic: Uuid, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while bus.subscriber_count(topic) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sessions did not subscribe in time");
}
