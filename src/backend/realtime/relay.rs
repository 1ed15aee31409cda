/**
 * Session Relay
 *
 * One relay per live duplex connection. It authenticates the connection,
 * subscribes to every conversation the user is joined to, then runs two
 * tasks under one cancellation scope:
 *
 * - inbound: client frame -> decode -> stamp sender -> publish
 * - outbound: bus event -> self-echo filter -> stamp delivery -> client
 *
 * Whichever side fails first cancels the scope; the other side stops with
 * it. Cancelling the process-wide shutdown token cancels every scope.
 *
 * # Membership changes
 *
 * Besides its conversations, a session listens on its user's own topic
 * (the user id). Membership notices about the user arrive there, and the
 * outbound task follows them: a join subscribes the conversation and allows
 * sending to it, a leave or kick does the reverse. The same notice on the
 * conversation topic is skipped so the client sees it once.
 *
 * # States
 *
 * ```text
 * Connecting -> Active -> Draining -> Closed
 *     |                                  ^
 *     +----------------------------------+  (authentication / subscribe failure)
 * ```
 *
 * There is no way back to `Active`; a client that lost its session opens a
 * new connection.
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::bus::{MessageBus, Subscriber};
use super::codec::{decode_inbound, encode_outbound};
use crate::backend::error::BackendError;
use crate::backend::membership::MembershipStore;
use crate::shared::{BusAction, Message, RealtimeEvent};

/// Receiving half of a duplex connection
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Next frame payload; `Ok(None)` once the client closed the connection
    async fn read_frame(&mut self) -> Result<Option<Bytes>, BackendError>;
}

/// Sending half of a duplex connection
#[async_trait]
pub trait FrameWriter: Send + 'static {
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), BackendError>;

    async fn close(&mut self) -> Result<(), BackendError>;
}

/// Resolves connection credentials to a user id
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn authenticate(&self, credentials: &str) -> Result<Uuid, BackendError>;
}

/// Conversations a user should be subscribed to when a session opens
#[async_trait]
pub trait TopicDirectory: Send + Sync + 'static {
    async fn topics_for(&self, user_id: Uuid) -> Result<Vec<Uuid>, BackendError>;
}

#[async_trait]
impl<S: MembershipStore> TopicDirectory for S {
    async fn topics_for(&self, user_id: Uuid) -> Result<Vec<Uuid>, BackendError> {
        self.conversations_for_user(None, user_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Active)
                | (Self::Connecting, Self::Closed)
                | (Self::Active, Self::Draining)
                | (Self::Draining, Self::Closed)
        )
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    AuthenticationFailed,
    SubscribeFailed,
    ClientClosed,
    ProtocolError,
    TransportError,
    BusClosed,
    Shutdown,
}

/// Summary of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub user_id: Option<Uuid>,
    pub close_reason: CloseReason,
    pub transitions: Vec<SessionState>,
    pub frames_in: u64,
    pub frames_out: u64,
    pub suppressed_echoes: u64,
}

/// Whether `event` is this session's own chat send coming back
///
/// The same user's other sessions still receive it, and service events are
/// never filtered.
pub fn is_self_echo(event: &RealtimeEvent, user_id: Uuid, session_id: Uuid) -> bool {
    event.action == BusAction::Send
        && event.message.sender_id == user_id
        && event.origin_session == Some(session_id)
}

/// Conversations a session may currently publish to
///
/// Shared by the inbound task, which checks it, and the outbound task, which
/// updates it from membership notices.
#[derive(Clone, Default)]
struct JoinedTopics(Arc<Mutex<HashSet<Uuid>>>);

impl JoinedTopics {
    fn lock(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn contains(&self, topic: Uuid) -> bool {
        self.lock().contains(&topic)
    }

    fn insert(&self, topic: Uuid) {
        self.lock().insert(topic);
    }

    fn remove(&self, topic: Uuid) {
        self.lock().remove(&topic);
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

pub struct SessionRelay {
    session_id: Uuid,
    bus: MessageBus,
    authenticator: Arc<dyn Authenticator>,
    directory: Arc<dyn TopicDirectory>,
    scope: CancellationToken,
    transitions: Vec<SessionState>,
}

impl SessionRelay {
    /// Create a relay whose scope is a child of `shutdown`
    pub fn new(
        bus: MessageBus,
        authenticator: Arc<dyn Authenticator>,
        directory: Arc<dyn TopicDirectory>,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            bus,
            authenticator,
            directory,
            scope: shutdown.child_token(),
            transitions: vec![SessionState::Connecting],
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Cancelling this token drains the session
    pub fn scope(&self) -> CancellationToken {
        self.scope.clone()
    }

    fn state(&self) -> SessionState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(SessionState::Connecting)
    }

    fn transition(&mut self, next: SessionState) {
        let current = self.state();
        if !current.can_transition_to(next) {
            tracing::warn!(
                "[Relay] session {} ignored transition {:?} -> {:?}",
                self.session_id,
                current,
                next
            );
            return;
        }
        tracing::debug!("[Relay] session {} {:?} -> {:?}", self.session_id, current, next);
        self.transitions.push(next);
    }

    /// Drive the session until it closes
    pub async fn run<R, W>(mut self, credentials: &str, reader: R, mut writer: W) -> SessionReport
    where
        R: FrameReader,
        W: FrameWriter,
    {
        let user_id = match self.authenticator.authenticate(credentials).await {
            Ok(user_id) => user_id,
            Err(err) => {
                tracing::warn!("[Relay] session {} rejected: {}", self.session_id, err);
                return self.abort(&mut writer, None, CloseReason::AuthenticationFailed).await;
            }
        };

        let joined = JoinedTopics::default();
        let subscriber = match self.subscribe(user_id, &joined).await {
            Ok(subscriber) => subscriber,
            Err(err) => {
                tracing::warn!(
                    "[Relay] session {} for {} could not subscribe: {}",
                    self.session_id,
                    user_id,
                    err
                );
                return self.abort(&mut writer, Some(user_id), CloseReason::SubscribeFailed).await;
            }
        };

        self.transition(SessionState::Active);
        tracing::info!(
            "[Relay] session {} active for {} on {} conversation(s)",
            self.session_id,
            user_id,
            joined.len()
        );

        let reason = Arc::new(OnceLock::new());
        let closer = subscriber.closer();

        let inbound = tokio::spawn(
            InboundLoop {
                session_id: self.session_id,
                user_id,
                joined: joined.clone(),
                bus: self.bus.clone(),
                scope: self.scope.clone(),
                reason: Arc::clone(&reason),
            }
            .run(reader),
        );
        let outbound = tokio::spawn(
            OutboundLoop {
                session_id: self.session_id,
                user_id,
                joined,
                scope: self.scope.clone(),
                reason: Arc::clone(&reason),
            }
            .run(subscriber, writer),
        );

        self.scope.cancelled().await;
        self.transition(SessionState::Draining);
        closer.cancel();

        let (inbound, outbound) = tokio::join!(inbound, outbound);
        let frames_in = inbound.unwrap_or_else(|err| {
            tracing::error!("[Relay] session {} inbound task failed: {}", self.session_id, err);
            0
        });
        let (frames_out, suppressed_echoes) = outbound.unwrap_or_else(|err| {
            tracing::error!("[Relay] session {} outbound task failed: {}", self.session_id, err);
            (0, 0)
        });

        self.transition(SessionState::Closed);
        let close_reason = reason.get().copied().unwrap_or(CloseReason::Shutdown);
        tracing::info!(
            "[Relay] session {} for {} closed ({:?}): {} in, {} out",
            self.session_id,
            user_id,
            close_reason,
            frames_in,
            frames_out
        );

        SessionReport {
            session_id: self.session_id,
            user_id: Some(user_id),
            close_reason,
            transitions: self.transitions,
            frames_in,
            frames_out,
            suppressed_echoes,
        }
    }

    /// Subscribe the user's own topic, then every joined conversation
    ///
    /// The own topic comes first so a membership change committed after the
    /// directory lookup is still seen.
    async fn subscribe(
        &self,
        user_id: Uuid,
        joined: &JoinedTopics,
    ) -> Result<Subscriber, BackendError> {
        let mut subscriber = self.bus.subscribe(&[user_id])?;
        for topic in self.directory.topics_for(user_id).await? {
            subscriber.subscribe_to(topic)?;
            joined.insert(topic);
        }
        Ok(subscriber)
    }

    async fn abort<W: FrameWriter>(
        mut self,
        writer: &mut W,
        user_id: Option<Uuid>,
        reason: CloseReason,
    ) -> SessionReport {
        if let Err(err) = writer.close().await {
            tracing::debug!("[Relay] session {} close failed: {}", self.session_id, err);
        }
        self.scope.cancel();
        self.transition(SessionState::Closed);

        SessionReport {
            session_id: self.session_id,
            user_id,
            close_reason: reason,
            transitions: self.transitions,
            frames_in: 0,
            frames_out: 0,
            suppressed_echoes: 0,
        }
    }
}

/// Ends the session with `reason` unless another reason was recorded first
fn fail(scope: &CancellationToken, reason: &OnceLock<CloseReason>, value: CloseReason) {
    let _ = reason.set(value);
    scope.cancel();
}

struct InboundLoop {
    session_id: Uuid,
    user_id: Uuid,
    joined: JoinedTopics,
    bus: MessageBus,
    scope: CancellationToken,
    reason: Arc<OnceLock<CloseReason>>,
}

impl InboundLoop {
    async fn run<R: FrameReader>(self, mut reader: R) -> u64 {
        let mut frames = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.scope.cancelled() => break,
                next = reader.read_frame() => next,
            };

            let payload = match next {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    tracing::debug!("[Relay] session {} closed by client", self.session_id);
                    fail(&self.scope, &self.reason, CloseReason::ClientClosed);
                    break;
                }
                Err(err) => {
                    tracing::warn!("[Relay] session {} read failed: {}", self.session_id, err);
                    fail(&self.scope, &self.reason, CloseReason::TransportError);
                    break;
                }
            };
            frames += 1;

            if let Err(err) = self.publish(&payload) {
                let reason = match err {
                    BackendError::ProtocolError { .. } => CloseReason::ProtocolError,
                    _ => CloseReason::BusClosed,
                };
                tracing::warn!("[Relay] session {} inbound: {}", self.session_id, err);
                fail(&self.scope, &self.reason, reason);
                break;
            }
        }

        frames
    }

    fn publish(&self, payload: &[u8]) -> Result<(), BackendError> {
        let frame = decode_inbound(payload)?;
        if !self.joined.contains(frame.conversation_id) {
            return Err(BackendError::protocol(format!(
                "not subscribed to conversation {}",
                frame.conversation_id
            )));
        }

        let message = Message::chat(
            self.user_id,
            frame.conversation_id,
            frame.content,
            frame.content_type,
        );
        self.bus.publish(
            frame.conversation_id,
            RealtimeEvent::send(message, self.session_id),
        )?;
        Ok(())
    }
}

struct OutboundLoop {
    session_id: Uuid,
    user_id: Uuid,
    joined: JoinedTopics,
    scope: CancellationToken,
    reason: Arc<OnceLock<CloseReason>>,
}

impl OutboundLoop {
    async fn run<W: FrameWriter>(self, mut subscriber: Subscriber, mut writer: W) -> (u64, u64) {
        let closed = subscriber.closer();
        let (mut frames, mut suppressed) = (0u64, 0u64);

        while let Some((topic, event)) = subscriber.recv_from().await {
            if is_self_echo(&event, self.user_id, self.session_id) {
                suppressed += 1;
                continue;
            }
            if event.concerns(self.user_id) {
                if topic != self.user_id {
                    // Delivered on the user's own topic
                    continue;
                }
                if let Err(err) = self.follow_membership(&mut subscriber, &event) {
                    tracing::warn!(
                        "[Relay] session {} membership update failed: {}",
                        self.session_id,
                        err
                    );
                    fail(&self.scope, &self.reason, CloseReason::BusClosed);
                    break;
                }
            }

            let event = RealtimeEvent {
                message: event.message.delivered(),
                ..event
            };
            let frame = match encode_outbound(&event) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::error!("[Relay] session {} encode failed: {}", self.session_id, err);
                    fail(&self.scope, &self.reason, CloseReason::ProtocolError);
                    break;
                }
            };

            let written = tokio::select! {
                biased;
                _ = closed.cancelled() => break,
                written = writer.write_frame(frame) => written,
            };
            if let Err(err) = written {
                tracing::warn!("[Relay] session {} write failed: {}", self.session_id, err);
                fail(&self.scope, &self.reason, CloseReason::TransportError);
                break;
            }
            frames += 1;
        }

        if !self.scope.is_cancelled() {
            tracing::warn!("[Relay] session {} lost its bus subscription", self.session_id);
            fail(&self.scope, &self.reason, CloseReason::BusClosed);
        }

        drop(subscriber);
        if let Err(err) = writer.close().await {
            tracing::debug!("[Relay] session {} close failed: {}", self.session_id, err);
        }
        (frames, suppressed)
    }

    /// Apply a membership notice about this session's own user
    fn follow_membership(
        &self,
        subscriber: &mut Subscriber,
        event: &RealtimeEvent,
    ) -> Result<(), BackendError> {
        let conversation_id = event.topic();
        match event.action {
            BusAction::Join => {
                subscriber.subscribe_to(conversation_id)?;
                self.joined.insert(conversation_id);
                tracing::info!(
                    "[Relay] session {} joined conversation {}",
                    self.session_id,
                    conversation_id
                );
            }
            BusAction::Leave | BusAction::Kick => {
                self.joined.remove(conversation_id);
                subscriber.unsubscribe_from(conversation_id);
                tracing::info!(
                    "[Relay] session {} dropped conversation {} ({:?})",
                    self.session_id,
                    conversation_id,
                    event.action
                );
            }
            BusAction::Send => {}
        }
        Ok(())
    }
}
