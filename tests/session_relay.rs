//! Session relay behavior over in-process connections

mod common;

use assert_matches::assert_matches;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::{duplex, wait_for_subscribers, ClientEnd, Fixture, StaticAuthenticator, Written};
use relaychat::backend::db::MemoryStore;
use relaychat::backend::membership::{BusEventSink, ParticipantService};
use relaychat::backend::realtime::{
    CloseReason, MessageBus, SessionRelay, SessionReport, SessionState, TopicDirectory,
};
use relaychat::shared::{BusAction, Message, ParticipantStatus, RealtimeEvent};

struct Harness {
    fx: Fixture,
    bus: MessageBus,
    shutdown: CancellationToken,
    auth: Arc<StaticAuthenticator>,
}

impl Harness {
    fn new(auth: StaticAuthenticator, fx: Fixture) -> Self {
        Self {
            fx,
            bus: MessageBus::new(16),
            shutdown: CancellationToken::new(),
            auth: Arc::new(auth),
        }
    }

    fn connect(&self, token: &str) -> (JoinHandle<SessionReport>, ClientEnd) {
        let directory: Arc<dyn TopicDirectory> = self.fx.store.clone();
        let relay = SessionRelay::new(self.bus.clone(), self.auth.clone(), directory, &self.shutdown);
        let (reader, writer, client) = duplex();
        let token = token.to_string();
        let handle = tokio::spawn(async move { relay.run(&token, reader, writer).await });
        (handle, client)
    }

    /// Participant service whose events go out on this harness's bus
    fn live_participants(&self) -> ParticipantService<MemoryStore> {
        ParticipantService::new(
            Arc::clone(&self.fx.store),
            Arc::new(BusEventSink::new(self.bus.clone())),
        )
    }
}

fn chat(conversation_id: Uuid, content: &str) -> serde_json::Value {
    json!({"conversation_id": conversation_id, "content": content})
}

#[tokio::test]
async fn sender_session_gets_no_echo_but_other_devices_and_members_do() {
    let fx = Fixture::new();
    let (e, f) = (fx.user(), fx.user());
    let group = fx.group(e, &[f]).await;
    let auth = StaticAuthenticator::default()
        .with("e-phone", e)
        .with("e-laptop", e)
        .with("f", f);
    let h = Harness::new(auth, fx);

    let (phone, mut phone_client) = h.connect("e-phone");
    let (laptop, mut laptop_client) = h.connect("e-laptop");
    let (f_session, mut f_client) = h.connect("f");
    wait_for_subscribers(&h.bus, group.id, 3).await;

    phone_client.send_json(chat(group.id, "hello"));

    for client in [&mut laptop_client, &mut f_client] {
        let frame = client.next_frame().await;
        assert_eq!(frame["action"], "send");
        assert_eq!(frame["message"]["content"], "hello");
        assert_eq!(frame["message"]["sender_id"], json!(e));
        assert_eq!(frame["message"]["is_service"], false);
        assert!(frame["message"]["delivered_at"].is_string());
    }
    phone_client.assert_silent().await;

    h.shutdown.cancel();
    let phone = phone.await.unwrap();
    let laptop = laptop.await.unwrap();
    let f_report = f_session.await.unwrap();

    assert_eq!(phone.close_reason, CloseReason::Shutdown);
    assert_eq!((phone.frames_in, phone.frames_out, phone.suppressed_echoes), (1, 0, 1));
    assert_eq!((laptop.frames_out, laptop.suppressed_echoes), (1, 0));
    assert_eq!(f_report.frames_out, 1);
    assert_eq!(
        phone.transitions,
        vec![
            SessionState::Connecting,
            SessionState::Active,
            SessionState::Draining,
            SessionState::Closed
        ]
    );
}

#[tokio::test]
async fn service_messages_reach_every_session_of_the_actor() {
    let fx = Fixture::new();
    let (admin, member) = (fx.user(), fx.user());
    let group = fx.group(admin, &[member]).await;
    let auth = StaticAuthenticator::default()
        .with("one", admin)
        .with("two", admin);
    let h = Harness::new(auth, fx);

    let (_s1, mut one) = h.connect("one");
    let (_s2, mut two) = h.connect("two");
    wait_for_subscribers(&h.bus, group.id, 2).await;

    let notice = Message::service(admin, group.id, "member was removed".to_string());
    h.bus
        .publish(group.id, RealtimeEvent::service(BusAction::Kick, notice, member))
        .unwrap();

    for client in [&mut one, &mut two] {
        let frame = client.next_frame().await;
        assert_eq!(frame["action"], "kick");
        assert_eq!(frame["message"]["is_service"], true);
        assert_eq!(frame["target_user_id"], json!(member));
    }
    h.shutdown.cancel();
}

#[tokio::test]
async fn sessions_only_see_their_own_conversations() {
    let fx = Fixture::new();
    let (a, b, c) = (fx.user(), fx.user(), fx.user());
    let ab = fx.dialog(a, b).await;
    let bc = fx.dialog(b, c).await;
    let auth = StaticAuthenticator::default().with("a", a).with("b", b).with("c", c);
    let h = Harness::new(auth, fx);

    let (_a, mut a_client) = h.connect("a");
    let (_b, mut b_client) = h.connect("b");
    let (_c, mut c_client) = h.connect("c");
    wait_for_subscribers(&h.bus, ab.id, 2).await;
    wait_for_subscribers(&h.bus, bc.id, 2).await;

    a_client.send_json(chat(ab.id, "just us"));

    assert_eq!(b_client.next_frame().await["message"]["content"], "just us");
    c_client.assert_silent().await;
    h.shutdown.cancel();
}

#[tokio::test]
async fn kicked_member_stops_receiving_and_cannot_send() {
    let fx = Fixture::new();
    let (admin, member) = (fx.user(), fx.user());
    let group = fx.group(admin, &[member]).await;
    let auth = StaticAuthenticator::default().with("admin", admin).with("member", member);
    let h = Harness::new(auth, fx);
    let participants = h.live_participants();

    let (admin_session, mut admin_client) = h.connect("admin");
    let (member_session, mut member_client) = h.connect("member");
    wait_for_subscribers(&h.bus, group.id, 2).await;

    participants
        .update_status(admin, group.id, member, ParticipantStatus::Kicked)
        .await
        .unwrap();

    let seen_by_admin = admin_client.next_frame().await;
    assert_eq!(seen_by_admin["action"], "kick");
    assert_eq!(seen_by_admin["target_user_id"], json!(member));

    // Exactly one notice for the kicked member, then nothing from the group
    let seen_by_member = member_client.next_frame().await;
    assert_eq!(seen_by_member["action"], "kick");
    assert_eq!(seen_by_member["message"]["conversation_id"], json!(group.id));
    wait_for_subscribers(&h.bus, group.id, 1).await;
    assert_eq!(h.bus.subscriber_count(group.id), 1);

    admin_client.send_json(chat(group.id, "secret after kick"));
    member_client.assert_silent().await;

    member_client.send_json(chat(group.id, "still here after kick"));
    let report = member_session.await.unwrap();
    assert_eq!(report.close_reason, CloseReason::ProtocolError);
    admin_client.assert_silent().await;

    h.shutdown.cancel();
    assert_eq!(admin_session.await.unwrap().close_reason, CloseReason::Shutdown);
}

#[tokio::test]
async fn member_who_leaves_stops_receiving_on_every_device() {
    let fx = Fixture::new();
    let (admin, member) = (fx.user(), fx.user());
    let group = fx.group(admin, &[member]).await;
    let auth = StaticAuthenticator::default()
        .with("admin", admin)
        .with("phone", member)
        .with("laptop", member);
    let h = Harness::new(auth, fx);
    let participants = h.live_participants();

    let (_admin, mut admin_client) = h.connect("admin");
    let (_phone, mut phone) = h.connect("phone");
    let (_laptop, mut laptop) = h.connect("laptop");
    wait_for_subscribers(&h.bus, group.id, 3).await;

    participants
        .update_status(member, group.id, member, ParticipantStatus::Left)
        .await
        .unwrap();

    for client in [&mut phone, &mut laptop] {
        assert_eq!(client.next_frame().await["action"], "leave");
    }
    assert_eq!(admin_client.next_frame().await["action"], "leave");
    wait_for_subscribers(&h.bus, group.id, 1).await;
    assert_eq!(h.bus.subscriber_count(group.id), 1);

    admin_client.send_json(chat(group.id, "bye"));
    phone.assert_silent().await;
    laptop.assert_silent().await;
    h.shutdown.cancel();
}

#[tokio::test]
async fn invited_member_starts_receiving_and_sending() {
    let fx = Fixture::new();
    let (admin, invitee) = (fx.user(), fx.user());
    let group = fx.group(admin, &[]).await;
    let auth = StaticAuthenticator::default().with("admin", admin).with("invitee", invitee);
    let h = Harness::new(auth, fx);
    let participants = h.live_participants();

    let (_admin, mut admin_client) = h.connect("admin");
    let (_invitee, mut invitee_client) = h.connect("invitee");
    wait_for_subscribers(&h.bus, group.id, 1).await;
    wait_for_subscribers(&h.bus, invitee, 1).await;

    admin_client.send_json(chat(group.id, "before invite"));
    invitee_client.assert_silent().await;

    participants.invite(admin, group.id, invitee).await.unwrap();

    let joined = invitee_client.next_frame().await;
    assert_eq!(joined["action"], "join");
    assert_eq!(joined["target_user_id"], json!(invitee));
    assert_eq!(admin_client.next_frame().await["action"], "join");
    assert_eq!(h.bus.subscriber_count(group.id), 2);

    admin_client.send_json(chat(group.id, "welcome"));
    assert_eq!(invitee_client.next_frame().await["message"]["content"], "welcome");

    invitee_client.send_json(chat(group.id, "thanks"));
    assert_eq!(admin_client.next_frame().await["message"]["content"], "thanks");
    h.shutdown.cancel();
}

#[tokio::test]
async fn unknown_credentials_close_immediately() {
    let h = Harness::new(StaticAuthenticator::default(), Fixture::new());
    let (session, mut client) = h.connect("nobody");

    let report = session.await.unwrap();
    assert_eq!(report.close_reason, CloseReason::AuthenticationFailed);
    assert_eq!(report.user_id, None);
    assert_eq!(
        report.transitions,
        vec![SessionState::Connecting, SessionState::Closed]
    );
    assert_eq!(client.next().await, Some(Written::Closed));
}

#[tokio::test]
async fn malformed_frame_ends_the_session() {
    let fx = Fixture::new();
    let user = fx.user();
    let group = fx.group(user, &[]).await;
    let h = Harness::new(StaticAuthenticator::default().with("t", user), fx);

    let (session, mut client) = h.connect("t");
    wait_for_subscribers(&h.bus, group.id, 1).await;
    client.send_raw(bytes::Bytes::from_static(b"{not json"));

    let report = session.await.unwrap();
    assert_eq!(report.close_reason, CloseReason::ProtocolError);
    assert_eq!(client.next().await, Some(Written::Closed));
}

#[tokio::test]
async fn publishing_outside_membership_is_a_protocol_error() {
    let fx = Fixture::new();
    let (user, other) = (fx.user(), fx.user());
    let mine = fx.group(user, &[]).await;
    let theirs = fx.group(other, &[]).await;
    let h = Harness::new(StaticAuthenticator::default().with("t", user), fx);

    let (session, client) = h.connect("t");
    wait_for_subscribers(&h.bus, mine.id, 1).await;
    client.send_json(chat(theirs.id, "sneaky"));

    let report = session.await.unwrap();
    assert_eq!(report.close_reason, CloseReason::ProtocolError);
    assert_eq!(h.bus.subscriber_count(theirs.id), 0);
}

#[tokio::test]
async fn client_hang_up_is_reported() {
    let fx = Fixture::new();
    let user = fx.user();
    let group = fx.group(user, &[]).await;
    let h = Harness::new(StaticAuthenticator::default().with("t", user), fx);

    let (session, mut client) = h.connect("t");
    wait_for_subscribers(&h.bus, group.id, 1).await;
    client.hang_up();

    let report = session.await.unwrap();
    assert_eq!(report.close_reason, CloseReason::ClientClosed);
    assert_eq!(h.bus.subscriber_count(group.id), 0);
}

#[tokio::test]
async fn closing_the_bus_ends_live_sessions() {
    let fx = Fixture::new();
    let user = fx.user();
    let group = fx.group(user, &[]).await;
    let h = Harness::new(StaticAuthenticator::default().with("t", user), fx);

    let (session, _client) = h.connect("t");
    wait_for_subscribers(&h.bus, group.id, 1).await;
    h.bus.close();

    let report = session.await.unwrap();
    assert_eq!(report.close_reason, CloseReason::BusClosed);
}

#[tokio::test]
async fn subscribing_on_a_closed_bus_fails() {
    let fx = Fixture::new();
    let user = fx.user();
    fx.group(user, &[]).await;
    let h = Harness::new(StaticAuthenticator::default().with("t", user), fx);
    h.bus.close();

    let (session, _client) = h.connect("t");
    let report = session.await.unwrap();
    assert_matches!(report.close_reason, CloseReason::SubscribeFailed);
    assert_eq!(report.user_id, Some(user));
}

#[tokio::test]
async fn user_without_conversations_stays_connected_until_shutdown() {
    let fx = Fixture::new();
    let loner = fx.user();
    let h = Harness::new(StaticAuthenticator::default().with("t", loner), fx);

    let (session, mut client) = h.connect("t");
    client.assert_silent().await;
    assert!(!session.is_finished());

    h.shutdown.cancel();
    let report = session.await.unwrap();
    assert_eq!(report.close_reason, CloseReason::Shutdown);
}
