use std::sync::Arc;

use mediasoup::rtp_parameters::MediaKind;

use sfu_relay::errors::SignalError;
use sfu_relay::media_router::Direction;
use sfu_relay::media_source::{AppData, MediaSource};
use sfu_relay::protocol::{AckPayload, ServerEvent};
use sfu_relay::session::Session;
use sfu_relay::signaling;

mod fixture;

async fn join(
    server: &Arc<sfu_relay::server::RelayServer>,
    room_id: &str,
    client_id: &str,
) -> (Session, Arc<fixture::RecordingConnection>) {
    let session = Session::new();
    let connection = fixture::RecordingConnection::new();
    signaling::join_room(
        server,
        &session,
        connection.handle(),
        connection.emitter(),
        room_id.to_string(),
        client_id.to_string(),
    )
    .await
    .unwrap();
    (session, connection)
}

async fn ready_session(
    server: &Arc<sfu_relay::server::RelayServer>,
    room_id: &str,
    client_id: &str,
) -> (Session, Arc<fixture::RecordingConnection>) {
    let (session, connection) = join(server, room_id, client_id).await;
    for direction in [Direction::Send, Direction::Recv] {
        let AckPayload::CreateTransport { transport_options } =
            signaling::create_transport(server, &session, client_id, direction)
                .await
                .unwrap()
        else {
            panic!("expected CreateTransport ack");
        };
        signaling::connect_transport(
            server,
            &session,
            client_id,
            transport_options.id,
            fixture::dtls_parameters(),
        )
        .await
        .unwrap();
    }
    (session, connection)
}

async fn produce_camera(
    server: &Arc<sfu_relay::server::RelayServer>,
    session: &Session,
    client_id: &str,
) -> mediasoup::producer::ProducerId {
    let AckPayload::Produce { producer_id } = signaling::produce(
        server,
        session,
        client_id,
        session.send_transport_id().unwrap(),
        MediaKind::Video,
        fixture::video_producer_device_parameters(),
        AppData {
            source: MediaSource::Camera,
        },
    )
    .await
    .unwrap() else {
        panic!("expected Produce ack");
    };
    producer_id
}

#[tokio::test]
async fn two_party_camera_join_reports_existing_producers_not_new_producer_events() {
    let server = fixture::relay_server().await;

    let (a_session, _a_conn) = ready_session(&server, "main", "alice").await;
    let _audio = signaling::produce(
        &server,
        &a_session,
        "alice",
        a_session.send_transport_id().unwrap(),
        MediaKind::Audio,
        fixture::audio_producer_device_parameters(),
        AppData {
            source: MediaSource::Camera,
        },
    )
    .await
    .unwrap();
    let _video = produce_camera(&server, &a_session, "alice").await;

    let (b_session, b_conn) = ready_session(&server, "main", "bob").await;

    let existing = server.registry.list_producers("bob");
    assert_eq!(existing.len(), 2);

    let AckPayload::Consume { .. } = signaling::consume(
        &server,
        &b_session,
        "bob",
        b_session.recv_transport_id().unwrap(),
        produce_camera(&server, &a_session, "alice").await,
        fixture::consumer_device_capabilities(),
    )
    .await
    .unwrap() else {
        panic!("expected Consume ack");
    };

    assert!(!b_conn
        .events()
        .iter()
        .any(|e| matches!(e, ServerEvent::NewProducer { .. })));
}

#[tokio::test]
async fn third_party_arrival_sees_existing_producers_and_new_producer_fans_out() {
    let server = fixture::relay_server().await;

    let (a_session, a_conn) = ready_session(&server, "main", "alice").await;
    produce_camera(&server, &a_session, "alice").await;
    produce_camera(&server, &a_session, "alice").await;

    let (b_session, b_conn) = ready_session(&server, "main", "bob").await;
    produce_camera(&server, &b_session, "bob").await;
    produce_camera(&server, &b_session, "bob").await;

    let (_c_session, c_conn) = join(&server, "main", "carol").await;
    let ack = signaling::create_transport(&server, &_c_session, "carol", Direction::Send)
        .await
        .unwrap();
    let AckPayload::CreateTransport { .. } = ack else {
        panic!()
    };
    let existing = server.registry.list_producers("carol");
    assert_eq!(existing.len(), 4);

    produce_camera(&server, &a_session, "alice").await;

    assert!(b_conn
        .events()
        .iter()
        .any(|e| matches!(e, ServerEvent::NewProducer { client_id, .. } if client_id == "alice")));
    assert!(c_conn
        .events()
        .iter()
        .any(|e| matches!(e, ServerEvent::NewProducer { client_id, .. } if client_id == "alice")));
    assert!(!a_conn
        .events()
        .iter()
        .any(|e| matches!(e, ServerEvent::NewProducer { .. })));
}

#[tokio::test]
async fn screen_share_arbitration_closes_foreign_screen_producer() {
    let server = fixture::relay_server().await;

    let (a_session, _a_conn) = ready_session(&server, "main", "alice").await;
    let AckPayload::Produce {
        producer_id: screen_id,
    } = signaling::produce(
        &server,
        &a_session,
        "alice",
        a_session.send_transport_id().unwrap(),
        MediaKind::Video,
        fixture::video_producer_device_parameters(),
        AppData {
            source: MediaSource::Screen,
        },
    )
    .await
    .unwrap()
    else {
        panic!()
    };

    let (b_session, _b_conn) = ready_session(&server, "main", "bob").await;
    let room = server.rooms.get("main").unwrap();

    let AckPayload::CloseAllScreenShares { closed_count } =
        signaling::close_all_screen_shares(&server, &b_session, &room, "bob")
            .await
            .unwrap()
    else {
        panic!()
    };
    assert_eq!(closed_count, 1);
    assert!(server.registry.get_producer(screen_id).is_none());

    // idempotent: a second call finds nothing left to close (P5).
    let AckPayload::CloseAllScreenShares { closed_count } =
        signaling::close_all_screen_shares(&server, &b_session, &room, "bob")
            .await
            .unwrap()
    else {
        panic!()
    };
    assert_eq!(closed_count, 0);

    let AckPayload::Produce { .. } = signaling::produce(
        &server,
        &b_session,
        "bob",
        b_session.send_transport_id().unwrap(),
        MediaKind::Video,
        fixture::video_producer_device_parameters(),
        AppData {
            source: MediaSource::Screen,
        },
    )
    .await
    .unwrap() else {
        panic!()
    };
}

#[tokio::test]
async fn disconnect_cascade_clears_registry_and_notifies_room() {
    let server = fixture::relay_server().await;

    let (a_session, _a_conn) = ready_session(&server, "main", "alice").await;
    produce_camera(&server, &a_session, "alice").await;

    let (_b_session, b_conn) = ready_session(&server, "main", "bob").await;

    sfu_relay::lifecycle::disconnect(&server, &a_session).await;

    assert!(server.registry.list_producers("bob").is_empty());
    assert!(server.rooms.room_of("alice").is_none());
    assert!(b_conn
        .events()
        .iter()
        .any(|e| matches!(e, ServerEvent::ProducerClosed { .. })));
    assert!(b_conn.events().iter().any(
        |e| matches!(e, ServerEvent::ClientDisconnected { client_id } if client_id == "alice")
    ));
}

#[tokio::test]
async fn consume_after_producer_closed_is_not_found() {
    let server = fixture::relay_server().await;

    let (a_session, _a_conn) = ready_session(&server, "main", "alice").await;
    let producer_id = produce_camera(&server, &a_session, "alice").await;
    server.registry.close_producer(producer_id);

    let (b_session, _b_conn) = ready_session(&server, "main", "bob").await;
    let err = signaling::consume(
        &server,
        &b_session,
        "bob",
        b_session.recv_transport_id().unwrap(),
        producer_id,
        fixture::consumer_device_capabilities(),
    )
    .await
    .unwrap_err();
    assert_eq!(err, SignalError::ProducerNotFound);
}

#[tokio::test]
async fn unconnected_transport_is_reaped_and_produce_then_fails() {
    let server = fixture::relay_server().await;

    let (session, _conn) = join(&server, "main", "alice").await;
    let AckPayload::CreateTransport { transport_options } =
        signaling::create_transport(&server, &session, "alice", Direction::Send)
            .await
            .unwrap()
    else {
        panic!()
    };

    let reaped = server
        .registry
        .reap_unconnected_transports(std::time::Duration::from_secs(0));
    assert_eq!(reaped, 1);

    let err = signaling::produce(
        &server,
        &session,
        "alice",
        transport_options.id,
        MediaKind::Video,
        fixture::video_producer_device_parameters(),
        AppData {
            source: MediaSource::Camera,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, SignalError::TransportNotFound);
}
