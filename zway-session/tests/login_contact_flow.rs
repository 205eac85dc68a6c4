//! End-to-end flow across several C5 handlers: create two accounts, log one
//! in, send a contact request, and have the other accept it (`spec.md` §8's
//! "contact request round trip" testable property).

use base64::Engine as _;
use bytes::Bytes;
use serde_json::{json, Value};
use zway_session::{engine, Session, SessionContext};

fn request_body(id: u32, request_type: u32, fields: Value) -> Bytes {
    let mut body = match fields {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    body.insert("requestId".to_string(), json!(id));
    body.insert("requestType".to_string(), json!(request_type));
    Bytes::from(serde_json::to_vec(&Value::Object(body)).unwrap())
}

/// The wire `password` field is 32 raw bytes, base64-encoded (the client is
/// expected to have already hashed its real password down to that size); a
/// fixed-length repeat of the input is good enough for exercising the
/// create/login round trip.
fn password(raw: &str) -> String {
    let source = raw.as_bytes();
    let mut bytes = [0u8; 32];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = source[i % source.len()];
    }
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

async fn next_response(rx: &mut tokio::sync::mpsc::UnboundedReceiver<zway_net::Packet>) -> Value {
    let packet = rx.recv().await.expect("session produced no response packet");
    serde_json::from_slice(&packet.body).unwrap()
}

#[tokio::test]
async fn contact_request_round_trips_through_accept() {
    let ctx = SessionContext::for_tests();

    let (alice, mut alice_rx) = Session::new_placeholder(ctx.clone(), "10.0.0.1".to_string());
    let (bob, mut bob_rx) = Session::new_placeholder(ctx.clone(), "10.0.0.2".to_string());

    engine::dispatch(
        &alice,
        request_body(1, 1000, json!({"name": "alice", "password": password("hunter2")})),
    )
    .await
    .unwrap();
    let created = next_response(&mut alice_rx).await;
    assert_eq!(created["status"], 1);

    engine::dispatch(
        &bob,
        request_body(1, 1000, json!({"name": "bob", "password": password("correct-horse")})),
    )
    .await
    .unwrap();
    let created = next_response(&mut bob_rx).await;
    assert_eq!(created["status"], 1);

    engine::dispatch(
        &alice,
        request_body(2, 1100, json!({"name": "alice", "password": password("hunter2")})),
    )
    .await
    .unwrap();
    let logged_in = next_response(&mut alice_rx).await;
    assert_eq!(logged_in["status"], 1);

    engine::dispatch(
        &bob,
        request_body(2, 1100, json!({"name": "bob", "password": password("correct-horse")})),
    )
    .await
    .unwrap();
    let logged_in = next_response(&mut bob_rx).await;
    assert_eq!(logged_in["status"], 1);

    engine::dispatch(
        &alice,
        request_body(3, 3100, json!({"name": "bob", "publicKey": {"n": "abc"}})),
    )
    .await
    .unwrap();
    let add_contact_resp = next_response(&mut alice_rx).await;
    assert_eq!(add_contact_resp["status"], 1);

    // The pending AddContact is delivered to bob's live session by the
    // background delivery task `add_contact` schedules; it arrives as an
    // outgoing request on bob's socket rather than a direct response.
    let delivered = next_response(&mut bob_rx).await;
    assert_eq!(delivered["requestType"], 3100);
    let contact_request_id = delivered["contactRequestId"].as_u64().unwrap();

    engine::dispatch(
        &bob,
        request_body(
            4,
            3300,
            json!({"contactRequestId": contact_request_id, "publicKey": {"n": "def"}}),
        ),
    )
    .await
    .unwrap();
    let accept_resp = next_response(&mut bob_rx).await;
    assert_eq!(accept_resp["status"], 1);

    // accept_contact deletes the original AddContact row; it's no longer
    // outstanding from alice to bob.
    let still_pending = ctx
        .store
        .request_pending(&zway_store::RequestQuery {
            kind: Some(zway_store::RequestKind::AddContact),
            src: Some(alice.account_id()),
            dst: Some(bob.account_id()),
        })
        .await
        .unwrap();
    assert!(!still_pending);
}
