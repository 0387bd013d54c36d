mod common;

use axum::http::StatusCode;
use serde_json::{Value, json};

use common::auth_header;

#[tokio::test]
async fn request_accept_opens_a_conversation_for_both() {
    let app = common::spawn_app().await;
    let pair = common::befriend(&app.server).await;

    for (user, counterpart) in [(&pair.alice, "Bob"), (&pair.bob, "Alice")] {
        let entry = common::summary(&app.server, &user.1, pair.conversation_id)
            .await
            .expect("conversation listed");
        assert_eq!(entry["remark"], counterpart);
        assert_eq!(entry["unread_count"], 0);
        assert!(entry["last_message"].is_null());
    }

    let (h, v) = auth_header(&pair.alice.1);
    let friends: Vec<Value> = app.server.get("/friends").add_header(h, v).await.json();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0]["friend_id"].as_u64(), Some(pair.bob.0));
}

#[tokio::test]
async fn receiver_lists_requests_newest_first() {
    let app = common::spawn_app().await;
    let (_, alice) = common::register(&app.server, "Alice", "1001").await;
    let (_, carol) = common::register(&app.server, "Carol", "1003").await;
    let (bob_id, bob) = common::register(&app.server, "Bob", "1002").await;

    for token in [&alice, &carol] {
        let (h, v) = auth_header(token);
        app.server
            .post("/friend-requests")
            .add_header(h, v)
            .json(&json!({ "receiver_id": bob_id }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let (h, v) = auth_header(&bob);
    let requests: Vec<Value> = app.server.get("/friend-requests").add_header(h, v).await.json();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0]["sender_name"], "Carol");
    assert_eq!(requests[1]["sender_name"], "Alice");
    assert_eq!(requests[0]["status"], "pending");
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let app = common::spawn_app().await;
    let pair = common::befriend(&app.server).await;

    // To oneself.
    let (h, v) = auth_header(&pair.alice.1);
    app.server
        .post("/friend-requests")
        .add_header(h, v)
        .json(&json!({ "receiver_id": pair.alice.0 }))
        .await
        .assert_status(StatusCode::CONFLICT);

    // Already friends, in either direction.
    let (h, v) = auth_header(&pair.bob.1);
    app.server
        .post("/friend-requests")
        .add_header(h, v)
        .json(&json!({ "receiver_id": pair.alice.0 }))
        .await
        .assert_status(StatusCode::CONFLICT);

    // Nobody there.
    let (h, v) = auth_header(&pair.bob.1);
    app.server
        .post("/friend-requests")
        .add_header(h, v)
        .json(&json!({ "receiver_id": 424242 }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_receiver_may_accept_and_only_once() {
    let app = common::spawn_app().await;
    let (_, alice) = common::register(&app.server, "Alice", "1001").await;
    let (bob_id, bob) = common::register(&app.server, "Bob", "1002").await;
    let (_, mallory) = common::register(&app.server, "Mallory", "1666").await;

    let (h, v) = auth_header(&alice);
    let res = app
        .server
        .post("/friend-requests")
        .add_header(h, v)
        .json(&json!({ "receiver_id": bob_id }))
        .await;
    let request_id = res.json::<Value>()["request_id"].as_u64().unwrap();
    let accept = format!("/friend-requests/{}/accept", request_id);

    let (h, v) = auth_header(&mallory);
    app.server.post(&accept).add_header(h, v).await.assert_status(StatusCode::FORBIDDEN);

    let (h, v) = auth_header(&alice);
    app.server.post(&accept).add_header(h, v).await.assert_status(StatusCode::FORBIDDEN);

    let (h, v) = auth_header(&bob);
    app.server.post(&accept).add_header(h, v).await.assert_status_ok();

    let (h, v) = auth_header(&bob);
    app.server.post(&accept).add_header(h, v).await.assert_status(StatusCode::CONFLICT);

    let (h, v) = auth_header(&bob);
    app.server
        .post(&format!("/friend-requests/{}/reject", request_id))
        .add_header(h, v)
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn reject_then_sender_can_ask_again() {
    let app = common::spawn_app().await;
    let (_, alice) = common::register(&app.server, "Alice", "1001").await;
    let (bob_id, bob) = common::register(&app.server, "Bob", "1002").await;

    let send = || {
        let (h, v) = auth_header(&alice);
        app.server
            .post("/friend-requests")
            .add_header(h, v)
            .json(&json!({ "receiver_id": bob_id }))
    };

    let first = send().await.json::<Value>()["request_id"].as_u64().unwrap();
    send().await.assert_status(StatusCode::CONFLICT);

    let (h, v) = auth_header(&bob);
    app.server
        .post(&format!("/friend-requests/{}/reject", first))
        .add_header(h, v)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    send().await.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn sender_can_withdraw_a_request() {
    let app = common::spawn_app().await;
    let (_, alice) = common::register(&app.server, "Alice", "1001").await;
    let (bob_id, bob) = common::register(&app.server, "Bob", "1002").await;

    let (h, v) = auth_header(&alice);
    let request_id = app
        .server
        .post("/friend-requests")
        .add_header(h, v)
        .json(&json!({ "receiver_id": bob_id }))
        .await
        .json::<Value>()["request_id"]
        .as_u64()
        .unwrap();

    let path = format!("/friend-requests/{}", request_id);
    let (h, v) = auth_header(&alice);
    app.server.delete(&path).add_header(h, v).await.assert_status(StatusCode::NO_CONTENT);
    let (h, v) = auth_header(&alice);
    app.server.delete(&path).add_header(h, v).await.assert_status(StatusCode::NOT_FOUND);

    let (h, v) = auth_header(&bob);
    let requests: Vec<Value> = app.server.get("/friend-requests").add_header(h, v).await.json();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn remark_is_per_side_and_follows_into_the_conversation() {
    let app = common::spawn_app().await;
    let pair = common::befriend(&app.server).await;

    let (h, v) = auth_header(&pair.alice.1);
    app.server
        .put(&format!("/friends/{}/remark", pair.bob.0))
        .add_header(h, v)
        .json(&json!({ "remark": "Bobby" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let alice_view = common::summary(&app.server, &pair.alice.1, pair.conversation_id).await.unwrap();
    assert_eq!(alice_view["remark"], "Bobby");
    let bob_view = common::summary(&app.server, &pair.bob.1, pair.conversation_id).await.unwrap();
    assert_eq!(bob_view["remark"], "Alice");

    let (h, v) = auth_header(&pair.alice.1);
    let friends: Vec<Value> = app.server.get("/friends").add_header(h, v).await.json();
    assert_eq!(friends[0]["remark"], "Bobby");
}

#[tokio::test]
async fn unfriending_blocks_starting_a_conversation() {
    let app = common::spawn_app().await;
    let pair = common::befriend(&app.server).await;

    let (h, v) = auth_header(&pair.bob.1);
    app.server
        .delete(&format!("/friends/{}", pair.alice.0))
        .add_header(h, v)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let (h, v) = auth_header(&pair.alice.1);
    let friends: Vec<Value> = app.server.get("/friends").add_header(h, v).await.json();
    assert!(friends.is_empty());

    let (h, v) = auth_header(&pair.alice.1);
    app.server
        .post("/conversations")
        .add_header(h, v)
        .json(&json!({ "friend_id": pair.bob.0 }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn friend_profile_shows_remark_and_uid() {
    let app = common::spawn_app().await;
    let pair = common::befriend(&app.server).await;
    let (carol_id, _) = common::register(&app.server, "Carol", "1003").await;

    let (h, v) = auth_header(&pair.alice.1);
    app.server
        .put(&format!("/friends/{}/remark", pair.bob.0))
        .add_header(h, v)
        .json(&json!({ "remark": "Bobby" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let (h, v) = auth_header(&pair.alice.1);
    let res = app.server.get(&format!("/friends/{}", pair.bob.0)).add_header(h, v).await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["friend_id"].as_u64(), Some(pair.bob.0));
    assert_eq!(body["remark"], "Bobby");
    assert_eq!(body["name"], "Bob");
    assert_eq!(body["uid"], format!("p{}", pair.bob.0));

    let (h, v) = auth_header(&pair.alice.1);
    app.server
        .get(&format!("/friends/{}", carol_id))
        .add_header(h, v)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
