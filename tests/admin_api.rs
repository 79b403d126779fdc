//! Admin API over real HTTP.

use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;

use webhook_guard::admin;
use webhook_guard::webhook::signature::{sign_square, SQUARE_SIGNATURE_HEADER, SQUARE_TIMESTAMP_HEADER};

mod common;
use common::*;

async fn spawn_admin(gw: &TestGateway) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = gw.state.clone();
    let shutdown = gw.shutdown.subscribe();
    tokio::spawn(async move {
        let _ = admin::serve(listener, state, shutdown).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_stats_require_key() {
    let gw = spawn_gateway(test_config()).await;
    let admin = spawn_admin(&gw).await;

    let res = client().get(format!("{admin}/admin/stats")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client()
        .get(format!("{admin}/admin/stats"))
        .bearer_auth("not-the-key")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stats_reflect_traffic() {
    let gw = spawn_gateway(test_config()).await;
    let admin = spawn_admin(&gw).await;

    let body = r#"{"type":"booking.updated","event_id":"adm-1","data":{}}"#;
    let signature = sign_square(SQUARE_KEY.as_bytes(), SQUARE_URL, body.as_bytes());
    let ts = now();
    for _ in 0..2 {
        client()
            .post(gw.url("/webhooks/square"))
            .header(SQUARE_SIGNATURE_HEADER, &signature)
            .header(SQUARE_TIMESTAMP_HEADER, ts.to_string())
            .body(body)
            .send()
            .await
            .unwrap();
    }

    let res = client()
        .get(format!("{admin}/admin/stats"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["accepted"], 1);
    assert_eq!(json["rejected"]["duplicate_request"], 1);
    assert_eq!(json["replay_entries"], 1);
    assert_eq!(json["rate_buckets"], 1);

    let res = client()
        .get(format!("{admin}/admin/status"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["status"], "operational");
    assert_eq!(json["store"], "memory");
    assert_eq!(json["providers"], serde_json::json!(["whatsapp", "square", "stripe"]));
}
