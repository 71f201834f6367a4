//! HTTP API round trips against a server on a local port

use chrono::NaiveDate;
use habitquest::{
    DocumentStore, FixedClock, HttpServer, LiveView, LiveViewConfig, MemoryStore, Roster,
    Services, SessionStore,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start_server() -> SocketAddr {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
    let services = Arc::new(Services::new(store.clone(), clock, Roster::default()));
    let sessions = Arc::new(SessionStore::new(services.clone(), 3600));
    let live = Arc::new(LiveView::start(&store, LiveViewConfig::default()));

    let addr = {
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        free.local_addr().unwrap()
    };
    let server = Arc::new(HttpServer::new(services, sessions, live, addr));
    tokio::spawn(server.run());

    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_ok() {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server did not start");
}

/// Send one request and return (status, JSON body)
async fn call(
    addr: SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (u16, Value) {
    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let mut request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n",
        method,
        path,
        body.len()
    );
    if let Some(token) = token {
        request.push_str(&format!("Authorization: Bearer {}\r\n", token));
    }
    request.push_str("\r\n");
    request.push_str(&body);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();

    let status: u16 = raw.split_whitespace().nth(1).unwrap().parse().unwrap();
    let payload = raw.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");
    let json = serde_json::from_str(payload).unwrap_or(Value::Null);
    (status, json)
}

async fn login(addr: SocketAddr) -> String {
    let (status, body) = call(
        addr,
        "POST",
        "/login",
        None,
        Some(json!({ "uid": "user_rushu", "pin": "2006" })),
    )
    .await;
    assert_eq!(status, 201);
    body["sessionId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn public_endpoints() {
    let addr = start_server().await;

    let (status, body) = call(addr, "GET", "/health", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = call(addr, "GET", "/roster", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert!(body[0].get("pin").is_none());
}

#[tokio::test]
async fn login_rejects_wrong_pin() {
    let addr = start_server().await;
    let (status, body) = call(
        addr,
        "POST",
        "/login",
        None,
        Some(json!({ "uid": "user_rushu", "pin": "1234" })),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "ACCESS DENIED");
}

#[tokio::test]
async fn session_required() {
    let addr = start_server().await;
    let (status, _) = call(addr, "GET", "/habits", None, None).await;
    assert_eq!(status, 401);
    let (status, _) = call(addr, "GET", "/habits", Some("sess_bogus"), None).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn habit_lifecycle() {
    let addr = start_server().await;
    let token = login(addr).await;

    let (status, habit) = call(
        addr,
        "POST",
        "/habits",
        Some(&token),
        Some(json!({ "title": "WORKOUT", "exp": 100 })),
    )
    .await;
    assert_eq!(status, 201);
    let id = habit["id"].as_str().unwrap().to_string();
    assert_eq!(habit["category"], "HEALTH");

    let (status, outcome) = call(addr, "POST", &format!("/habits/{}/toggle", id), Some(&token), None).await;
    assert_eq!(status, 200);
    assert_eq!(outcome["completed"], true);
    assert_eq!(outcome["points"], 100);
    assert_eq!(outcome["notice"], "+100 XP");

    let (status, edited) = call(
        addr,
        "PATCH",
        &format!("/habits/{}", id),
        Some(&token),
        Some(json!({ "title": "LIFT" })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(edited["title"], "LIFT");

    let (status, _) = call(addr, "DELETE", &format!("/habits/{}", id), Some(&token), None).await;
    assert_eq!(status, 204);
    let (status, _) = call(addr, "POST", &format!("/habits/{}/toggle", id), Some(&token), None).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn daily_log_round_trip() {
    let addr = start_server().await;
    let token = login(addr).await;

    let (status, today) = call(addr, "GET", "/logs/today", Some(&token), None).await;
    assert_eq!(status, 200);
    assert_eq!(today["saved"], false);
    assert_eq!(today["log"]["energy"], 50);

    let log = json!({
        "tasks": [
            { "id": "t1", "text": "ship", "completed": true },
            { "id": "t2", "text": "review", "completed": true },
            { "id": "t3", "text": "plan", "completed": false },
        ],
        "mood": "GOOD",
        "energy": 70,
        "hours": 6.5,
        "note": "solid day",
    });
    let (status, saved) = call(addr, "PUT", "/logs/today", Some(&token), Some(log.clone())).await;
    assert_eq!(status, 200);
    assert_eq!(saved["xpDelta"], 40);
    assert_eq!(saved["notice"], "Log Saved. +40 XP");

    let (_, again) = call(addr, "PUT", "/logs/today", Some(&token), Some(log)).await;
    assert_eq!(again["xpDelta"], 0);
    assert_eq!(again["points"], 40);
}

#[tokio::test]
async fn logout_ends_session() {
    let addr = start_server().await;
    let token = login(addr).await;

    let (status, _) = call(addr, "POST", "/logout", Some(&token), None).await;
    assert_eq!(status, 204);
    let (status, _) = call(addr, "GET", "/dashboard", Some(&token), None).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn dashboard_available_right_after_first_login() {
    let addr = start_server().await;
    let token = login(addr).await;

    let (status, body) = call(addr, "GET", "/dashboard", Some(&token), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["me"]["uid"], "user_rushu");
    assert_eq!(body["me"]["level"], 1);
    assert!(body["partner"].is_null());
}
