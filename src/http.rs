//! HTTP API for habitquest
//!
//! JSON endpoints over the services, plus the live snapshot WebSocket.
//!
//! ## Public
//! - `GET /health` - Liveness and collection sizes
//! - `GET /roster` - Members that can log in
//! - `POST /login` - `{uid, pin}` → session
//!
//! ## Session (`Authorization: Bearer <session_id>`)
//! - `POST /logout`
//! - `GET /dashboard`, `GET /leaderboard`, `GET /feed`
//! - `GET /habits`, `POST /habits`, `POST /habits/seed`
//! - `PATCH /habits/{id}`, `DELETE /habits/{id}`, `POST /habits/{id}/toggle`
//! - `GET /logs/today`, `PUT /logs/today`
//! - `GET /calendar?year=&month=`
//! - `GET /live` - WebSocket; browsers may pass `?session=` instead of the header
//!
//! ## Example Usage
//!
//! ```bash
//! # Log in
//! curl -X POST -d '{"uid":"user_rushu","pin":"2006"}' http://localhost:8095/login
//!
//! # Complete a habit
//! curl -X POST -H "Authorization: Bearer sess_..." \
//!      http://localhost:8095/habits/{id}/toggle
//! ```

use bytes::Bytes;
use chrono::Datelike;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::dashboard;
use crate::error::QuestError;
use crate::live::LiveView;
use crate::live_ws;
use crate::models::{DailyLog, FeedEvent, Habit, HabitEdit, NewHabit, User};
use crate::roster::MemberView;
use crate::services::{self, HandlerResult, LogDraft, Services};
use crate::session::{Session, SessionStore};
use crate::store::Collection;

#[derive(Debug, Deserialize)]
struct LoginRequest {
    uid: String,
    pin: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    session_id: String,
    member: MemberView,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarQuery {
    year: Option<i32>,
    month: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LiveQuery {
    session: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TodayLogResponse {
    date: chrono::NaiveDate,
    saved: bool,
    log: LogDraft,
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    sessions: Arc<SessionStore>,
    live: Arc<LiveView>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(
        services: Arc<Services>,
        sessions: Arc<SessionStore>,
        live: Arc<LiveView>,
        bind_addr: SocketAddr,
    ) -> Self {
        Self {
            services,
            sessions,
            live,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), QuestError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().trim_end_matches('/').to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "Incoming request");

        let result = match (method, path.as_str()) {
            // Public
            (Method::GET, "/health") => self.handle_health().await,
            (Method::GET, "/roster") => Ok(services::ok(&self.services.roster.public())),
            (Method::POST, "/login") => self.handle_login(req).await,

            // Live snapshots
            (Method::GET, "/live") => {
                let session = match self.live_session(&req) {
                    Ok(session) => session,
                    Err(e) => return Ok(services::error_response(e)),
                };
                return live_ws::handle_live_upgrade(
                    req,
                    self.live.clone(),
                    session.uid().to_string(),
                )
                .await;
            }

            (method, p) => match self.session(&req) {
                Ok(session) => self.route_session(method, p, req, session).await,
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(response) => Ok(response),
            Err(e) => {
                if !e.is_store_failure() {
                    debug!(error = %e, "Request rejected");
                }
                Ok(services::error_response(e))
            }
        }
    }

    async fn route_session(
        &self,
        method: Method,
        path: &str,
        req: Request<Incoming>,
        session: Arc<Session>,
    ) -> HandlerResult {
        match (method, path) {
            (Method::POST, "/logout") => {
                self.sessions.logout(session.id())?;
                Ok(services::no_content())
            }

            (Method::GET, "/dashboard") => self.handle_dashboard(&session).await,
            (Method::GET, "/leaderboard") => {
                let users: Vec<User> = self.live.records().await;
                Ok(services::ok(&dashboard::leaderboard(&users)))
            }
            (Method::GET, "/feed") => {
                let feed: Vec<FeedEvent> = self.live.records().await;
                Ok(services::ok(&dashboard::recent_feed(feed)))
            }
            (Method::GET, "/calendar") => {
                let query = req.uri().query().map(str::to_string);
                self.handle_calendar(query.as_deref(), &session).await
            }

            // Habits
            (Method::GET, "/habits") => {
                let habits: Vec<Habit> = self.live.records().await;
                let mine: Vec<Habit> = habits
                    .into_iter()
                    .filter(|h| h.user_id == session.uid())
                    .collect();
                Ok(services::ok(&mine))
            }
            (Method::POST, "/habits") => {
                let new: NewHabit = read_json(req).await?;
                Ok(services::from_create_result(
                    self.services.habits.create(&session, new).await,
                ))
            }
            (Method::POST, "/habits/seed") => Ok(services::from_create_result(
                self.services.habits.seed_presets(&session).await,
            )),
            (Method::POST, p) if p.starts_with("/habits/") && p.ends_with("/toggle") => {
                let id = habit_id(p.trim_end_matches("/toggle"))?;
                Ok(services::from_result(
                    self.services.habits.toggle(&session, id).await,
                ))
            }
            (Method::PATCH, p) if p.starts_with("/habits/") => {
                let id = habit_id(p)?.to_string();
                let edit: HabitEdit = read_json(req).await?;
                Ok(services::from_result(
                    self.services.habits.edit(&session, &id, edit).await,
                ))
            }
            (Method::DELETE, p) if p.starts_with("/habits/") => {
                let id = habit_id(p)?;
                Ok(services::from_delete_result(
                    self.services.habits.delete(&session, id).await,
                ))
            }

            // Daily log
            (Method::GET, "/logs/today") => {
                let stored = self.services.logs.today(&session).await?;
                Ok(services::ok(&TodayLogResponse {
                    date: self.services.clock.today(),
                    saved: stored.is_some(),
                    log: stored.as_ref().map(LogDraft::from_log).unwrap_or_default(),
                }))
            }
            (Method::PUT, "/logs/today") => {
                let draft: LogDraft = read_json(req).await?;
                Ok(services::from_result(
                    self.services.logs.save_today(&session, draft).await,
                ))
            }

            _ => Ok(services::not_found("Not Found")),
        }
    }

    /// Health check endpoint
    async fn handle_health(&self) -> HandlerResult {
        let mut counts = serde_json::Map::new();
        for collection in Collection::ALL {
            counts.insert(
                collection.name().to_string(),
                serde_json::Value::from(self.live.snapshot(collection).await.len()),
            );
        }

        Ok(services::ok(&serde_json::json!({
            "status": "ok",
            "sessions": self.sessions.len(),
            "documents": counts,
        })))
    }

    /// POST /login - Check PIN and open a session
    async fn handle_login(&self, req: Request<Incoming>) -> HandlerResult {
        let login: LoginRequest = read_json(req).await?;
        let session = self.sessions.login(&login.uid, &login.pin).await?;
        Ok(services::created(&LoginResponse {
            session_id: session.id().to_string(),
            member: session.member().clone(),
        }))
    }

    /// GET /dashboard - Level, progress and partner summary
    async fn handle_dashboard(&self, session: &Session) -> HandlerResult {
        let mut users: Vec<User> = self.live.records().await;
        // A first login can land before the live view has seen the new record
        if !users.iter().any(|u| u.uid == session.uid()) {
            if let Some(me) = self.services.users.get(session.uid()).await? {
                users.push(me);
            }
        }
        let habits: Vec<Habit> = self.live.records().await;
        let partner = self.services.roster.partner_of(session.uid());
        let summary = dashboard::dashboard(
            session.uid(),
            partner.map(|m| m.uid.as_str()),
            &users,
            &habits,
            self.services.clock.today(),
        )?;
        Ok(services::ok(&summary))
    }

    /// GET /calendar - Month grid of logged days
    async fn handle_calendar(&self, query: Option<&str>, session: &Session) -> HandlerResult {
        let query: CalendarQuery = match query {
            Some(q) => serde_urlencoded::from_str(q)
                .map_err(|e| QuestError::InvalidInput(format!("bad query: {}", e)))?,
            None => CalendarQuery::default(),
        };
        let today = self.services.clock.today();
        let logs: Vec<DailyLog> = self.live.records().await;

        let month = dashboard::calendar_month(
            session.uid(),
            &logs,
            query.year.unwrap_or_else(|| today.year()),
            query.month.unwrap_or_else(|| today.month()),
            today,
        )?;
        Ok(services::ok(&month))
    }

    /// Session from the bearer token
    fn session(&self, req: &Request<Incoming>) -> Result<Arc<Session>, QuestError> {
        let token = bearer_token(req).ok_or(QuestError::Unauthorized)?;
        self.sessions.get(token)
    }

    /// Session for the WebSocket endpoint: bearer token or `?session=`
    fn live_session(&self, req: &Request<Incoming>) -> Result<Arc<Session>, QuestError> {
        if let Some(token) = bearer_token(req) {
            return self.sessions.get(token);
        }
        let query: LiveQuery = req
            .uri()
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();
        match query.session {
            Some(token) => self.sessions.get(&token),
            None => Err(QuestError::Unauthorized),
        }
    }
}

fn bearer_token(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// `{id}` of a `/habits/{id}` path
fn habit_id(path: &str) -> Result<&str, QuestError> {
    let id = path.strip_prefix("/habits/").unwrap_or("");
    if id.is_empty() || id.contains('/') {
        return Err(QuestError::InvalidInput(format!("bad habit path: {}", path)));
    }
    Ok(id)
}

/// Read and decode a JSON request body
async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, QuestError> {
    let body = req.collect().await.map_err(|e| {
        error!(error = %e, "Failed to read body");
        QuestError::InvalidInput(format!("Failed to read body: {}", e))
    })?;
    serde_json::from_slice(&body.to_bytes())
        .map_err(|e| QuestError::InvalidInput(format!("Invalid JSON: {}", e)))
}
