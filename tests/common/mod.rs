// Local stand-in for the mood decision service
#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use reqwest::Url;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// How the stand-in service answers
#[derive(Clone)]
pub enum Reply {
    /// 200 with `redirect` set to the given prefix followed by the mood
    Redirect(&'static str),
    /// 200 without a redirect
    NoRedirect,
    /// The given status with an `error` body
    Failure(StatusCode, &'static str),
    /// 200 with a body that is not JSON
    Garbage,
}

/// A request the service received
#[derive(Clone, Debug)]
pub struct Received {
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Clone)]
struct ServiceState {
    reply: Reply,
    received: Arc<Mutex<Vec<Received>>>,
}

pub struct MoodService {
    pub url: Url,
    received: Arc<Mutex<Vec<Received>>>,
}

impl MoodService {
    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

async fn detect_mood(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.received.lock().unwrap().push(Received {
        content_type: headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    let mood = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("mood").and_then(Value::as_str).map(str::to_string));
    let Some(mood) = mood else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No mood detected. Please try again." })),
        )
            .into_response();
    };

    match state.reply {
        Reply::Redirect(prefix) => Json(json!({
            "mood": mood,
            "message": format!("You look {mood}!"),
            "redirect": format!("{prefix}{mood}"),
        }))
        .into_response(),
        Reply::NoRedirect => Json(json!({
            "mood": mood,
            "message": format!("You look {mood}!"),
        }))
        .into_response(),
        Reply::Failure(status, error) => (status, Json(json!({ "error": error }))).into_response(),
        Reply::Garbage => "<html>login required</html>".into_response(),
    }
}

/// Starts the service on an ephemeral local port
pub async fn spawn_mood_service(reply: Reply) -> MoodService {
    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/detect_mood", post(detect_mood))
        .with_state(ServiceState {
            reply,
            received: received.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MoodService {
        url: Url::parse(&format!("http://{addr}")).unwrap(),
        received,
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
