use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// Token accepted by [`app`].
pub const TEST_TOKEN: &str = "3kg6k6lzmp9kj5cpkcoxie963cmvjahbt2fod9zru30k1jqdmi";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uuid: String,
    pub full_name: String,
    pub is_admin: bool,
}

#[derive(Clone, Default)]
pub struct AppState {
    pub tokens: Arc<RwLock<HashMap<String, User>>>,
    pub discovery_hits: Arc<AtomicUsize>,
}

impl AppState {
    /// State with [`TEST_TOKEN`] mapped to an admin user.
    pub fn with_test_token() -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(
            TEST_TOKEN.to_string(),
            User {
                uuid: "zzzzz-tpzed-d9tiejq69daie8f".to_string(),
                full_name: "Admin User".to_string(),
                is_admin: true,
            },
        );
        Self {
            tokens: Arc::new(RwLock::new(tokens)),
            discovery_hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn discovery_hits(&self) -> usize {
        self.discovery_hits.load(Ordering::SeqCst)
    }
}

pub fn app() -> Router {
    app_with_state(AppState::with_test_token())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/discovery/v1/apis/{api}/{version}/rest", get(discovery))
        .route("/arvados/v1/users/current", get(current_user))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

/// Minimal discovery document for `api`/`version`.
pub fn discovery_document(api: &str, version: &str) -> Value {
    json!({
        "kind": "discovery#restDescription",
        "discoveryVersion": "v1",
        "id": format!("{api}:{version}"),
        "name": api,
        "version": version,
        "rootUrl": "/",
        "servicePath": format!("{api}/{version}/"),
        "resources": {
            "users": {
                "methods": {
                    "current": {
                        "id": format!("{api}.users.current"),
                        "path": "users/current",
                        "httpMethod": "GET",
                        "response": {"$ref": "User"}
                    }
                }
            }
        }
    })
}

async fn discovery(
    State(state): State<AppState>,
    Path((api, version)): Path<(String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    if api != "arvados" || version != "v1" {
        return Err(StatusCode::NOT_FOUND);
    }
    state.discovery_hits.fetch_add(1, Ordering::SeqCst);
    Ok((
        [(header::CACHE_CONTROL, "public, max-age=86400")],
        Json(discovery_document(&api, &version)),
    ))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("OAuth2 ")
}

async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, (StatusCode, Json<Value>)> {
    let not_logged_in = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"errors": ["Not logged in"]})),
        )
    };
    let token = bearer_token(&headers).ok_or_else(not_logged_in)?;
    let tokens = state.tokens.read().await;
    tokens.get(token).cloned().map(Json).ok_or_else(not_logged_in)
}
