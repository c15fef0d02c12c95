//! HTTP surface of the gateway: the router, its handlers, and startup wiring.
//! Handlers own the session/identity choreography; everything behind them is
//! a collaborator reached through `AppState`.

use axum::extract::{Query, RawQuery, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::indexes::Trie;
use crate::proxy::ServiceProxy;
use crate::sessions::{
    begin_session, end_session, get_state, MemStore, RedisStore, SessionId, SessionStore,
};
use crate::users::{Credentials, MemUserStore, NewUser, Updates, User, UserStore, UserStoreError};

/// Hard cap on prefix-search results per request.
const MAX_SEARCH_RESULTS: usize = 20;

/// How often the in-memory session store is swept for expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// What a session token resolves to: when it began and a snapshot of the
/// authenticated user at that moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "beganAt")]
    pub began_at: DateTime<Utc>,
    pub user: User,
}

/// Runtime configuration, assembled from the environment by `main`.
pub struct Config {
    pub addr: String,
    pub signing_key: String,
    pub session_ttl: Duration,
    pub redis_addr: Option<String>,
    pub message_addrs: Vec<String>,
    pub summary_addrs: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub signing_key: String,
    pub user_store: Arc<dyn UserStore>,
    pub session_store: Arc<dyn SessionStore>,
    pub trie: Arc<Trie>,
    /// Path-prefix routing table for downstream services.
    pub proxies: Arc<Vec<(String, Arc<ServiceProxy>)>>,
}

/// Build the router. Split from `run_with` so tests can drive the full HTTP
/// surface without binding a socket.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/v1/users", post(create_user).get(search_users))
        .route("/v1/users/me", get(current_user).patch(update_current_user))
        .route("/v1/sessions", post(sign_in))
        .route("/v1/sessions/mine", delete(sign_out))
        .fallback(dispatch)
        .with_state(state)
}

/// Wire up stores, populate the prefix index, start the sweeper when running
/// on the in-memory store, and serve until shutdown.
pub async fn run_with(cfg: Config) -> anyhow::Result<()> {
    let session_store: Arc<dyn SessionStore> = match &cfg.redis_addr {
        Some(url) => {
            info!(%url, "using redis session store");
            Arc::new(RedisStore::connect(url, cfg.session_ttl).await?)
        }
        None => {
            info!("REDIS_ADDR not set, using in-memory session store");
            let mem = Arc::new(MemStore::new(cfg.session_ttl));
            let sweeper = mem.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(SWEEP_INTERVAL).await;
                    let removed = sweeper.sweep();
                    if removed > 0 {
                        debug!(removed, "swept expired sessions");
                    }
                }
            });
            mem
        }
    };

    let user_store: Arc<dyn UserStore> = Arc::new(MemUserStore::new());
    let trie = Arc::new(Trie::new());
    let indexed = user_store.get_all(&trie)?;
    info!(indexed, "prefix index populated");

    let mut proxies: Vec<(String, Arc<ServiceProxy>)> = Vec::new();
    if !cfg.message_addrs.is_empty() {
        let messaging = Arc::new(ServiceProxy::new(
            cfg.message_addrs.clone(),
            cfg.signing_key.clone(),
            session_store.clone(),
        )?);
        proxies.push(("/v1/channels".into(), messaging.clone()));
        proxies.push(("/v1/messages".into(), messaging));
    }
    if !cfg.summary_addrs.is_empty() {
        let summary = Arc::new(ServiceProxy::new(
            cfg.summary_addrs.clone(),
            cfg.signing_key.clone(),
            session_store.clone(),
        )?);
        proxies.push(("/v1/summary".into(), summary));
    }

    let state = AppState {
        signing_key: cfg.signing_key,
        user_store,
        session_store,
        trie,
        proxies: Arc::new(proxies),
    };

    let listener = tokio::net::TcpListener::bind(&cfg.addr).await?;
    info!(addr = %cfg.addr, "gateway listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn root() -> &'static str {
    "portico gateway is up\n"
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

/// POST /v1/users: sign up. Rejects duplicate emails and user names, indexes
/// the new account for search, and begins a session in the same response.
async fn create_user(
    State(state): State<AppState>,
    Json(new_user): Json<NewUser>,
) -> AppResult<(StatusCode, HeaderMap, Json<User>)> {
    new_user
        .validate()
        .map_err(|e| AppError::user("invalid_user", e.to_string()))?;

    match state.user_store.get_by_email(&new_user.email) {
        Ok(_) => {
            return Err(AppError::conflict(
                "duplicate_email",
                "an account with that email already exists",
            ))
        }
        Err(UserStoreError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }
    match state.user_store.get_by_user_name(&new_user.user_name) {
        Ok(_) => return Err(AppError::conflict("duplicate_user_name", "that user name is taken")),
        Err(UserStoreError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let user = state.user_store.insert(&new_user)?;
    user.index_into(&state.trie);
    info!(user = %user.user_name, "account created");

    let session = SessionState { began_at: Utc::now(), user: user.clone() };
    let mut headers = HeaderMap::new();
    begin_session(&state.signing_key, state.session_store.as_ref(), &session, &mut headers).await?;
    Ok((StatusCode::CREATED, headers, Json(user)))
}

/// GET /v1/users?q=: authenticated prefix search over indexed identity
/// fields. An empty or missing query yields an empty list.
async fn search_users(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> AppResult<Json<Vec<User>>> {
    get_state::<SessionState>(
        &headers,
        query.as_deref(),
        &state.signing_key,
        state.session_store.as_ref(),
    )
    .await?;

    let q = params.q.unwrap_or_default();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }
    // a user indexed under several matching keys appears once, at their
    // earliest position
    let mut ids = state.trie.get(MAX_SEARCH_RESULTS, &q.to_lowercase());
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    Ok(Json(state.user_store.get_by_id_slice(&ids)))
}

/// GET /v1/users/me: the session's user snapshot.
async fn current_user(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> AppResult<Json<User>> {
    let (_, session) = get_state::<SessionState>(
        &headers,
        query.as_deref(),
        &state.signing_key,
        state.session_store.as_ref(),
    )
    .await?;
    Ok(Json(session.user))
}

/// PATCH /v1/users/me: update the caller's first and last name, keep the
/// search index in step, and refresh the stored session under the same token.
async fn update_current_user(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Json(updates): Json<Updates>,
) -> AppResult<Json<User>> {
    let (sid, mut session): (SessionId, SessionState) = get_state(
        &headers,
        query.as_deref(),
        &state.signing_key,
        state.session_store.as_ref(),
    )
    .await?;

    let before = session.user.clone();
    session
        .user
        .apply_updates(&updates)
        .map_err(|e| AppError::user("invalid_updates", e.to_string()))?;
    state.user_store.update(before.id, &updates)?;

    // reindex the renamed fields; an old key may already be gone when two
    // fields shared a value
    for old in [&before.first_name, &before.last_name] {
        if let Err(e) = state.trie.remove(&old.to_lowercase(), before.id) {
            debug!(error = %e, "stale index entry already removed");
        }
    }
    state.trie.add(&session.user.first_name.to_lowercase(), before.id);
    state.trie.add(&session.user.last_name.to_lowercase(), before.id);

    let bytes = serde_json::to_vec(&session)
        .map_err(|e| AppError::internal("session_codec", e.to_string()))?;
    state.session_store.save(&sid, &bytes).await?;
    Ok(Json(session.user))
}

/// POST /v1/sessions: sign in. Unknown email and wrong password produce the
/// same error so the response does not reveal which accounts exist.
async fn sign_in(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> AppResult<(HeaderMap, Json<User>)> {
    let user = match state.user_store.get_by_email(&creds.email) {
        Ok(u) => u,
        Err(UserStoreError::NotFound) => return Err(invalid_credentials()),
        Err(e) => return Err(e.into()),
    };
    if !user.authenticate(&creds.password) {
        return Err(invalid_credentials());
    }
    info!(user = %user.user_name, "signed in");

    let session = SessionState { began_at: Utc::now(), user: user.clone() };
    let mut headers = HeaderMap::new();
    begin_session(&state.signing_key, state.session_store.as_ref(), &session, &mut headers).await?;
    Ok((headers, Json(user)))
}

fn invalid_credentials() -> AppError {
    AppError::auth("invalid_credentials", "invalid email or password")
}

/// DELETE /v1/sessions/mine: sign out. Idempotent for a valid token.
async fn sign_out(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> AppResult<&'static str> {
    end_session(&headers, query.as_deref(), &state.signing_key, state.session_store.as_ref())
        .await?;
    Ok("signed out\n")
}

/// Fallback: route unmatched paths to the downstream service whose registered
/// prefix matches longest, or 404 when nothing claims the path.
async fn dispatch(State(state): State<AppState>, req: Request) -> AppResult<Response> {
    let path = req.uri().path().to_string();
    match longest_prefix(&state.proxies, &path) {
        Some(proxy) => proxy.forward(req).await,
        None => Err(AppError::not_found("no_route", "no resource at this path")),
    }
}

fn longest_prefix<'a>(
    proxies: &'a [(String, Arc<ServiceProxy>)],
    path: &str,
) -> Option<&'a Arc<ServiceProxy>> {
    proxies
        .iter()
        .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, proxy)| proxy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::MemStore;

    fn pool(n: usize, store: &Arc<MemStore>) -> Arc<ServiceProxy> {
        let addrs = (0..n).map(|i| format!("svc{}:80", i)).collect();
        Arc::new(ServiceProxy::new(addrs, "key".into(), store.clone()).unwrap())
    }

    #[test]
    fn longest_prefix_wins() {
        let store = Arc::new(MemStore::new(Duration::from_secs(60)));
        let short = pool(1, &store);
        let long = pool(2, &store);
        let table = vec![
            ("/v1/messages".to_string(), short.clone()),
            ("/v1/messages/archive".to_string(), long.clone()),
        ];

        let hit = longest_prefix(&table, "/v1/messages/archive/2024").unwrap();
        assert_eq!(hit.pool_size(), 2);

        let hit = longest_prefix(&table, "/v1/messages/42").unwrap();
        assert_eq!(hit.pool_size(), 1);

        assert!(longest_prefix(&table, "/v1/other").is_none());
        assert!(longest_prefix(&[], "/v1/messages").is_none());
    }
}
