//! Request-level session resolution: extracts bearer tokens from requests,
//! binds them to stored state, and mints tokens on login/signup.

use axum::http::{header, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::sid::SessionId;
use super::store::{SessionError, SessionStore};

const PARAM_AUTHORIZATION: &str = "auth";
const SCHEME_BEARER: &str = "Bearer ";

/// Pull the bearer value from the `auth` query parameter, URL-decoded.
fn auth_from_query(query: &str) -> Option<String> {
    for pair in query.split('&') {
        let mut kv = pair.splitn(2, '=');
        if kv.next() == Some(PARAM_AUTHORIZATION) {
            let raw = kv.next().unwrap_or("");
            return urlencoding::decode(raw).ok().map(|v| v.into_owned());
        }
    }
    None
}

/// Extract and validate the session token from the Authorization header,
/// falling back to the `auth` query parameter. The literal "Bearer " scheme
/// prefix is required in either location.
pub fn get_session_id(
    headers: &HeaderMap,
    query: Option<&str>,
    signing_key: &str,
) -> Result<SessionId, SessionError> {
    let header_val = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let val = match header_val {
        Some(v) if !v.is_empty() => v,
        _ => query
            .and_then(auth_from_query)
            .ok_or(SessionError::NoToken)?,
    };
    let token = val.strip_prefix(SCHEME_BEARER).ok_or(SessionError::InvalidScheme)?;
    SessionId::validate(token, signing_key)
}

/// Resolve the request's session and decode its stored state. Returns the id
/// alongside the state so mutated state can be re-saved under the same key.
pub async fn get_state<T: DeserializeOwned>(
    headers: &HeaderMap,
    query: Option<&str>,
    signing_key: &str,
    store: &dyn SessionStore,
) -> Result<(SessionId, T), SessionError> {
    let sid = get_session_id(headers, query, signing_key)?;
    let bytes = store.get(&sid).await?;
    let state = serde_json::from_slice(&bytes).map_err(|e| SessionError::Codec(e.to_string()))?;
    Ok((sid, state))
}

/// Mint a new session: create a token, persist the serialized state under it,
/// and attach `Authorization: Bearer <token>` to the response headers. This is
/// the only path that produces new tokens.
pub async fn begin_session<T: Serialize>(
    signing_key: &str,
    store: &dyn SessionStore,
    state: &T,
    response_headers: &mut HeaderMap,
) -> Result<SessionId, SessionError> {
    let sid = SessionId::new(signing_key)?;
    let bytes = serde_json::to_vec(state).map_err(|e| SessionError::Codec(e.to_string()))?;
    store.save(&sid, &bytes).await?;
    let value = HeaderValue::from_str(&format!("{}{}", SCHEME_BEARER, sid))
        .map_err(|e| SessionError::Codec(e.to_string()))?;
    response_headers.insert(header::AUTHORIZATION, value);
    Ok(sid)
}

/// Resolve the request's session and delete its stored state. A malformed or
/// forged token fails before the store is touched; deleting an already-absent
/// entry succeeds, so logout is idempotent.
pub async fn end_session(
    headers: &HeaderMap,
    query: Option<&str>,
    signing_key: &str,
    store: &dyn SessionStore,
) -> Result<SessionId, SessionError> {
    let sid = get_session_id(headers, query, signing_key)?;
    store.delete(&sid).await?;
    Ok(sid)
}
