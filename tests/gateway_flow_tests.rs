//! End-to-end flows driven through the router: signup, sign-in, search,
//! profile updates, and logout, without binding a socket.

use anyhow::{anyhow, Result};
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use portico::indexes::Trie;
use portico::server::{app, AppState};
use portico::sessions::MemStore;
use portico::users::MemUserStore;

const KEY: &str = "integration signing key";

fn gateway() -> Router {
    app(AppState {
        signing_key: KEY.into(),
        user_store: Arc::new(MemUserStore::new()),
        session_store: Arc::new(MemStore::new(Duration::from_secs(300))),
        trie: Arc::new(Trie::new()),
        proxies: Arc::new(Vec::new()),
    })
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, HeaderMap, Vec<u8>)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let req = match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&v)?))?,
        None => builder.body(Body::empty())?,
    };
    let resp = router.clone().oneshot(req).await?;
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await?.to_bytes().to_vec();
    Ok((status, headers, bytes))
}

fn as_json(bytes: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

fn bearer_token(headers: &HeaderMap) -> Result<String> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| anyhow!("response missing Authorization header"))?
        .to_str()?;
    value
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
        .ok_or_else(|| anyhow!("Authorization header missing Bearer scheme"))
}

fn signup_payload(email: &str, user_name: &str, first: &str, last: &str) -> Value {
    json!({
        "email": email,
        "password": "hunter22",
        "passwordConf": "hunter22",
        "userName": user_name,
        "firstName": first,
        "lastName": last,
    })
}

#[tokio::test]
async fn signup_search_update_logout_flow() -> Result<()> {
    let gw = gateway();

    let (status, headers, body) = send(
        &gw,
        Method::POST,
        "/v1/users",
        None,
        Some(signup_payload("ana@example.com", "ana", "Ana", "Silva")),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let token = bearer_token(&headers)?;
    let created = as_json(&body)?;
    assert_eq!(created["userName"], "ana");
    assert_eq!(created["firstName"], "Ana");
    // password material never leaves the server
    assert!(created.get("passHash").is_none());
    assert!(created.get("pass_hash").is_none());
    assert!(created.get("password").is_none());

    // the fresh session resolves to the same account
    let (status, _, body) = send(&gw, Method::GET, "/v1/users/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)?["id"], created["id"]);

    // the new account is searchable by name prefix, case-insensitively
    let (status, _, body) =
        send(&gw, Method::GET, "/v1/users?q=AN", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let hits = as_json(&body)?;
    assert_eq!(hits.as_array().map(|a| a.len()), Some(1));
    assert_eq!(hits[0]["id"], created["id"]);

    // rename and confirm both the profile and the index moved
    let (status, _, body) = send(
        &gw,
        Method::PATCH,
        "/v1/users/me",
        Some(&token),
        Some(json!({ "firstName": "Anabela", "lastName": "Costa" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)?["lastName"], "Costa");

    let (_, _, body) = send(&gw, Method::GET, "/v1/users?q=silva", Some(&token), None).await?;
    assert_eq!(as_json(&body)?.as_array().map(|a| a.len()), Some(0));
    let (_, _, body) = send(&gw, Method::GET, "/v1/users?q=costa", Some(&token), None).await?;
    assert_eq!(as_json(&body)?[0]["id"], created["id"]);

    // the session carries the updated snapshot under the same token
    let (_, _, body) = send(&gw, Method::GET, "/v1/users/me", Some(&token), None).await?;
    assert_eq!(as_json(&body)?["firstName"], "Anabela");

    // logout, then the token no longer resolves
    let (status, _, _) =
        send(&gw, Method::DELETE, "/v1/sessions/mine", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&gw, Method::GET, "/v1/users/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // logout is idempotent for a still-valid token
    let (status, _, _) =
        send(&gw, Method::DELETE, "/v1/sessions/mine", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn signup_rejects_invalid_and_duplicate_accounts() -> Result<()> {
    let gw = gateway();

    let mut bad = signup_payload("not-an-email", "bo", "Bo", "Chen");
    let (status, _, body) = send(&gw, Method::POST, "/v1/users", None, Some(bad.clone())).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(as_json(&body)?["code"], "invalid_user");

    bad = signup_payload("bo@example.com", "bo", "Bo", "Chen");
    bad["passwordConf"] = json!("different1");
    let (status, _, _) = send(&gw, Method::POST, "/v1/users", None, Some(bad)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &gw,
        Method::POST,
        "/v1/users",
        None,
        Some(signup_payload("bo@example.com", "bo", "Bo", "Chen")),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = send(
        &gw,
        Method::POST,
        "/v1/users",
        None,
        Some(signup_payload("bo@example.com", "bo2", "Bo", "Chen")),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(as_json(&body)?["code"], "duplicate_email");

    let (status, _, body) = send(
        &gw,
        Method::POST,
        "/v1/users",
        None,
        Some(signup_payload("other@example.com", "bo", "Bo", "Chen")),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(as_json(&body)?["code"], "duplicate_user_name");
    Ok(())
}

#[tokio::test]
async fn sign_in_checks_credentials_without_leaking_accounts() -> Result<()> {
    let gw = gateway();
    send(
        &gw,
        Method::POST,
        "/v1/users",
        None,
        Some(signup_payload("kim@example.com", "kim", "Kim", "Park")),
    )
    .await?;

    let (status, headers, body) = send(
        &gw,
        Method::POST,
        "/v1/sessions",
        None,
        Some(json!({ "email": "kim@example.com", "password": "hunter22" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)?["userName"], "kim");
    let token = bearer_token(&headers)?;
    let (status, _, _) = send(&gw, Method::GET, "/v1/users/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    // wrong password and unknown email are indistinguishable
    let (status, _, body) = send(
        &gw,
        Method::POST,
        "/v1/sessions",
        None,
        Some(json!({ "email": "kim@example.com", "password": "wrong-pass" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let wrong_pass = as_json(&body)?;

    let (status, _, body) = send(
        &gw,
        Method::POST,
        "/v1/sessions",
        None,
        Some(json!({ "email": "ghost@example.com", "password": "hunter22" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(as_json(&body)?["code"], wrong_pass["code"]);
    Ok(())
}

#[tokio::test]
async fn search_requires_a_session() -> Result<()> {
    let gw = gateway();
    let (status, _, _) = send(&gw, Method::GET, "/v1/users?q=an", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, headers, _) = send(
        &gw,
        Method::POST,
        "/v1/users",
        None,
        Some(signup_payload("ana@example.com", "ana", "Ana", "Silva")),
    )
    .await?;
    let token = bearer_token(&headers)?;

    // authenticated but empty query yields an empty list, not an error
    let (status, _, body) = send(&gw, Method::GET, "/v1/users", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)?, json!([]));

    // a tampered token is rejected even though a session exists
    let mut forged = token.clone();
    let last = forged.pop().ok_or_else(|| anyhow!("empty token"))?;
    forged.push(if last == 'A' { 'B' } else { 'A' });
    let (status, _, _) = send(&gw, Method::GET, "/v1/users?q=an", Some(&forged), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn token_accepted_via_auth_query_parameter() -> Result<()> {
    let gw = gateway();
    let (_, headers, body) = send(
        &gw,
        Method::POST,
        "/v1/users",
        None,
        Some(signup_payload("lu@example.com", "lu", "Lu", "Wang")),
    )
    .await?;
    let token = bearer_token(&headers)?;
    let created = as_json(&body)?;

    let uri = format!("/v1/users/me?auth=Bearer%20{}", token);
    let (status, _, body) = send(&gw, Method::GET, &uri, None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)?["id"], created["id"]);
    Ok(())
}

#[tokio::test]
async fn unrouted_paths_return_not_found() -> Result<()> {
    let gw = gateway();
    let (status, _, body) = send(&gw, Method::GET, "/v1/summary?url=x", None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(as_json(&body)?["code"], "no_route");
    Ok(())
}
