//! `basicAuth`: HTTP Basic authentication against a set of users.
//!
//! Users are `name:hash` entries where `hash` is the lowercase hex SHA-256
//! of the password. They come from the inline `users` list, from
//! `usersFile` (one entry per line, `#` starts a comment), or both; inline
//! entries win over file entries with the same name. With
//! `refreshSeconds` set the file is re-read on that interval for as long
//! as the middleware instance is alive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tokio::sync::{watch, RwLock};

use super::schema::{Field, FieldKind, OptionsSchema};
use super::{MiddlewareFactory, RouteHandle};
use crate::config::sources::sha256_hex;
use crate::error::MiddlewareInitError;
use crate::pipeline::{Middleware, Next, Position, RequestContext};

pub const TYPE_NAME: &str = "basicAuth";

const DEFAULT_REALM: &str = "portico";

type Users = HashMap<String, String>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BasicAuthOptions {
    #[serde(default)]
    pub users: Vec<String>,

    #[serde(default)]
    pub users_file: Option<PathBuf>,

    #[serde(default)]
    pub realm: Option<String>,

    /// Upstream header that receives the authenticated user name.
    #[serde(default)]
    pub header_field: Option<String>,

    /// Drop `Authorization` before forwarding.
    #[serde(default)]
    pub remove_header: bool,

    #[serde(default)]
    pub refresh_seconds: Option<u64>,
}

pub struct BasicAuthFactory;

#[async_trait]
impl MiddlewareFactory for BasicAuthFactory {
    type Options = BasicAuthOptions;

    fn provides(&self) -> &'static str {
        TYPE_NAME
    }

    fn options_schema(&self) -> OptionsSchema {
        OptionsSchema::new(vec![
            Field::optional("users", FieldKind::StringList).pattern("^[^:]+:[0-9a-fA-F]{64}$"),
            Field::optional("usersFile", FieldKind::String),
            Field::optional("realm", FieldKind::String),
            Field::optional("headerField", FieldKind::String),
            Field::optional("removeHeader", FieldKind::Bool),
            Field::optional("refreshSeconds", FieldKind::Integer),
        ])
    }

    async fn create(
        &self,
        name: &str,
        route: &RouteHandle,
        options: BasicAuthOptions,
    ) -> Result<Arc<dyn Middleware>, MiddlewareInitError> {
        if options.users.is_empty() && options.users_file.is_none() {
            return Err(MiddlewareInitError::new(
                "either users or usersFile must be set",
            ));
        }
        if options.refresh_seconds.is_some() && options.users_file.is_none() {
            return Err(MiddlewareInitError::new("refreshSeconds requires usersFile"));
        }
        if options.refresh_seconds == Some(0) {
            return Err(MiddlewareInitError::new("refreshSeconds must be positive"));
        }

        let inline = parse_users(options.users.iter().map(String::as_str))?;
        let users = match &options.users_file {
            Some(path) => load_users(path, &inline).await?,
            None => inline.clone(),
        };
        if users.is_empty() {
            return Err(MiddlewareInitError::new("no users configured"));
        }
        let users = Arc::new(RwLock::new(users));

        if let (Some(path), Some(seconds)) = (options.users_file, options.refresh_seconds) {
            spawn_refresh(
                name.to_string(),
                path,
                inline,
                Arc::downgrade(&users),
                Duration::from_secs(seconds),
                route.shutdown(),
            );
        }

        Ok(Arc::new(BasicAuth {
            name: name.to_string(),
            challenge: format!(
                "Basic realm=\"{}\"",
                options.realm.as_deref().unwrap_or(DEFAULT_REALM)
            ),
            users,
            header_field: options.header_field,
            remove_header: options.remove_header,
        }))
    }
}

fn parse_users<'a>(entries: impl Iterator<Item = &'a str>) -> Result<Users, MiddlewareInitError> {
    let mut users = Users::new();
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        let (user, hash) = entry
            .split_once(':')
            .filter(|(user, hash)| {
                !user.is_empty() && hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit())
            })
            .ok_or_else(|| {
                MiddlewareInitError::new(format!(
                    "invalid user entry '{}', expected name:sha256-hex",
                    entry.split(':').next().unwrap_or_default()
                ))
            })?;
        users.insert(user.to_string(), hash.to_ascii_lowercase());
    }
    Ok(users)
}

/// File users overlaid with the inline ones.
async fn load_users(path: &Path, inline: &Users) -> Result<Users, MiddlewareInitError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        MiddlewareInitError::with_source(format!("cannot read users file {}", path.display()), e)
    })?;
    let mut users = parse_users(content.lines())?;
    users.extend(inline.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(users)
}

fn spawn_refresh(
    name: String,
    path: PathBuf,
    inline: Users,
    users: Weak<RwLock<Users>>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            // Instance dropped with its generation.
            let Some(users) = users.upgrade() else {
                break;
            };

            match load_users(&path, &inline).await {
                Ok(loaded) => {
                    tracing::debug!(middleware = %name, users = loaded.len(), "reloaded users file");
                    *users.write().await = loaded;
                }
                Err(e) => {
                    tracing::warn!(
                        middleware = %name,
                        error = %e,
                        "users file refresh failed, keeping previous users"
                    );
                }
            }
        }
        tracing::debug!(middleware = %name, "users file refresh stopped");
    });
}

/// `Basic dXNlcjpwYXNz` -> `("user", "pass")`.
fn decode_credentials(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

pub struct BasicAuth {
    name: String,
    challenge: String,
    users: Arc<RwLock<Users>>,
    header_field: Option<String>,
    remove_header: bool,
}

impl BasicAuth {
    /// Credentials are copied out of the request before awaiting the users
    /// lock; the context itself must not be held across the await.
    async fn authenticate(&self, credentials: Option<(String, String)>) -> Option<String> {
        let (user, password) = credentials?;
        let digest = sha256_hex(password.as_bytes());
        let users = self.users.read().await;
        let expected = users.get(&user)?;
        bool::from(expected.as_bytes().ct_eq(digest.as_bytes())).then_some(user)
    }
}

#[async_trait]
impl Middleware for BasicAuth {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, mut ctx: RequestContext, next: Next<'_>) -> Response {
        let credentials = ctx
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(decode_credentials);
        let Some(user) = self.authenticate(credentials).await else {
            tracing::debug!(
                correlation_id = %ctx.correlation_id,
                middleware = %self.name,
                "basic auth rejected"
            );
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, self.challenge.clone())],
                "Unauthorized",
            )
                .into_response();
        };

        if let Some(field) = &self.header_field {
            // The backend must not be able to spoof it back to the client.
            ctx.state.set_response_header(field, "", Position::Prepend);
            ctx.state.set_request_header(field, "", Position::Append);
            ctx.state.set_request_header(field, &user, Position::Append);
        }
        if self.remove_header {
            ctx.state
                .set_request_header(header::AUTHORIZATION.as_str(), "", Position::Append);
        }

        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::model::MiddlewareSpec;
    use crate::middleware::registry::Registry;
    use crate::middleware::testing;

    fn entry(user: &str, password: &str) -> String {
        format!("{user}:{}", sha256_hex(password.as_bytes()))
    }

    fn basic(user: &str, password: &str) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{user}:{password}"))
        )
    }

    async fn build(options: serde_json::Value) -> Result<Arc<dyn Middleware>, crate::error::BuildError> {
        let (handle, _shutdown) = testing::handle();
        let spec = MiddlewareSpec {
            name: "auth".into(),
            kind: TYPE_NAME.into(),
            options,
        };
        Registry::with_builtins().instantiate(&spec, &handle).await
    }

    #[tokio::test]
    async fn missing_credentials_get_a_challenge() {
        let middleware = build(json!({"users": [entry("alice", "secret")], "realm": "internal"}))
            .await
            .unwrap();
        let capture = testing::Capture::default();

        let response = testing::run(middleware, testing::request("/", &[]), &capture).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"internal\""
        );
        assert!(capture.upstream().is_none());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let middleware = build(json!({"users": [entry("alice", "secret")]})).await.unwrap();
        let capture = testing::Capture::default();
        let auth = basic("alice", "guess");
        let ctx = testing::request("/", &[("authorization", auth.as_str())]);

        let response = testing::run(middleware, ctx, &capture).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_credentials_forward_user_and_drop_authorization() {
        let middleware = build(json!({
            "users": [entry("alice", "secret")],
            "headerField": "X-Auth-User",
            "removeHeader": "true",
        }))
        .await
        .unwrap();

        let mut capture = testing::Capture::default();
        capture.response_headers.insert("x-auth-user", "mallory".parse().unwrap());
        let auth = basic("alice", "secret");
        let ctx = testing::request("/", &[("authorization", auth.as_str()), ("x-auth-user", "bob")]);

        let response = testing::run(middleware, ctx, &capture).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-auth-user").is_none());
        let (_, headers) = capture.upstream().unwrap();
        let users: Vec<_> = headers.get_all("x-auth-user").iter().collect();
        assert_eq!(users, vec!["alice"]);
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn users_file_is_merged_with_inline_users() {
        let path = std::env::temp_dir().join(format!("portico-users-{}", uuid::Uuid::new_v4()));
        let content = format!(
            "# comment\n{}\n\n{}\n",
            entry("bob", "hunter2"),
            entry("alice", "from-file")
        );
        std::fs::write(&path, content).unwrap();

        let middleware = build(json!({
            "users": [entry("alice", "inline")],
            "usersFile": path.to_string_lossy(),
        }))
        .await
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        for (user, password, expected) in [
            ("bob", "hunter2", StatusCode::OK),
            ("alice", "inline", StatusCode::OK),
            ("alice", "from-file", StatusCode::UNAUTHORIZED),
        ] {
            let capture = testing::Capture::default();
            let auth = basic(user, password);
            let ctx = testing::request("/", &[("authorization", auth.as_str())]);
            let response = testing::run(Arc::clone(&middleware), ctx, &capture).await;
            assert_eq!(response.status(), expected, "{user}:{password}");
        }
    }

    #[tokio::test]
    async fn unreadable_users_file_fails_construction() {
        let err = build(json!({"usersFile": "/nonexistent/portico-users"}))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, crate::error::BuildError::MiddlewareInit { .. }));
    }

    #[tokio::test]
    async fn refresh_picks_up_file_changes() {
        let path = std::env::temp_dir().join(format!("portico-users-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, entry("bob", "old")).unwrap();

        let (handle, shutdown) = testing::handle();
        let middleware = BasicAuthFactory
            .create(
                "auth",
                &handle,
                BasicAuthOptions {
                    users: Vec::new(),
                    users_file: Some(path.clone()),
                    realm: None,
                    header_field: None,
                    remove_header: false,
                    refresh_seconds: Some(1),
                },
            )
            .await
            .unwrap();

        std::fs::write(&path, entry("bob", "new")).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let capture = testing::Capture::default();
        let auth = basic("bob", "new");
        let ctx = testing::request("/", &[("authorization", auth.as_str())]);
        let response = testing::run(middleware, ctx, &capture).await;
        assert_eq!(response.status(), StatusCode::OK);

        shutdown.send(true).unwrap();
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn runs_on_a_spawned_task() {
        let middleware = build(json!({"users": [entry("alice", "secret")]})).await.unwrap();
        let auth = basic("alice", "secret");
        let ctx = testing::request("/", &[("authorization", auth.as_str())]);

        let status = tokio::spawn(async move {
            let capture = testing::Capture::default();
            testing::run(middleware, ctx, &capture).await.status()
        })
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn digest_of_another_length_is_rejected() {
        let short = format!("alice:{}", &sha256_hex(b"secret")[..63]);
        let err = build(json!({"users": [short]})).await.err().unwrap();
        assert!(matches!(err, crate::error::BuildError::InvalidOptions { .. }));
    }

    #[test]
    fn rejects_malformed_user_entries() {
        assert!(parse_users(["alice"].into_iter()).is_err());
        assert!(parse_users(["alice:nothex"].into_iter()).is_err());
        assert!(parse_users(["", "# note"].into_iter()).unwrap().is_empty());
    }

    #[test]
    fn decodes_basic_credentials() {
        assert_eq!(
            decode_credentials(&basic("a", "b:c")),
            Some(("a".to_string(), "b:c".to_string()))
        );
        assert_eq!(decode_credentials("Bearer abc"), None);
    }
}
