use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::permissions::PermissionChecker;
use super::types::{AuthUser, Permission};
use crate::api::error::ApiError;
use crate::error::Error;

/// Routes that do not require authentication.
const AUTH_WHITELIST: &[&str] = &["/health", "/schemas/types", "/v1/metadata"];

/// Strip a leading `/contexts/{ctx}` prefix so the permission rules below
/// only need to reason about the default-context route shapes (spec
/// §6.1: "Every listed endpoint exists both at the root path ... and
/// under `/contexts/{context}`").
fn strip_context_prefix(path: &str) -> &str {
    if let Some(rest) = path.strip_prefix("/contexts/") {
        if let Some(slash) = rest.find('/') {
            return &rest[slash..];
        }
    }
    path
}

fn extract_subject(path: &str) -> Option<&str> {
    let path = path.strip_prefix("/subjects/")?;
    path.split('/').next()
}

/// Determine required permission from HTTP method and path (spec §6.1's
/// route table).
fn required_permission(method: &axum::http::Method, path: &str) -> Permission {
    if path.starts_with("/config") || path.starts_with("/mode") || path.starts_with("/import/") {
        return match *method {
            axum::http::Method::GET => Permission::Read,
            _ => Permission::Admin,
        };
    }

    match *method {
        axum::http::Method::GET => Permission::Read,
        axum::http::Method::POST => {
            if path.contains("/versions") && extract_subject(path).is_some() {
                Permission::Write
            } else {
                // POST /subjects/{subject} (lookup-by-content) and
                // POST /compatibility/... are read-only checks.
                Permission::Read
            }
        }
        axum::http::Method::DELETE => Permission::Delete,
        axum::http::Method::PUT => Permission::Write,
        _ => Permission::Read,
    }
}

pub async fn auth_middleware(
    State(checker): State<Arc<PermissionChecker>>,
    request: Request,
    next: Next,
) -> Response {
    let full_path = request.uri().path().to_string();
    let path = strip_context_prefix(&full_path);
    let method = request.method().clone();

    if AUTH_WHITELIST.iter().any(|w| path.starts_with(w)) || path == "/" {
        return next.run(request).await;
    }

    let api_key = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let api_key = match api_key {
        Some(k) => k,
        None => {
            return ApiError::from(Error::Unauthorized("missing bearer token".to_string()))
                .into_response()
        }
    };

    let user = match checker.authenticate(api_key) {
        Some(u) => u,
        None => {
            return ApiError::from(Error::Unauthorized("invalid api key".to_string()))
                .into_response()
        }
    };

    let perm = required_permission(&method, path);
    let subject = extract_subject(path).unwrap_or("*");
    if !checker.check_permission(&user, subject, perm) {
        return ApiError::from(Error::Forbidden(format!(
            "user '{}' lacks {} permission on '{subject}'",
            user.name,
            perm.as_str()
        )))
        .into_response();
    }

    let mut request = request;
    request.extensions_mut().insert(user);

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_context_prefix() {
        assert_eq!(strip_context_prefix("/contexts/prod/subjects/s"), "/subjects/s");
        assert_eq!(strip_context_prefix("/subjects/s"), "/subjects/s");
    }

    #[test]
    fn extracts_subject_from_path() {
        assert_eq!(extract_subject("/subjects/orders-value/versions"), Some("orders-value"));
        assert_eq!(extract_subject("/schemas/ids/1"), None);
    }

    #[test]
    fn register_requires_write() {
        let perm = required_permission(&axum::http::Method::POST, "/subjects/orders-value/versions");
        assert_eq!(perm, Permission::Write);
    }

    #[test]
    fn config_put_requires_admin() {
        let perm = required_permission(&axum::http::Method::PUT, "/config/orders-value");
        assert_eq!(perm, Permission::Admin);
    }
}
