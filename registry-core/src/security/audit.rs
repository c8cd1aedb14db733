//! Structured audit events for mutating requests (spec §2 ambient
//! logging: "audit-style structured log events for register/delete/
//! config/mode mutations ... emitted via `tracing`, not indexed
//! anywhere").

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use chrono::Utc;
use serde::Serialize;

use super::types::AuthUser;

const AUDIT_SKIP: &[&str] = &["/health"];

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event_type: String,
    pub user: Option<String>,
    pub roles: Vec<String>,
    pub subject: Option<String>,
    pub action: String,
    pub status_code: u16,
    pub client_ip: String,
    pub duration_ms: u64,
}

fn extract_subject(path: &str) -> Option<String> {
    let path = path.strip_prefix("/subjects/")?;
    path.split('/').next().map(String::from)
}

fn classify_event(method: &axum::http::Method, path: &str) -> String {
    if path.starts_with("/config") || path.starts_with("/mode") {
        return "config".to_string();
    }
    if path.starts_with("/import/") {
        return "import".to_string();
    }
    if path.starts_with("/compatibility/") {
        return "compatibility-check".to_string();
    }
    match *method {
        axum::http::Method::POST => "register".to_string(),
        axum::http::Method::DELETE => "delete".to_string(),
        _ => "read".to_string(),
    }
}

fn extract_client_ip(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or("").trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn audit_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    if AUDIT_SKIP.iter().any(|s| path.starts_with(s)) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let client_ip = extract_client_ip(&request);
    let user = request.extensions().get::<AuthUser>().cloned();
    let subject = extract_subject(&path);
    let event_type = classify_event(&method, &path);
    let action = format!("{method} {path}");

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let audit_event = AuditEvent {
        timestamp: Utc::now().to_rfc3339(),
        event_type,
        user: user.as_ref().map(|u| u.name.clone()),
        roles: user.as_ref().map(|u| u.roles.clone()).unwrap_or_default(),
        subject,
        action,
        status_code: response.status().as_u16(),
        client_ip,
        duration_ms,
    };

    tracing::info!(
        target: "registry::audit",
        event_type = %audit_event.event_type,
        user = ?audit_event.user,
        subject = ?audit_event.subject,
        action = %audit_event.action,
        status_code = audit_event.status_code,
        client_ip = %audit_event.client_ip,
        duration_ms = audit_event.duration_ms,
        "audit"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_config_and_import_events() {
        assert_eq!(classify_event(&axum::http::Method::PUT, "/config/s"), "config");
        assert_eq!(classify_event(&axum::http::Method::POST, "/import/schemas"), "import");
        assert_eq!(
            classify_event(&axum::http::Method::POST, "/compatibility/subjects/s/versions"),
            "compatibility-check"
        );
    }

    #[test]
    fn extracts_subject_from_path() {
        assert_eq!(extract_subject("/subjects/orders-value/versions"), Some("orders-value".to_string()));
        assert_eq!(extract_subject("/config"), None);
    }
}
