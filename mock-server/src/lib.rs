use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Upper bound for `/large/{kib}` bodies.
pub const MAX_LARGE_KIB: usize = 4096;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayReply {
    pub trade_no: Uuid,
    pub status: String,
    pub request: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

pub type Ledger = Arc<RwLock<Vec<PayReply>>>;

pub fn app() -> Router {
    let ledger: Ledger = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route("/pay", post(pay))
        .route("/payments", get(list_payments))
        .route("/echo", post(echo))
        .route("/status/{code}", post(status))
        .route("/slow/{millis}", post(slow))
        .route("/large/{kib}", post(large))
        .route("/redirect", post(redirect))
        .route("/headers", post(headers))
        .with_state(ledger)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Accepts only `application/json` bodies; anything else is rejected by the
/// `Json` extractor with 415.
async fn pay(State(ledger): State<Ledger>, Json(request): Json<Value>) -> Json<PayReply> {
    let reply = PayReply {
        trade_no: Uuid::new_v4(),
        status: "SUCCESS".to_string(),
        request,
    };
    ledger.write().await.push(reply.clone());
    Json(reply)
}

async fn list_payments(State(ledger): State<Ledger>) -> Json<Vec<PayReply>> {
    Json(ledger.read().await.clone())
}

async fn echo(body: Bytes) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], body)
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, Json<ErrorReply>), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    let reply = ErrorReply {
        error: status.canonical_reason().unwrap_or("unknown").to_string(),
    };
    Ok((status, Json(reply)))
}

async fn slow(Path(millis): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Json(serde_json::json!({}))
}

async fn large(Path(kib): Path<usize>) -> Result<Vec<u8>, StatusCode> {
    if kib > MAX_LARGE_KIB {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    Ok(large_body(kib))
}

/// Answers 302 pointing at `/payments`. A client that follows it ends up
/// with a GET and the ledger listing instead of this body.
async fn redirect() -> impl IntoResponse {
    (
        StatusCode::FOUND,
        [(header::LOCATION, "/payments")],
        Json(serde_json::json!({"moved": true})),
    )
}

/// Reports the request headers back as a JSON object of lowercase names.
async fn headers(headers: HeaderMap) -> Json<Value> {
    let seen = headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            (name.as_str().to_owned(), Value::String(value))
        })
        .collect::<serde_json::Map<_, _>>();
    Json(Value::Object(seen))
}

/// Deterministic body of `kib` KiB served by `/large/{kib}`.
pub fn large_body(kib: usize) -> Vec<u8> {
    (0..kib * 1024).map(|i| b'a' + (i % 26) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pay_reply_serializes_to_json() {
        let reply = PayReply {
            trade_no: Uuid::nil(),
            status: "SUCCESS".to_string(),
            request: serde_json::json!({"amount": 100}),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["trade_no"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["request"]["amount"], 100);
    }

    #[test]
    fn pay_reply_rejects_missing_trade_no() {
        let result: Result<PayReply, _> =
            serde_json::from_str(r#"{"status":"SUCCESS","request":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn large_body_has_requested_size_and_pattern() {
        let body = large_body(2);
        assert_eq!(body.len(), 2048);
        assert_eq!(&body[..3], b"abc");
        assert_eq!(body[26], b'a');
    }

    #[test]
    fn large_body_of_zero_is_empty() {
        assert!(large_body(0).is_empty());
    }
}
