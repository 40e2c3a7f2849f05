//! HTTP surface over [`Bls::handle_packet`]: a thin axum router so the
//! remote connector adapter talks to the exact same acceptance logic
//! the embedded adapter calls in-process.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crosstown_types::{PacketRequest, PacketResponse};

use crate::handler::Bls;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn handle_packet(
    State(bls): State<Arc<Bls>>,
    Json(req): Json<PacketRequest>,
) -> Json<PacketResponse> {
    match bls.handle_packet(&req).await {
        Ok(response) => Json(response),
        Err(err) => {
            let (required, received) = match &err {
                crate::BlsError::InsufficientAmount { required, received } => (Some(*required), Some(*received)),
                _ => (None, None),
            };
            Json(PacketResponse::Reject {
                code: err.code(),
                message: err.to_string(),
                required,
                received,
            })
        }
    }
}

/// Routes mounted by `crosstown-node`: `POST /handle-packet`, `GET /health`.
pub fn router(bls: Arc<Bls>) -> Router {
    Router::new()
        .route("/handle-packet", post(handle_packet))
        .route("/health", get(health))
        .with_state(bls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::collections::HashMap;
    use tower::ServiceExt;

    use crosstown_codec::Envelope;
    use crosstown_crypto::{hash::event_id, sign_event, KeyPair};
    use crosstown_pricing::{KindRow, PricingPolicy};
    use crosstown_store::EventStore;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    async fn app() -> Router {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let pricing = Arc::new(PricingPolicy::new(HashMap::new(), KindRow::default()));
        let bls = Arc::new(Bls::new(store, pricing));
        router(bls)
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn handle_packet_accepts_a_valid_free_event() {
        let kp = KeyPair::generate();
        let created_at = 1_700_000_000;
        let id = event_id(&kp.public_key().0, created_at, crosstown_types::kinds::NOTE, &[], "hi");
        let sig = sign_event(&kp, &id).unwrap();
        let event = crosstown_types::SignedEvent {
            id,
            pubkey: kp.public_key().0,
            created_at,
            kind: crosstown_types::kinds::NOTE,
            tags: vec![],
            content: "hi".to_string(),
            sig,
        };
        let bytes = crosstown_codec::encode_envelope(&Envelope::Event(event)).unwrap();
        let req = crosstown_types::PacketRequest {
            amount: 1_000_000,
            destination: "g.test".to_string(),
            data: BASE64.encode(bytes),
            source_account: None,
        };

        let response = app()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/handle-packet")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&req).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
