//! WebSocket upgrade handler and per-connection task wiring.
//!
//! Grounded in `openibank_api::websocket`'s `ws.on_upgrade(...)` plus
//! recv-loop-plus-broadcast-sender-task skeleton: one task drains an
//! outbound `mpsc` into the socket sink, one drains the store's live
//! `broadcast` receiver into that same queue, and the inbound loop owns the
//! socket stream directly. `tokio::sync::watch<bool>` stands in for the
//! cancellation token `openibank_api::websocket` doesn't carry.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crosstown_store::EventStore;

use crate::connection::ConnectionState;
use crate::frame::{ClientFrame, FrameError, ServerFrame};

/// Bound on a connection's outbound queue before it's treated as a slow
/// consumer and dropped.
const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub struct Relay {
    store: Arc<EventStore>,
    outbound_queue_capacity: usize,
}

impl Relay {
    pub fn new(store: Arc<EventStore>) -> Arc<Self> {
        Arc::new(Self { store, outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY })
    }

    pub fn with_outbound_queue_capacity(store: Arc<EventStore>, capacity: usize) -> Arc<Self> {
        Arc::new(Self { store, outbound_queue_capacity: capacity })
    }

    /// `GET /relay` upgrades to the subscription WebSocket.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/relay", get(upgrade)).with_state(self)
    }
}

async fn upgrade(State(relay): State<Arc<Relay>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let state = ConnectionState::new(conn_id.clone());
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerFrame>(relay.outbound_queue_capacity);
    let (cancel_tx, mut cancel_rx_sender) = watch::channel(false);

    let sender_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame.to_text().into())).await.is_err() {
                break;
            }
        }
    });

    let fanout_handle = {
        let state = state.clone();
        let outbound_tx = outbound_tx.clone();
        let rx = relay.store.subscribe();
        let fanout_cancel_tx = cancel_tx.clone();
        let cancel_rx = fanout_cancel_tx.subscribe();
        tokio::spawn(live_fanout(state, rx, outbound_tx, fanout_cancel_tx, cancel_rx))
    };

    info!(conn_id, "relay connection established");

    loop {
        tokio::select! {
            _ = cancel_rx_sender.changed() => {
                if *cancel_rx_sender.borrow() {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_text(&text, &state, &relay.store, &outbound_tx).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(conn_id, error = %e, "relay connection read error");
                        break;
                    }
                }
            }
        }
    }

    let _ = cancel_tx.send(true);
    fanout_handle.abort();
    drop(outbound_tx);
    let _ = sender_task.await;
    state.set_phase(crate::connection::ConnectionPhase::Closed);
    info!(conn_id, subscriptions = state.subscription_count().await, "relay connection closed");
}

/// Parses and dispatches one inbound text frame. Returns `Err(())` only when
/// the outbound queue has been abandoned (sender task gone) and the
/// connection should close.
async fn handle_text(
    text: &str,
    state: &ConnectionState,
    store: &Arc<EventStore>,
    outbound_tx: &mpsc::Sender<ServerFrame>,
) -> Result<(), ()> {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            let _ = outbound_tx.send(ServerFrame::Notice(format!("bad frame: {e}"))).await;
            return Ok(());
        }
    };

    match frame {
        ClientFrame::Req { sub_id, filters } => {
            state.set_phase(crate::connection::ConnectionPhase::StreamingHistory);
            state.open_subscription(&sub_id, filters.clone()).await;
            let historical = store.query(&filters).await;
            for stored in historical {
                if state.mark_sent_if_new(&sub_id, &stored.event.id).await
                    && outbound_tx.send(ServerFrame::Event { sub_id: sub_id.clone(), event: stored.event }).await.is_err()
                {
                    return Err(());
                }
            }
            if outbound_tx.send(ServerFrame::Eose { sub_id }).await.is_err() {
                return Err(());
            }
            state.set_phase(crate::connection::ConnectionPhase::StreamingLive);
        }
        ClientFrame::Close { sub_id } => {
            state.close_subscription(&sub_id).await;
        }
        ClientFrame::Event(event) => {
            debug!(event_id = %event.id, "publish-over-websocket rejected, BLS path required");
            let _ = outbound_tx
                .send(ServerFrame::Ok {
                    event_id: event.id.clone(),
                    accepted: false,
                    message: "paid events must go through the handle-packet path".to_string(),
                })
                .await;
        }
    }
    Ok(())
}

/// Forwards every newly-stored event matching an open subscription's
/// filters, exactly once per `(subscription, event)` pair. Closes the
/// connection (flips `cancel_tx`) the moment the outbound queue is full.
async fn live_fanout(
    state: ConnectionState,
    mut rx: broadcast::Receiver<crosstown_types::StoredEvent>,
    outbound_tx: mpsc::Sender<ServerFrame>,
    cancel_tx: watch::Sender<bool>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = cancel_rx.changed() => {
                if *cancel_rx.borrow() {
                    return;
                }
            }
            received = rx.recv() => {
                match received {
                    Ok(stored) => {
                        for (sub_id, filters) in state.open_filters().await {
                            if !filters.iter().any(|f| crosstown_store::matches(f, &stored.event)) {
                                continue;
                            }
                            if !state.mark_sent_if_new(&sub_id, &stored.event.id).await {
                                continue;
                            }
                            let frame = ServerFrame::Event { sub_id, event: stored.event.clone() };
                            if outbound_tx.try_send(frame).is_err() {
                                let _ = outbound_tx.try_send(ServerFrame::Notice("slow consumer".to_string()));
                                let _ = cancel_tx.send(true);
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "relay fan-out lagged behind the store's notification channel");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosstown_crypto::{hash::event_id, sign_event, KeyPair};
    use crosstown_types::{kinds, Filter, SignedEvent};

    fn sign(kp: &KeyPair, kind: u32, created_at: i64, content: &str) -> SignedEvent {
        let pubkey = kp.public_key().0;
        let id = event_id(&pubkey, created_at, kind, &[], content);
        let sig = sign_event(kp, &id).unwrap();
        SignedEvent { id, pubkey, created_at, kind, tags: vec![], content: content.to_string(), sig }
    }

    #[tokio::test]
    async fn req_without_matching_history_still_emits_eose() {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let state = ConnectionState::new("conn1");
        let (tx, mut rx) = mpsc::channel(16);

        handle_text(r#"["REQ", "sub1", {"kinds": [1]}]"#, &state, &store, &tx).await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame, ServerFrame::Eose { sub_id: "sub1".to_string() });
    }

    #[tokio::test]
    async fn req_replays_matching_history_then_eose() {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let kp = KeyPair::generate();
        let event = sign(&kp, kinds::NOTE, 1_700_000_000, "hi");
        store.put(event.clone()).await.unwrap();

        let state = ConnectionState::new("conn1");
        let (tx, mut rx) = mpsc::channel(16);
        handle_text(r#"["REQ", "sub1", {"kinds": [1]}]"#, &state, &store, &tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first, ServerFrame::Event { sub_id: "sub1".to_string(), event });
        let second = rx.recv().await.unwrap();
        assert_eq!(second, ServerFrame::Eose { sub_id: "sub1".to_string() });
    }

    #[tokio::test]
    async fn close_removes_the_subscription() {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let state = ConnectionState::new("conn1");
        let (tx, _rx) = mpsc::channel(16);
        handle_text(r#"["REQ", "sub1", {}]"#, &state, &store, &tx).await.unwrap();
        assert_eq!(state.subscription_count().await, 1);
        handle_text(r#"["CLOSE", "sub1"]"#, &state, &store, &tx).await.unwrap();
        assert_eq!(state.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn publish_over_websocket_is_rejected() {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let state = ConnectionState::new("conn1");
        let (tx, mut rx) = mpsc::channel(16);
        let kp = KeyPair::generate();
        let event = sign(&kp, kinds::NOTE, 1_700_000_000, "hi");
        let text = format!(r#"["EVENT", {}]"#, serde_json::to_string(&event).unwrap());

        handle_text(&text, &state, &store, &tx).await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame, ServerFrame::Ok { event_id: event.id, accepted: false, message: "paid events must go through the handle-packet path".to_string() });
    }

    #[tokio::test]
    async fn malformed_frame_produces_notice_and_keeps_connection_open() {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let state = ConnectionState::new("conn1");
        let (tx, mut rx) = mpsc::channel(16);
        handle_text("not json", &state, &store, &tx).await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, ServerFrame::Notice(_)));
    }

    #[tokio::test]
    async fn live_fanout_forwards_new_events_to_open_subscriptions() {
        let store = Arc::new(EventStore::connect("sqlite::memory:").await.unwrap());
        let state = ConnectionState::new("conn1");
        state.open_subscription("sub1", vec![Filter { kinds: vec![kinds::NOTE], ..Default::default() }]).await;

        let rx = store.subscribe();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(16);
        let (cancel_tx, _keep_alive) = watch::channel(false);
        let cancel_rx = cancel_tx.subscribe();
        let task = tokio::spawn(live_fanout(state.clone(), rx, outbound_tx, cancel_tx, cancel_rx));

        let kp = KeyPair::generate();
        let event = sign(&kp, kinds::NOTE, 1_700_000_000, "hi");
        store.put(event.clone()).await.unwrap();

        let frame = outbound_rx.recv().await.unwrap();
        assert_eq!(frame, ServerFrame::Event { sub_id: "sub1".to_string(), event });
        task.abort();
    }
}
