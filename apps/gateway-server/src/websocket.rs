//! The single WebSocket endpoint (spec.md §6): upgrade, handshake, the
//! per-connection read/write loop, and disconnect cleanup.
//!
//! Grounded on the teacher's `websocket/connection/core.rs` accept-loop
//! shape (upgrade, split the socket, spawn a writer task, run a `select!`
//! loop over inbound frames and outbound pushes until one side closes),
//! adapted to this gateway's auth-then-admit handshake and its three extra
//! wakeup sources: a ping ticker, the per-connection cancel token, and the
//! process-wide shutdown token.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{Sink, SinkExt, StreamExt};
use gateway_conn_guard::AdmitError;
use gateway_core::{ConnectionHandle, GatewayError};
use gateway_events::outbound::{AuthenticatedPayload, ConnectionRejectedPayload, ConnectionWarningPayload, ServerShutdownPayload};
use gateway_events::views::PublicUser;
use gateway_events::{ConnectionId, IntoSocketError, ServerEvent};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::{self, FrameOutcome};
use crate::handlers;
use crate::state::AppState;
use crate::subscriptions::RoomSubscriptions;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
	#[serde(rename = "auth.token", default)]
	auth_token: Option<String>,
	#[serde(default)]
	token: Option<String>,
}

impl WsQuery {
	fn token(&self) -> Option<&str> {
		self.auth_token.as_deref().or(self.token.as_deref())
	}
}

/// Derive a correlation id for logging/metrics only — never the
/// authorization principal, which is always the verified `userId` from the
/// bearer token. Priority mirrors the teacher's `client_id_from_request`:
/// an explicit `X-Client-Id` header, then `X-Forwarded-For` (behind a proxy
/// or load balancer), then the raw peer address.
fn client_id_from_request(headers: &HeaderMap, addr: &SocketAddr) -> String {
	if let Some(explicit) = headers.get("x-client-id").and_then(|v| v.to_str().ok()) {
		if !explicit.is_empty() && explicit.len() <= 64 {
			return format!("explicit:{explicit}");
		}
	}

	if let Some(forwarded_for) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
		if let Some(client_ip) = forwarded_for.split(',').next().map(str::trim) {
			return format!("proxy:{client_ip}");
		}
	}

	format!("direct:{}", addr.ip())
}

pub async fn upgrade(
	ws: WebSocketUpgrade,
	State(state): State<AppState>,
	Query(query): Query<WsQuery>,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	headers: HeaderMap,
) -> impl IntoResponse {
	let token = query.token().map(str::to_owned);
	let authorization = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_owned);
	let client_id = client_id_from_request(&headers, &addr);

	ws.on_upgrade(move |socket| handle_socket(socket, state, token, authorization, client_id))
}

fn to_text(event: &ServerEvent) -> Message {
	Message::Text(serde_json::to_string(event).unwrap_or_else(|_| "{}".to_owned()))
}

/// Brief grace period between emitting a rate-limit warning/ban frame and
/// actually closing the socket, so the client's TCP stack has a chance to
/// deliver the already-written bytes before the FIN (spec.md §4.5).
const DISCONNECT_FLUSH_DELAY_MS: u64 = 50;

/// Drain every message already queued in the outbox without blocking for
/// more, writing each to the sink. Used right before a forced disconnect so
/// the frame that triggered it (rate-limit warning, ban notice) is not lost.
async fn flush_outbox(outbox_rx: &mut tokio::sync::mpsc::Receiver<ServerEvent>, sink: &mut (impl Sink<Message> + Unpin)) {
	while let Ok(event) = outbox_rx.try_recv() {
		if sink.send(to_text(&event)).await.is_err() {
			break;
		}
	}
}

async fn handle_socket(socket: WebSocket, state: AppState, query_token: Option<String>, authorization_header: Option<String>, client_id: String) {
	let (mut sink, mut stream) = socket.split();

	let token = match crate::auth::extract_token(query_token.as_deref(), authorization_header.as_deref()) {
		Some(token) => token,
		None => {
			let _ = sink
				.send(to_text(&ServerEvent::Authenticated(AuthenticatedPayload {
					success: false,
					socket_id: None,
					user: None,
					error: Some(GatewayError::MissingToken.error_code()),
				})))
				.await;
			let _ = sink.close().await;
			return;
		}
	};

	let user = match crate::auth::authenticate(&token) {
		Ok(user) => user,
		Err(err) => {
			let _ = sink
				.send(to_text(&ServerEvent::Authenticated(AuthenticatedPayload {
					success: false,
					socket_id: None,
					user: None,
					error: Some(err.error_code()),
				})))
				.await;
			let _ = sink.close().await;
			return;
		}
	};

	let admission = match state.conn_guard.try_admit(user.user_id.clone()) {
		Ok(admission) => admission,
		Err(AdmitError::CapExceeded { limit, current }) => {
			let _ = sink
				.send(to_text(&ServerEvent::ConnectionRejected(ConnectionRejectedPayload {
					reason: "MAX_CONNECTIONS_EXCEEDED",
					limit,
					current,
					retry_after: gateway_conn_guard::RETRY_AFTER_MS,
				})))
				.await;
			let _ = sink.close().await;
			return;
		}
	};

	let connection_id = ConnectionId::new();
	let (outbox_tx, mut outbox_rx) = tokio::sync::mpsc::channel(256);
	let cancel_token = CancellationToken::new();

	state.connections.insert(ConnectionHandle {
		connection_id: connection_id.clone(),
		user: user.clone(),
		connected_at: Utc::now(),
		outbox: outbox_tx.clone(),
		cancel_token: cancel_token.clone(),
	});

	let _ = outbox_tx.try_send(ServerEvent::Authenticated(AuthenticatedPayload {
		success: true,
		socket_id: Some(connection_id.clone()),
		user: Some(PublicUser {
			user_id: user.user_id.clone(),
			username: user.username.clone(),
			first_name: user.first_name.clone(),
			last_name: user.last_name.clone(),
			email: user.email.clone(),
			roles: user.roles.clone(),
		}),
		error: None,
	}));
	if admission.crosses_warning_threshold() {
		let _ = outbox_tx.try_send(ServerEvent::ConnectionWarning(ConnectionWarningPayload {
			limit: admission.limit,
			current: admission.current,
			percentage_used: admission.percentage_used(),
		}));
	}

	info!(%connection_id, user_id = %user.user_id, %client_id, "connection admitted");

	// Announce shutdown exactly once over the normal outbox path, instead of
	// a repeating select! branch: `state.shutdown.cancelled()` stays ready
	// forever once fired, so polling it directly in the loop below would
	// resend the notice every iteration.
	let shutdown_notice = {
		let shutdown = state.shutdown.clone();
		let outbox = outbox_tx.clone();
		let grace_period_ms = state.config.shutdown_grace_ms;
		tokio::spawn(async move {
			shutdown.cancelled().await;
			let _ = outbox.try_send(ServerEvent::ServerShutdown(ServerShutdownPayload { reason: "SERVER_SHUTDOWN", grace_period_ms }));
		})
	};

	let subscriptions = RoomSubscriptions::new();
	let mut ping_ticker = tokio::time::interval(Duration::from_millis(state.config.ping_interval_ms));
	ping_ticker.tick().await;

	loop {
		tokio::select! {
			() = cancel_token.cancelled() => break,
			_ = ping_ticker.tick() => {
				if sink.send(Message::Ping(Vec::new())).await.is_err() {
					break;
				}
			}
			maybe_event = outbox_rx.recv() => {
				match maybe_event {
					Some(event) => {
						if matches!(event, ServerEvent::ForceRequestTimedOut(_)) {
							state.metrics.force_transfers_timed_out.inc();
						}
						if sink.send(to_text(&event)).await.is_err() {
							break;
						}
					}
					None => break,
				}
			}
			maybe_message = stream.next() => {
				match maybe_message {
					Some(Ok(Message::Text(raw))) => {
						match dispatcher::handle_frame(&state, &connection_id, &user, &subscriptions, &raw).await {
							FrameOutcome::Handled => {}
							FrameOutcome::Disconnect { reason } => {
								debug!(%connection_id, reason, "disconnecting connection");
								// The warning/ban frame the dispatcher just queued is still
								// sitting in outbox_rx, unflushed — drain it to the wire
								// before closing so the client actually sees it (spec.md
								// §4.1 "order: emit, then close"; §4.5 "brief post-emit delay").
								flush_outbox(&mut outbox_rx, &mut sink).await;
								tokio::time::sleep(Duration::from_millis(DISCONNECT_FLUSH_DELAY_MS)).await;
								break;
							}
						}
					}
					Some(Ok(Message::Close(_))) | None => break,
					Some(Ok(_)) => {}
					Some(Err(err)) => {
						warn!(%connection_id, error = %err, "websocket read error");
						break;
					}
				}
			}
		}
	}

	shutdown_notice.abort();
	cleanup(&state, &connection_id, &user, &subscriptions).await;
}

async fn cleanup(state: &AppState, connection_id: &ConnectionId, user: &gateway_core::AuthenticatedUser, subscriptions: &RoomSubscriptions) {
	state.locks.release_all_for_connection(connection_id).await;

	for (room_id, remaining_members) in state.rooms.leave_all(connection_id) {
		subscriptions.unsubscribe(&room_id);
		let _ = state
			.bus
			.broadcast_to_room(
				&room_id,
				ServerEvent::UserLeft(gateway_events::outbound::UserLeftPayload {
					room_id: room_id.clone(),
					connection_id: connection_id.clone(),
					user_id: user.user_id.clone(),
					reason: "disconnect",
				}),
			)
			.await;
		let _ = state
			.bus
			.broadcast_to_room(
				&room_id,
				ServerEvent::PresenceUpdated(gateway_events::outbound::PresenceUpdatedPayload {
					room_id: room_id.clone(),
					event_type: "user_left",
					trigger_user_id: user.user_id.clone(),
					users: remaining_members.iter().map(handlers::member_view).collect(),
					timestamp: Utc::now(),
				}),
			)
			.await;
		if remaining_members.is_empty() {
			state.bus.close_room(&room_id).await;
		}
	}

	subscriptions.unsubscribe_all();
	state.connections.remove(connection_id);
	state.rate_limiter.evict(connection_id);

	state.metrics.active_connections.set(i64::try_from(state.connections.len()).unwrap_or(i64::MAX));
	state.metrics.active_rooms.set(i64::try_from(state.rooms.room_count()).unwrap_or(i64::MAX));
	state.metrics.active_locks.set(i64::try_from(state.locks.lock_count()).unwrap_or(i64::MAX));

	info!(%connection_id, user_id = %user.user_id, "connection cleaned up");
}
