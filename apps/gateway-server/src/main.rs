//! Process entry point. Grounded on the teacher's `main.rs` bootstrap shape
//! (`dotenv` → `Config::parse()` → tracing init → build state → bind →
//! `ctrl_c`-driven `CancellationToken` → `axum::serve(...).with_graceful_shutdown`)
//! collapsed to this gateway's single `AppState` and single router, plus the
//! fan-out listener that bridges the in-process `resource.updated` bus
//! (spec.md §4.7) into room broadcasts.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gateway_events::{ResourceUpdatedEvent, RoomId, ServerEvent};
use gateway_server::config::Config;
use gateway_server::state::AppState;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::JsonFields;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[tokio::main]
async fn main() -> Result<()> {
	dotenv::dotenv().ok();
	let config = Config::parse();
	init_tracing(&config);

	let config = Arc::new(config);
	let (state, sweeper) = AppState::build(config.clone());

	spawn_resource_update_listener(state.clone());

	let cors = if config.cors_origin == "*" {
		CorsLayer::permissive()
	} else {
		CorsLayer::new().allow_origin(config.cors_origin.parse::<axum::http::HeaderValue>()?)
	};

	let app = gateway_server::build_router(state.clone()).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors));

	let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
	tracing::info!(addr = %listener.local_addr()?, "gateway listening");

	let signal_shutdown = state.shutdown.clone();
	tokio::spawn(async move {
		tokio::signal::ctrl_c().await.ok();
		tracing::info!("received ctrl_c, starting graceful shutdown");
		signal_shutdown.cancel();
	});

	let server_shutdown = state.shutdown.clone();
	axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(async move {
			server_shutdown.cancelled().await;
		})
		.await?;

	tracing::info!(grace_ms = state.config.shutdown_grace_ms, "server stopped accepting connections, waiting out grace period");
	tokio::time::sleep(Duration::from_millis(state.config.shutdown_grace_ms)).await;

	for handle in state.connections.snapshot() {
		handle.cancel_token.cancel();
	}
	sweeper.shutdown();

	tracing::info!("shutdown complete");
	Ok(())
}

/// Bridge the in-process `resource.updated` feed (spec.md §4.7) into room
/// broadcasts. This is the "Event bus listener" component the spec keeps
/// distinct from the REST API that publishes onto the bus: it owns the
/// `roomId` derivation and the room-membership check, neither of which the
/// publisher needs to know about.
fn spawn_resource_update_listener(state: AppState) {
	tokio::spawn(async move {
		let mut updates = state.bus.subscribe_resource_updates().await;
		loop {
			tokio::select! {
				() = state.shutdown.cancelled() => break,
				received = updates.recv() => {
					match received {
						Ok(event) => handle_resource_update(&state, event).await,
						Err(_) => break,
					}
				}
			}
		}
	});
}

async fn handle_resource_update(state: &AppState, event: ResourceUpdatedEvent) {
	let room_id = RoomId::new(event.resource_type.as_str(), event.resource_uuid.as_str());

	if !state.rooms.query(&room_id).is_some_and(|(members, _)| !members.is_empty()) {
		tracing::debug!(%room_id, "dropping resource update for room with no members");
		return;
	}

	let payload = gateway_events::outbound::ResourceUpdatedPayload {
		room_id: room_id.clone(),
		resource_type: event.resource_type,
		resource_id: event.resource_uuid,
		new_revision_id: event.resource_revision_uuid,
		updated_by: event.updated_by,
		updated_by_user_id: event.updated_by_user_id,
		sub_resource_id: event.sub_resource_id,
		timestamp: event.timestamp,
		changes_summary: event.changes_summary,
	};

	if let Err(err) = state.bus.broadcast_to_room(&room_id, ServerEvent::ResourceUpdated(payload)).await {
		tracing::debug!(%room_id, error = %err, "failed to broadcast resource update");
	}
}

fn init_tracing(config: &Config) {
	let filter = EnvFilter::from_str(&config.rust_log).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(if config.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(
				tracing_subscriber::fmt::layer()
					.event_format(tracing_subscriber::fmt::format().pretty())
					.with_filter(filter),
			)
		})
		.init();
}
