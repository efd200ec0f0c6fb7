//! One handler per inbound event, grouped by the sub-system they act on.
//! `route` is the only entry point the dispatcher calls.

pub mod health;
mod lock;
mod presence;
mod resource;
mod room;

use gateway_core::{AuthenticatedUser, Result, RoomMember};
use gateway_events::views::RoomMemberView;
use gateway_events::{ClientEvent, ConnectionId};

use crate::state::AppState;
use crate::subscriptions::RoomSubscriptions;

pub(crate) fn member_view(member: &RoomMember) -> RoomMemberView {
	RoomMemberView {
		connection_id: member.connection_id.clone(),
		user_id: member.user_id.clone(),
		username: member.username.clone(),
		joined_at: member.joined_at,
		current_sub_resource: member.current_sub_resource.clone(),
		last_activity: member.last_activity,
	}
}

pub async fn route(state: &AppState, connection_id: &ConnectionId, user: &AuthenticatedUser, subscriptions: &RoomSubscriptions, event: ClientEvent) -> Result<()> {
	match event {
		ClientEvent::RoomJoin(payload) => room::join(state, connection_id, user, subscriptions, payload).await,
		ClientEvent::RoomLeave(payload) => room::leave(state, connection_id, user, subscriptions, payload).await,
		ClientEvent::RoomQueryUsers(payload) => room::query_users(state, connection_id, payload),
		ClientEvent::ResourceJoin(payload) => resource::join(state, connection_id, user, subscriptions, payload).await,
		ClientEvent::ResourceLeave(payload) => resource::leave(state, connection_id, user, subscriptions, payload).await,
		ClientEvent::SubResourceLock(payload) => lock::acquire(state, connection_id, user, payload).await,
		ClientEvent::SubResourceUnlock(payload) => lock::release(state, connection_id, payload).await,
		ClientEvent::LockExtend(payload) => lock::extend(state, connection_id, payload).await,
		ClientEvent::ForceRequest(payload) => lock::force_request(state, connection_id, user, payload).await,
		ClientEvent::ForceResponse(payload) => lock::force_response(state, connection_id, payload).await,
		ClientEvent::SetCurrentSubResource(payload) => presence::set_current_sub_resource(state, connection_id, payload).await,
		ClientEvent::Heartbeat(payload) => presence::heartbeat(state, connection_id, payload),
	}
}
