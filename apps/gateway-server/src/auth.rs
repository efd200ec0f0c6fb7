//! Handshake authentication: a payload-only JWT decode (no signature
//! verification — that belongs to the identity provider fronting this
//! gateway, per spec.md §1's scope boundary). Grounded on the teacher's
//! `file_host` bearer-token extraction, adapted from an HTTP `Authorization`
//! extractor to a WS-handshake one that also accepts the token as a query
//! parameter, since browser `WebSocket` clients cannot set arbitrary headers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use gateway_core::{AuthenticatedUser, GatewayError};
use gateway_events::{UserId, Username};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RealmAccess {
	#[serde(default)]
	roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
	sub: String,
	preferred_username: String,
	#[serde(default)]
	given_name: String,
	#[serde(default)]
	family_name: String,
	#[serde(default)]
	email: Option<String>,
	#[serde(default)]
	email_address: Option<String>,
	exp: i64,
	#[serde(default)]
	realm_access: Option<RealmAccess>,
}

/// Extract the bearer token from either `auth.token` (query param, the
/// browser-WebSocket path) or an `Authorization: Bearer` header, preferring
/// the query param since it is always present on a WS upgrade request.
pub fn extract_token(query_token: Option<&str>, authorization_header: Option<&str>) -> Option<String> {
	if let Some(token) = query_token.filter(|t| !t.is_empty()) {
		return Some(token.to_owned());
	}
	authorization_header.and_then(|h| h.strip_prefix("Bearer ")).map(str::to_owned)
}

/// Decode and validate a JWT's payload segment. Does not verify signature.
pub fn authenticate(token: &str) -> Result<AuthenticatedUser, GatewayError> {
	let mut segments = token.split('.');
	let _header = segments.next().ok_or(GatewayError::InvalidToken)?;
	let payload_b64 = segments.next().ok_or(GatewayError::InvalidToken)?;

	let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| GatewayError::InvalidToken)?;
	let claims: Claims = serde_json::from_slice(&payload_bytes).map_err(|_| GatewayError::InvalidToken)?;

	if claims.sub.is_empty() || claims.preferred_username.is_empty() {
		return Err(GatewayError::InvalidToken);
	}
	if claims.exp <= Utc::now().timestamp() {
		return Err(GatewayError::TokenExpired);
	}

	let email = claims.email.or(claims.email_address).unwrap_or_default();
	let roles = claims.realm_access.map(|r| r.roles).unwrap_or_default();

	Ok(AuthenticatedUser {
		user_id: UserId::new(claims.sub),
		username: Username::new(claims.preferred_username),
		first_name: claims.given_name,
		last_name: claims.family_name,
		email,
		roles,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn token_for(sub: &str, exp: i64) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
		let payload = serde_json::json!({
			"sub": sub,
			"preferred_username": "alice",
			"exp": exp,
			"realm_access": {"roles": ["surgeon"]},
		});
		let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string());
		format!("{header}.{payload_b64}.sig")
	}

	#[test]
	fn valid_token_decodes_to_authenticated_user() {
		let token = token_for("user-1", Utc::now().timestamp() + 3600);
		let user = authenticate(&token).unwrap();
		assert_eq!(user.user_id.as_str(), "user-1");
		assert_eq!(user.roles, vec!["surgeon".to_owned()]);
	}

	#[test]
	fn expired_token_is_rejected() {
		let token = token_for("user-1", Utc::now().timestamp() - 10);
		assert!(matches!(authenticate(&token), Err(GatewayError::TokenExpired)));
	}

	#[test]
	fn malformed_token_is_rejected() {
		assert!(matches!(authenticate("not-a-jwt"), Err(GatewayError::InvalidToken)));
	}

	#[test]
	fn query_token_takes_priority_over_header() {
		assert_eq!(extract_token(Some("abc"), Some("Bearer xyz")), Some("abc".to_owned()));
		assert_eq!(extract_token(None, Some("Bearer xyz")), Some("xyz".to_owned()));
		assert_eq!(extract_token(None, None), None);
	}
}
