//! Process configuration, loaded via `dotenv::dotenv().ok()` then
//! `Config::parse()` — the same sequencing the teacher's binary uses.

use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct Config {
	#[arg(long, env = "GATEWAY_PORT", default_value_t = 8080)]
	pub port: u16,

	#[arg(long, env = "GATEWAY_NAMESPACE", default_value = "/collab")]
	pub namespace: String,

	#[arg(long, env = "GATEWAY_CORS_ORIGIN", default_value = "*")]
	pub cors_origin: String,

	#[arg(long, env = "GATEWAY_TRANSPORTS", value_delimiter = ',', default_value = "websocket")]
	pub transports: Vec<String>,

	#[arg(long, env = "GATEWAY_PING_INTERVAL_MS", default_value_t = 25_000)]
	pub ping_interval_ms: u64,

	#[arg(long, env = "GATEWAY_PING_TIMEOUT_MS", default_value_t = 20_000)]
	pub ping_timeout_ms: u64,

	#[arg(long, env = "GATEWAY_MAX_CONNECTIONS_PER_USER", default_value_t = 5)]
	pub max_connections_per_user: usize,

	/// `resourceType=cap,resourceType=cap` — falls back to `room_limit_default`
	/// for any resource type not listed.
	#[arg(long, env = "GATEWAY_ROOM_LIMITS", value_parser = parse_room_limits, default_value = "surgery-management=20,admin_panel=5,chat=100")]
	pub room_limits: HashMap<String, usize>,

	#[arg(long, env = "GATEWAY_ROOM_LIMIT_DEFAULT", default_value_t = 50)]
	pub room_limit_default: usize,

	#[arg(long, env = "GATEWAY_LOCK_TTL_SECS", default_value_t = 3 * 3600)]
	pub lock_ttl_secs: u64,

	#[arg(long, env = "GATEWAY_WARNING_BEFORE_SECS", default_value_t = 15 * 60)]
	pub warning_before_secs: u64,

	#[arg(long, env = "GATEWAY_SWEEP_INTERVAL_SECS", default_value_t = 60)]
	pub sweep_interval_secs: u64,

	#[arg(long, env = "GATEWAY_HEARTBEAT_INTERVAL_SECS", default_value_t = 60)]
	pub heartbeat_interval_secs: u64,

	/// "env wins over default": clap's own env resolution already implements
	/// this — a set `GATEWAY_ENABLE_AUTO_LOCK` overrides this default. Accepts
	/// `"true"/"1"` and `"false"/"0"` per spec.md §6, not just Rust's `bool` parser.
	#[arg(long, env = "GATEWAY_ENABLE_AUTO_LOCK", value_parser = parse_bool_flag, default_value = "true")]
	pub enable_auto_lock: bool,

	#[arg(long, env = "RUST_LOG", default_value = "info")]
	pub rust_log: String,

	#[arg(long, env = "GATEWAY_LOG_JSON", default_value_t = false)]
	pub log_json: bool,

	#[arg(long, env = "GATEWAY_SHUTDOWN_GRACE_MS", default_value_t = 5_000)]
	pub shutdown_grace_ms: u64,

	#[arg(long, env = "GATEWAY_METRICS_PORT")]
	pub metrics_port: Option<u16>,
}

impl Config {
	#[must_use]
	pub fn new() -> Self {
		Self::parse()
	}

	#[must_use]
	pub fn lock_ttl(&self) -> Duration {
		Duration::from_secs(self.lock_ttl_secs)
	}

	#[must_use]
	pub fn warning_before(&self) -> Duration {
		Duration::from_secs(self.warning_before_secs)
	}

	#[must_use]
	pub fn sweep_interval(&self) -> Duration {
		Duration::from_secs(self.sweep_interval_secs)
	}
}

impl Default for Config {
	fn default() -> Self {
		Self::parse_from(std::iter::empty::<String>())
	}
}

fn parse_bool_flag(raw: &str) -> Result<bool, String> {
	match raw {
		"true" | "1" => Ok(true),
		"false" | "0" => Ok(false),
		other => Err(format!("expected one of true/1/false/0, got {other}")),
	}
}

fn parse_room_limits(raw: &str) -> Result<HashMap<String, usize>, String> {
	raw
		.split(',')
		.filter(|pair| !pair.is_empty())
		.map(|pair| {
			let (key, value) = pair.split_once('=').ok_or_else(|| format!("expected KEY=VAL, got {pair}"))?;
			let cap: usize = value.parse().map_err(|_| format!("invalid cap {value} for {key}"))?;
			Ok((key.to_owned(), cap))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_room_limit_pairs() {
		let parsed = parse_room_limits("surgery-management=20,chat=100").unwrap();
		assert_eq!(parsed.get("surgery-management"), Some(&20));
		assert_eq!(parsed.get("chat"), Some(&100));
	}

	#[test]
	fn empty_room_limits_parses_to_empty_map() {
		assert!(parse_room_limits("").unwrap().is_empty());
	}

	#[test]
	fn bool_flag_accepts_numeric_and_word_forms() {
		assert_eq!(parse_bool_flag("true"), Ok(true));
		assert_eq!(parse_bool_flag("1"), Ok(true));
		assert_eq!(parse_bool_flag("false"), Ok(false));
		assert_eq!(parse_bool_flag("0"), Ok(false));
		assert!(parse_bool_flag("yes").is_err());
	}
}
