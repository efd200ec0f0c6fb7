use std::time::Duration;

/// Formats a duration as `"Nd Nh Nm Ns"`, dropping leading zero components,
/// the way the admin snapshot endpoints (spec.md §6) render connection/room/lock ages.
#[must_use]
pub fn format_duration_dhms(duration: Duration) -> String {
	let total_secs = duration.as_secs();
	let days = total_secs / 86_400;
	let hours = (total_secs % 86_400) / 3_600;
	let minutes = (total_secs % 3_600) / 60;
	let seconds = total_secs % 60;

	if days > 0 {
		format!("{days}d {hours}h {minutes}m {seconds}s")
	} else if hours > 0 {
		format!("{hours}h {minutes}m {seconds}s")
	} else if minutes > 0 {
		format!("{minutes}m {seconds}s")
	} else {
		format!("{seconds}s")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_seconds_only() {
		assert_eq!(format_duration_dhms(Duration::from_secs(45)), "45s");
	}

	#[test]
	fn formats_minutes_and_seconds() {
		assert_eq!(format_duration_dhms(Duration::from_secs(125)), "2m 5s");
	}

	#[test]
	fn formats_full_breakdown() {
		let secs = 2 * 86_400 + 3 * 3_600 + 4 * 60 + 5;
		assert_eq!(format_duration_dhms(Duration::from_secs(secs)), "2d 3h 4m 5s");
	}
}
