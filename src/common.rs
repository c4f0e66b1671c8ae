use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;


/// Milliseconds since the Unix epoch.
pub fn current_timestamp() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0)
}

/// Generates a random, URL-safe token of 32 bytes of entropy.
pub fn generate_token() -> String {
	let mut buffer = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut buffer);
	URL_SAFE_NO_PAD.encode(buffer)
}
