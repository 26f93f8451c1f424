use std::any::Any;

use tokio::task::JoinError;

/// Extracts the human-readable message from a panic payload.
///
/// Returns `None` when the payload is neither a `&'static str` nor a `String`.
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	payload.downcast_ref::<String>().cloned()
}

/// Returns the panic message carried by a join error.
///
/// Cancelled tasks yield `None`.
pub fn join_error_panic_message(err: JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	let payload = err.into_panic();
	Some(panic_message(payload.as_ref()).unwrap_or_else(|| "non-string panic payload".to_string()))
}
