//! User-friendly error message mappings

use portcullis_http::client::error::ClientError;

pub const NETWORK_ERROR_MESSAGE: &str =
    "Unable to reach the server. Please check your connection and try again.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Convert a client error into text fit for the login and signup screens
///
/// Messages the service attached to a rejection are shown as-is; the server
/// is expected to phrase them for users.
pub fn user_friendly_message(error: &ClientError) -> String {
    if error.is_network() {
        return NETWORK_ERROR_MESSAGE.to_string();
    }

    match error {
        ClientError::RefreshFailed(_) | ClientError::SessionCleared => {
            SESSION_EXPIRED_MESSAGE.to_string()
        }
        ClientError::ServerError { .. } => GENERIC_ERROR_MESSAGE.to_string(),
        _ => error
            .server_message()
            .filter(|message| !message.trim().is_empty())
            .map_or_else(|| GENERIC_ERROR_MESSAGE.to_string(), str::to_string),
    }
}
