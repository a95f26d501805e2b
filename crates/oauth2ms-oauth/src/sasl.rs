//! SASL XOAUTH2 initial response (Google/Microsoft proprietary).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Generates the XOAUTH2 initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01` (base64 encoded)
///
/// # Example
///
/// ```
/// use oauth2ms_oauth::sasl::xoauth2_response;
///
/// let response = xoauth2_response("user@example.com", "EwBwA8l6...");
/// // Send: AUTHENTICATE XOAUTH2 {response}
/// ```
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Like [`xoauth2_response`], but refuses input that is not plain ASCII.
///
/// # Errors
///
/// Returns [`Error::NonAscii`] naming the offending argument.
pub fn xoauth2_response_ascii(user: &str, token: &str) -> Result<String> {
    if !user.is_ascii() {
        return Err(Error::NonAscii("username"));
    }
    if !token.is_ascii() {
        return Err(Error::NonAscii("token"));
    }
    Ok(xoauth2_response(user, token))
}
