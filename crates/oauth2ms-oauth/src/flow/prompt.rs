//! Presenting the authorization URL to the user.

use tracing::{info, warn};
use url::Url;

use crate::error::Result;

/// Shows the authorization URL to the user.
///
/// Called once the redirect listener is bound, so the redirect can never race
/// the listener.
pub trait AuthorizationPrompt {
    /// Presents `url` to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be presented at all.
    fn present(&self, url: &Url) -> Result<()>;
}

/// Opens the URL in the default browser, printing it if that fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserPrompt;

impl AuthorizationPrompt for BrowserPrompt {
    fn present(&self, url: &Url) -> Result<()> {
        match opener::open_browser(url.as_str()) {
            Ok(()) => {
                info!("Opened authorization page in the browser");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to launch browser: {e}");
                PrintPrompt.present(url)
            }
        }
    }
}

/// Prints the URL on stderr for the user to open.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintPrompt;

impl AuthorizationPrompt for PrintPrompt {
    fn present(&self, url: &Url) -> Result<()> {
        eprintln!("Please visit the following URL to authorize:\n\n{url}\n");
        Ok(())
    }
}
