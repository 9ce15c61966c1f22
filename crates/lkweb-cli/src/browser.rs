//! Opens the provider's login page in the user's default browser.

use std::io::{self, BufRead, IsTerminal};

use anyhow::Result;
use tracing::{debug, warn};

use lkweb_core::handshake::{BrowserContext, CloseHandle, ContextOpener, WindowFeatures};

/// Set to skip launching a browser (the URL is still printed).
const NO_BROWSER_ENV: &str = "LK_NO_BROWSER";

pub struct SystemBrowserOpener {
    window: CloseHandle,
    launch: bool,
    /// Runs once the window is armed, so a cancel it reports is not reset.
    on_open: fn(CloseHandle),
}

impl SystemBrowserOpener {
    pub fn new(window: CloseHandle) -> Self {
        Self {
            window,
            launch: std::env::var(NO_BROWSER_ENV).is_err(),
            on_open: cancel_on_enter,
        }
    }
}

/// Treat Enter on an interactive terminal as the user closing the login window.
fn cancel_on_enter(window: CloseHandle) {
    if !io::stdin().is_terminal() {
        return;
    }
    std::thread::spawn(move || {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_ok() {
            window.close();
        }
    });
}

impl ContextOpener for SystemBrowserOpener {
    type Context = BrowserContext;

    fn open(&self, url: &str, features: &WindowFeatures) -> Result<BrowserContext> {
        self.window.reset();

        println!("Login page:");
        println!("  {}", url);
        println!();

        if io::stdin().is_terminal() {
            println!("Press Enter to cancel.");
        }

        if self.launch {
            // Window geometry is up to the browser; it is only a hint here.
            debug!(%features, "Launching system browser");
            if let Err(e) = open::that(url) {
                warn!(error = %e, "Failed to launch browser, URL printed instead");
            }
        }

        (self.on_open)(self.window.clone());
        Ok(BrowserContext::new(self.window.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lkweb_core::handshake::SecondaryContext;

    fn opener(window: &CloseHandle, on_open: fn(CloseHandle)) -> SystemBrowserOpener {
        SystemBrowserOpener {
            window: window.clone(),
            launch: false,
            on_open,
        }
    }

    #[test]
    fn test_open_rearms_a_previously_closed_window() {
        let window = CloseHandle::new();
        window.close();
        let context = opener(&window, |_| {})
            .open("https://idp.example/auth", &WindowFeatures::default())
            .unwrap();
        assert!(!context.is_closed());
    }

    #[test]
    fn test_cancel_reported_at_open_survives() {
        let window = CloseHandle::new();
        let context = opener(&window, |handle| handle.close())
            .open("https://idp.example/auth", &WindowFeatures::default())
            .unwrap();
        assert!(context.is_closed());
        assert!(window.is_closed());
    }
}
