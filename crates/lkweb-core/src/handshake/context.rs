//! The secondary browsing context the identity provider runs in.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

const POPUP_WIDTH: u32 = 500;
const POPUP_HEIGHT: u32 = 600;

/// Fallback screen size when the real one is unknown.
const DEFAULT_SCREEN: (u32, u32) = (1920, 1080);

/// A window opened for the provider's login page.
pub trait SecondaryContext: Send {
    /// True once the window is gone, whoever closed it.
    fn is_closed(&self) -> bool;

    /// Close the window. Closing twice is a no-op.
    fn close(&mut self);
}

/// Opens secondary contexts.
pub trait ContextOpener: Send + Sync {
    type Context: SecondaryContext;

    fn open(&self, url: &str, features: &WindowFeatures) -> Result<Self::Context>;
}

/// Size and placement of the login popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFeatures {
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
}

impl WindowFeatures {
    /// A 500x600 window centred on a screen of the given size.
    pub fn centered(screen_width: u32, screen_height: u32) -> Self {
        Self {
            width: POPUP_WIDTH,
            height: POPUP_HEIGHT,
            left: (screen_width / 2).saturating_sub(POPUP_WIDTH / 2),
            top: (screen_height / 2).saturating_sub(POPUP_HEIGHT / 2),
        }
    }
}

impl Default for WindowFeatures {
    fn default() -> Self {
        Self::centered(DEFAULT_SCREEN.0, DEFAULT_SCREEN.1)
    }
}

impl fmt::Display for WindowFeatures {
    /// Renders the `window.open` feature string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "width={},height={},left={},top={},resizable=yes,scrollbars=yes",
            self.width, self.height, self.left, self.top
        )
    }
}

/// Shared closed flag for a context we cannot observe directly.
///
/// Whoever ends the login page's life (the callback handler, the user)
/// flips it; the liveness poll reads it.
#[derive(Debug, Clone, Default)]
pub struct CloseHandle {
    closed: Arc<AtomicBool>,
}

impl CloseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Re-arm for a new window.
    pub fn reset(&self) {
        self.closed.store(false, Ordering::Release);
    }
}

/// A login page running in an external browser.
#[derive(Debug)]
pub struct BrowserContext {
    handle: CloseHandle,
}

impl BrowserContext {
    pub fn new(handle: CloseHandle) -> Self {
        Self { handle }
    }
}

impl SecondaryContext for BrowserContext {
    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    fn close(&mut self) {
        self.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_features() {
        let features = WindowFeatures::centered(1920, 1080);
        assert_eq!(features.left, 710);
        assert_eq!(features.top, 240);
        assert_eq!(
            features.to_string(),
            "width=500,height=600,left=710,top=240,resizable=yes,scrollbars=yes"
        );
    }

    #[test]
    fn test_centered_on_small_screen() {
        let features = WindowFeatures::centered(400, 300);
        assert_eq!((features.left, features.top), (0, 0));
    }

    #[test]
    fn test_browser_context_shares_handle() {
        let handle = CloseHandle::new();
        let mut ctx = BrowserContext::new(handle.clone());
        assert!(!ctx.is_closed());
        handle.close();
        assert!(ctx.is_closed());
        ctx.close();
        handle.reset();
        assert!(!ctx.is_closed());
    }
}
