//! Desktop session detection.
//!
//! Wayland compositors refuse native key grabs, so the hotkey manager asks the
//! GlobalShortcuts portal first whenever either Wayland indicator is present.

use std::env;

/// The kind of graphical session this process runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// `XDG_SESSION_TYPE=wayland` or a `WAYLAND_DISPLAY` socket
    Wayland,
    /// `XDG_SESSION_TYPE=x11` or a `DISPLAY`
    X11,
    /// No indicator at all (headless, tty)
    Unknown,
}

impl SessionKind {
    /// Whether broker registration should be attempted before native registration.
    pub fn prefers_portal(self) -> bool {
        self == SessionKind::Wayland
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Wayland => "wayland",
            SessionKind::X11 => "x11",
            SessionKind::Unknown => "unknown",
        }
    }
}

/// Detect the session kind from the process environment
pub fn detect() -> SessionKind {
    detect_with(|name| env::var(name).ok())
}

/// Detect the session kind from an arbitrary variable lookup.
pub fn detect_with<F>(lookup: F) -> SessionKind
where
    F: Fn(&str) -> Option<String>,
{
    let set = |name: &str| lookup(name).is_some_and(|v| !v.is_empty());
    let session_type = lookup("XDG_SESSION_TYPE").unwrap_or_default();

    if session_type.eq_ignore_ascii_case("wayland") || set("WAYLAND_DISPLAY") {
        SessionKind::Wayland
    } else if session_type.eq_ignore_ascii_case("x11") || set("DISPLAY") {
        SessionKind::X11
    } else {
        SessionKind::Unknown
    }
}

/// Name of the running desktop, for diagnostics
pub fn desktop_name() -> String {
    env::var("XDG_CURRENT_DESKTOP")
        .or_else(|_| env::var("DESKTOP_SESSION"))
        .unwrap_or_else(|_| "Unknown".into())
}
