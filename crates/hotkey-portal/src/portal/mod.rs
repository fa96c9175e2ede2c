//! Client side of the XDG desktop portal's `GlobalShortcuts` interface.
//!
//! [`request`] correlates portal method calls with their `Response` signals,
//! [`shortcuts`] manages the portal session and shortcut bindings, and
//! [`events`] fans shortcut activations out to local listeners.

pub mod events;
pub mod request;
pub mod shortcuts;

pub use events::{ListenerId, ShortcutEvents};
pub use request::{
    Handle, HandleKind, Requester, Response, PORTAL_PATH, PORTAL_SERVICE, REQUEST_INTERFACE,
};
pub use shortcuts::{ConnectionState, GlobalShortcuts, ShortcutDescriptor};

pub const SHORTCUTS_INTERFACE: &str = "org.freedesktop.portal.GlobalShortcuts";
pub const SESSION_INTERFACE: &str = "org.freedesktop.portal.Session";
