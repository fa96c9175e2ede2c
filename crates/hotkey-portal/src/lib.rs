//! Global hotkeys on Linux desktops.
//!
//! X11 sessions allow a process to grab a key combination directly. Wayland
//! compositors do not, and route global shortcuts through the
//! `org.freedesktop.portal.GlobalShortcuts` portal instead. [`HotkeyManager`]
//! picks whichever mechanism works in the current session, falls back to the
//! other, and presents one register/unregister/change-accelerator lifecycle.
//!
//! ```no_run
//! use hotkey_portal::{
//!     Accelerator, GlobalHotkeyRegistrar, GlobalShortcuts, HotkeyManager, PortalConfig,
//!     ZbusBus, PORTAL_SERVICE,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> hotkey_portal::Result<()> {
//! let bus = Arc::new(ZbusBus::session(PORTAL_SERVICE).await?);
//! let portal = GlobalShortcuts::new(bus, &PortalConfig::default());
//! let native = Arc::new(GlobalHotkeyRegistrar::new()?);
//!
//! let mut manager = HotkeyManager::new(Accelerator::parse("Control+Shift+R")?, native, || {
//!     println!("toggled");
//! })
//! .with_portal(portal);
//! manager.register().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used types
pub use global_hotkey::hotkey::{Code, Modifiers};

pub mod accelerator;
pub mod bus;
pub mod config;
pub mod error;
pub mod manager;
pub mod native;
pub mod portal;
pub mod session;
pub mod settings;

#[cfg(test)]
mod testing;

pub use accelerator::{key_event_to_accelerator, Accelerator, KeyEvent};
pub use bus::dbus::ZbusBus;
pub use bus::Bus;
pub use config::PortalConfig;
pub use error::{Error, Result};
pub use manager::{HotkeyManager, RegistrationMode, RegistrationState};
pub use native::{GlobalHotkeyRegistrar, HotkeyCallback, NativeRegistrar, Unsupported};
pub use portal::{ConnectionState, GlobalShortcuts, ShortcutDescriptor, PORTAL_SERVICE};
pub use session::SessionKind;
pub use settings::{Settings, SettingsStore, DEFAULT_HOTKEY};
