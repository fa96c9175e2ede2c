//! The hotkey manager: one register/unregister/change-accelerator lifecycle
//! over two acquisition mechanisms.
//!
//! Registration order depends on the session:
//!
//! - Wayland: portal, then native, then portal again
//! - anything else: native, then portal
//!
//! In portal mode the physical key combination belongs to the portal's own
//! settings UI, so the manager neither knows nor changes it.

use crate::accelerator::Accelerator;
use crate::config::PortalConfig;
use crate::native::NativeRegistrar;
use crate::portal::{GlobalShortcuts, ListenerId, ShortcutDescriptor};
use crate::session::{self, SessionKind};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shown in place of the accelerator while the portal owns the binding
pub const PORTAL_DISPLAY: &str = "Portal";

/// Type alias for the callback run on every activation
pub type ActivationCallback = Arc<dyn Fn() + Send + Sync>;

/// Which mechanism holds (or last held) the hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMode {
    Native,
    Portal,
}

impl RegistrationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationMode::Native => "native",
            RegistrationMode::Portal => "portal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    RegisteredNative,
    RegisteredPortal,
}

/// Registers one application hotkey, natively or through the portal.
pub struct HotkeyManager {
    accelerator: Accelerator,
    mode: RegistrationMode,
    registered: bool,
    on_activate: ActivationCallback,
    native: Arc<dyn NativeRegistrar>,
    portal: Option<GlobalShortcuts>,
    portal_listener: Option<ListenerId>,
    shortcut: ShortcutDescriptor,
    session: SessionKind,
}

impl HotkeyManager {
    /// Create an unregistered manager.
    ///
    /// The session kind is detected from the environment and no portal
    /// client is attached; see [`HotkeyManager::with_portal`].
    pub fn new<F>(accelerator: Accelerator, native: Arc<dyn NativeRegistrar>, on_activate: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let defaults = PortalConfig::default();
        Self {
            accelerator,
            mode: RegistrationMode::Native,
            registered: false,
            on_activate: Arc::new(on_activate),
            native,
            portal: None,
            portal_listener: None,
            shortcut: ShortcutDescriptor::new(
                defaults.shortcut_id,
                defaults.shortcut_description,
            ),
            session: session::detect(),
        }
    }

    /// Use `portal` for portal registration and configuration.
    pub fn with_portal(mut self, portal: GlobalShortcuts) -> Self {
        self.portal = Some(portal);
        self
    }

    /// Override the detected session kind.
    pub fn with_session(mut self, session: SessionKind) -> Self {
        self.session = session;
        self
    }

    /// The shortcut bound through the portal.
    pub fn with_shortcut(mut self, shortcut: ShortcutDescriptor) -> Self {
        self.shortcut = shortcut;
        self
    }

    /// Acquire the hotkey.
    ///
    /// Returns true on success, including when it was already registered.
    /// Failures are logged and leave the manager unregistered.
    pub async fn register(&mut self) -> bool {
        if self.registered {
            return true;
        }

        if self.session.prefers_portal() {
            debug!("{} session, trying portal first", self.session.as_str());
            if self.try_register_portal().await {
                return true;
            }
        }

        if self.try_register_native() {
            return true;
        }

        self.try_register_portal().await
    }

    /// Release the hotkey. A no-op when unregistered.
    ///
    /// In portal mode only the local activation listener is removed; the
    /// portal session stays open for the next registration.
    pub fn unregister(&mut self) {
        if !self.registered {
            return;
        }

        match self.mode {
            RegistrationMode::Native => {
                if let Err(e) = self.native.unregister(&self.accelerator.to_string()) {
                    warn!("Failed to unregister {}: {}", self.accelerator, e);
                }
            }
            RegistrationMode::Portal => {
                if let (Some(portal), Some(id)) = (&self.portal, self.portal_listener.take()) {
                    portal.events().remove_listener(id);
                }
            }
        }

        self.registered = false;
        info!("Global shortcut unregistered ({})", self.mode.as_str());
    }

    /// Whether the hotkey is currently held.
    ///
    /// In native mode the registrar is asked directly.
    pub fn is_registered(&self) -> bool {
        match self.mode {
            RegistrationMode::Native => self.native.is_registered(&self.accelerator.to_string()),
            RegistrationMode::Portal => self.registered,
        }
    }

    /// Switch to a new accelerator and re-register.
    ///
    /// Always false in portal mode, where nothing is touched. Otherwise
    /// returns the outcome of re-registration.
    pub async fn set_accelerator(&mut self, accelerator: Accelerator) -> bool {
        if self.mode == RegistrationMode::Portal {
            debug!("Ignoring accelerator change to {} in portal mode", accelerator);
            return false;
        }

        self.unregister();
        self.accelerator = accelerator;
        self.register().await
    }

    /// Bind this application's shortcut through the portal so the user can
    /// assign a combination in the portal's dialog.
    pub async fn configure_portal_shortcut(&mut self) -> bool {
        let Some(portal) = &self.portal else {
            warn!("Cannot configure portal shortcut: no portal client");
            return false;
        };

        match portal.bind_shortcuts(std::slice::from_ref(&self.shortcut)).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to configure portal shortcut: {}", e);
                false
            }
        }
    }

    pub fn uses_portal(&self) -> bool {
        self.mode == RegistrationMode::Portal
    }

    /// The accelerator in native mode, `"Portal"` in portal mode.
    pub fn display_hotkey(&self) -> String {
        match self.mode {
            RegistrationMode::Native => self.accelerator.to_string(),
            RegistrationMode::Portal => PORTAL_DISPLAY.to_string(),
        }
    }

    pub fn accelerator(&self) -> &Accelerator {
        &self.accelerator
    }

    pub fn mode(&self) -> RegistrationMode {
        self.mode
    }

    pub fn state(&self) -> RegistrationState {
        match (self.registered, self.mode) {
            (false, _) => RegistrationState::Unregistered,
            (true, RegistrationMode::Native) => RegistrationState::RegisteredNative,
            (true, RegistrationMode::Portal) => RegistrationState::RegisteredPortal,
        }
    }

    pub fn session(&self) -> SessionKind {
        self.session
    }

    pub fn portal(&self) -> Option<&GlobalShortcuts> {
        self.portal.as_ref()
    }

    fn try_register_native(&mut self) -> bool {
        let accelerator = self.accelerator.to_string();
        let on_activate = self.on_activate.clone();
        let callback = Arc::new(move |pressed: &str| {
            info!("Hotkey pressed: {}", pressed);
            on_activate();
        });

        match self.native.register(&accelerator, callback) {
            Ok(()) => {
                self.mode = RegistrationMode::Native;
                self.registered = true;
                info!("Global shortcut registered (native): {}", accelerator);
                true
            }
            Err(e) => {
                warn!("Failed to register shortcut (native) {}: {}", accelerator, e);
                false
            }
        }
    }

    async fn try_register_portal(&mut self) -> bool {
        let Some(portal) = self.portal.clone() else {
            debug!("No portal client, skipping portal registration");
            return false;
        };

        if !portal.is_available().await {
            return false;
        }

        if let Err(e) = portal
            .bind_shortcuts(std::slice::from_ref(&self.shortcut))
            .await
        {
            error!("Error registering shortcut (portal): {}", e);
            return false;
        }

        if self.portal_listener.is_none() {
            let shortcut_id = self.shortcut.id.clone();
            let on_activate = self.on_activate.clone();
            let id = portal.events().add_listener(move |activated| {
                if activated != shortcut_id {
                    return;
                }
                info!("Portal shortcut activated: {}", activated);
                on_activate();
            });
            self.portal_listener = Some(id);
        }

        self.mode = RegistrationMode::Portal;
        self.registered = true;
        info!("Global shortcut registered (portal)");
        true
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBus, FakeNative};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        bus: Arc<FakeBus>,
        native: Arc<FakeNative>,
        presses: Arc<AtomicUsize>,
        manager: HotkeyManager,
    }

    fn harness(session: SessionKind, native_accepts: bool) -> Harness {
        let bus = FakeBus::new();
        let native = FakeNative::new(native_accepts);
        let presses = Arc::new(AtomicUsize::new(0));
        let counter = presses.clone();
        let manager = HotkeyManager::new(
            Accelerator::parse("Control+Shift+R").unwrap(),
            native.clone(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .with_portal(GlobalShortcuts::new(bus.clone(), &PortalConfig::default()))
        .with_session(session);
        Harness {
            bus,
            native,
            presses,
            manager,
        }
    }

    async fn wait_for(presses: &AtomicUsize, expected: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while presses.load(Ordering::SeqCst) < expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_wayland_prefers_portal() {
        let mut h = harness(SessionKind::Wayland, true);

        assert!(h.manager.register().await);
        assert_eq!(h.manager.state(), RegistrationState::RegisteredPortal);
        assert!(h.manager.uses_portal());
        assert_eq!(h.manager.display_hotkey(), "Portal");
        assert_eq!(h.native.register_calls(), 0);
        assert_eq!(h.bus.calls("BindShortcuts"), 1);
    }

    #[tokio::test]
    async fn test_x11_registers_natively() {
        let mut h = harness(SessionKind::X11, true);

        assert!(h.manager.register().await);
        assert_eq!(h.manager.state(), RegistrationState::RegisteredNative);
        assert_eq!(h.manager.display_hotkey(), "Control+Shift+R");
        assert!(h.manager.is_registered());
        assert_eq!(h.bus.calls("CreateSession"), 0);
    }

    #[tokio::test]
    async fn test_rejected_native_falls_back_to_portal() {
        let mut h = harness(SessionKind::X11, false);

        assert!(h.manager.register().await);
        assert_eq!(h.manager.state(), RegistrationState::RegisteredPortal);
        assert_eq!(h.native.register_calls(), 1);
        assert_eq!(h.bus.calls("BindShortcuts"), 1);
    }

    #[tokio::test]
    async fn test_wayland_without_portal_uses_native() {
        let mut h = harness(SessionKind::Wayland, true);
        h.bus.set_version(None);

        assert!(h.manager.register().await);
        assert_eq!(h.manager.state(), RegistrationState::RegisteredNative);
    }

    #[tokio::test]
    async fn test_everything_failing_leaves_unregistered() {
        let mut h = harness(SessionKind::Wayland, false);
        h.bus.set_version(None);

        assert!(!h.manager.register().await);
        assert_eq!(h.manager.state(), RegistrationState::Unregistered);
        assert!(!h.manager.is_registered());
        // Portal attempted first and last, native once in between
        assert_eq!(h.native.register_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_bind_is_not_a_registration() {
        let mut h = harness(SessionKind::Wayland, false);
        h.bus.reply("BindShortcuts", "Error", 0);

        assert!(!h.manager.register().await);
        assert_eq!(h.manager.state(), RegistrationState::Unregistered);
        assert_eq!(h.bus.calls("BindShortcuts"), 2);
        assert_eq!(h.manager.portal().unwrap().events().listener_count(), 0);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let mut h = harness(SessionKind::X11, true);
        assert!(h.manager.register().await);
        assert!(h.manager.register().await);
        assert_eq!(h.native.register_calls(), 1);

        let mut h = harness(SessionKind::Wayland, true);
        assert!(h.manager.register().await);
        assert!(h.manager.register().await);
        assert_eq!(h.bus.calls("CreateSession"), 1);
        assert_eq!(h.bus.calls("BindShortcuts"), 1);
    }

    #[tokio::test]
    async fn test_set_accelerator_in_portal_mode_fails_untouched() {
        let mut h = harness(SessionKind::Wayland, true);
        assert!(h.manager.register().await);

        let changed = h
            .manager
            .set_accelerator(Accelerator::parse("Alt+K").unwrap())
            .await;
        assert!(!changed);
        assert_eq!(h.manager.accelerator().to_string(), "Control+Shift+R");
        assert_eq!(h.manager.state(), RegistrationState::RegisteredPortal);
        assert_eq!(h.native.register_calls(), 0);
        assert_eq!(h.native.unregister_calls(), 0);
        assert_eq!(h.bus.calls("BindShortcuts"), 1);
    }

    #[tokio::test]
    async fn test_set_accelerator_rebinds_native() {
        let mut h = harness(SessionKind::X11, true);
        assert!(h.manager.register().await);

        assert!(
            h.manager
                .set_accelerator(Accelerator::parse("Alt+K").unwrap())
                .await
        );
        assert_eq!(h.manager.display_hotkey(), "Alt+K");
        assert_eq!(h.native.unregister_calls(), 1);
        assert!(!h.native.trigger("Control+Shift+R"));
        assert!(h.native.trigger("Alt+K"));
        assert_eq!(h.presses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_native_activation_runs_callback() {
        let mut h = harness(SessionKind::X11, true);
        assert!(h.manager.register().await);
        assert!(h.native.trigger("Control+Shift+R"));
        assert!(h.native.trigger("Control+Shift+R"));
        assert_eq!(h.presses.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_portal_activation_runs_callback() {
        let mut h = harness(SessionKind::Wayland, true);
        assert!(h.manager.register().await);
        let handle = h.manager.portal().unwrap().session_handle().unwrap();

        h.bus.activate(&handle, "some-other-shortcut");
        h.bus.activate(&handle, "toggle-recording");
        wait_for(&h.presses, 1).await;
        assert_eq!(h.presses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregister_portal_detaches_listener_only() {
        let mut h = harness(SessionKind::Wayland, true);
        assert!(h.manager.register().await);
        let events = h.manager.portal().unwrap().events().clone();
        assert_eq!(events.listener_count(), 1);

        h.manager.unregister();
        assert_eq!(h.manager.state(), RegistrationState::Unregistered);
        assert_eq!(events.listener_count(), 0);
        assert!(h.manager.portal().unwrap().session_handle().is_some());
        assert_eq!(h.bus.calls("Close"), 0);

        // A second unregister is a no-op
        h.manager.unregister();

        assert!(h.manager.register().await);
        assert_eq!(events.listener_count(), 1);
        assert_eq!(h.bus.calls("CreateSession"), 1);
    }

    #[tokio::test]
    async fn test_unregister_native() {
        let mut h = harness(SessionKind::X11, true);
        assert!(h.manager.register().await);
        h.manager.unregister();
        assert!(!h.manager.is_registered());
        assert!(!h.native.trigger("Control+Shift+R"));
        assert_eq!(h.manager.state(), RegistrationState::Unregistered);
    }

    #[tokio::test]
    async fn test_configure_portal_shortcut() {
        let mut h = harness(SessionKind::X11, true);
        assert!(h.manager.configure_portal_shortcut().await);
        assert_eq!(h.bus.calls("BindShortcuts"), 1);

        h.bus.reply("BindShortcuts", "Error", 0);
        assert!(!h.manager.configure_portal_shortcut().await);
    }

    #[tokio::test]
    async fn test_configure_without_portal_client() {
        let native = FakeNative::new(true);
        let mut manager = HotkeyManager::new(
            Accelerator::parse("Control+Shift+R").unwrap(),
            native,
            || {},
        )
        .with_session(SessionKind::Wayland);

        assert!(!manager.configure_portal_shortcut().await);
        assert!(manager.register().await);
        assert_eq!(manager.state(), RegistrationState::RegisteredNative);
    }

    #[tokio::test]
    async fn test_drop_releases_native_grab() {
        let h = harness(SessionKind::X11, true);
        let native = h.native.clone();
        let mut manager = h.manager;
        assert!(manager.register().await);
        drop(manager);
        assert!(!native.is_registered("Control+Shift+R"));
    }
}
