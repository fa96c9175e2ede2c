//! Native (X11-style) global shortcut registration.

use crate::accelerator::Accelerator;
use crate::error::{Error, Result};
use global_hotkey::{hotkey::HotKey, GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// How often the listener thread checks whether its registrar is gone
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Type alias for hotkey callbacks that receive the accelerator string
pub type HotkeyCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Direct OS-level shortcut registration.
///
/// Accelerators are passed in their normalized string form.
pub trait NativeRegistrar: Send + Sync {
    /// Grab `accelerator` and call `callback` each time it is pressed.
    ///
    /// # Errors
    ///
    /// `RegistrationRejected` when the system refuses the grab, typically
    /// because another client already owns the combination.
    fn register(&self, accelerator: &str, callback: HotkeyCallback) -> Result<()>;

    /// Release a grab made by [`NativeRegistrar::register`].
    fn unregister(&self, accelerator: &str) -> Result<()>;

    fn is_registered(&self, accelerator: &str) -> bool;
}

/// Represents a registered hotkey with its metadata
struct HotkeyEntry {
    /// The actual hotkey combination
    hotkey: HotKey,
    /// Normalized accelerator the caller registered
    accelerator: String,
    /// Callback function to execute when the hotkey is pressed
    callback: HotkeyCallback,
}

type HotkeyTable = Arc<Mutex<HashMap<u32, HotkeyEntry>>>;

/// Native registrar backed by the `global-hotkey` crate.
///
/// `global-hotkey` delivers events for the whole process on one channel, so
/// keep a single registrar alive at a time.
pub struct GlobalHotkeyRegistrar {
    manager: GlobalHotKeyManager,
    hotkeys: HotkeyTable,
    /// Tells the listener thread to exit
    stop: Arc<AtomicBool>,
}

impl GlobalHotkeyRegistrar {
    /// Creates a new registrar.
    ///
    /// This will spawn a background thread to listen for hotkey events. The
    /// thread exits shortly after the registrar is dropped.
    ///
    /// # Errors
    ///
    /// `RegistrationRejected` when `DISPLAY` is unset or empty, or when the
    /// underlying global hotkey manager fails to initialize.
    pub fn new() -> Result<Self> {
        Self::with_env(|name| std::env::var(name).ok())
    }

    /// Like [`GlobalHotkeyRegistrar::new`], reading environment variables
    /// through `lookup`.
    pub(crate) fn with_env<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // global-hotkey only logs a failed XOpenDisplay, so check up front
        if !lookup("DISPLAY").is_some_and(|v| !v.is_empty()) {
            return Err(Error::RegistrationRejected(
                "No X display available (DISPLAY is not set)".to_string(),
            ));
        }

        let manager = GlobalHotKeyManager::new().map_err(|e| {
            Error::RegistrationRejected(format!("Failed to create hotkey manager: {e}"))
        })?;

        let hotkeys: HotkeyTable = Arc::new(Mutex::new(HashMap::new()));
        let stop = Arc::new(AtomicBool::new(false));
        spawn_listener(hotkeys.clone(), stop.clone());

        Ok(Self {
            manager,
            hotkeys,
            stop,
        })
    }

    fn hotkey_for(accelerator: &str) -> Result<HotKey> {
        Accelerator::parse(accelerator)?.to_hotkey()
    }
}

impl NativeRegistrar for GlobalHotkeyRegistrar {
    fn register(&self, accelerator: &str, callback: HotkeyCallback) -> Result<()> {
        let hotkey = Self::hotkey_for(accelerator)?;

        let mut hotkeys = self.hotkeys.lock();
        if hotkeys.contains_key(&hotkey.id()) {
            return Err(Error::RegistrationRejected(format!(
                "{accelerator} is already registered"
            )));
        }

        self.manager.register(hotkey)?;
        hotkeys.insert(
            hotkey.id(),
            HotkeyEntry {
                hotkey,
                accelerator: accelerator.to_string(),
                callback,
            },
        );
        Ok(())
    }

    fn unregister(&self, accelerator: &str) -> Result<()> {
        let hotkey = Self::hotkey_for(accelerator)?;
        let entry = self.hotkeys.lock().remove(&hotkey.id());
        match entry {
            Some(entry) => {
                self.manager.unregister(entry.hotkey)?;
                Ok(())
            }
            None => Err(Error::RegistrationRejected(format!(
                "{accelerator} is not registered"
            ))),
        }
    }

    fn is_registered(&self, accelerator: &str) -> bool {
        Self::hotkey_for(accelerator)
            .map(|hotkey| self.hotkeys.lock().contains_key(&hotkey.id()))
            .unwrap_or(false)
    }
}

impl Drop for GlobalHotkeyRegistrar {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for (_, entry) in self.hotkeys.lock().drain() {
            if let Err(e) = self.manager.unregister(entry.hotkey) {
                warn!("Failed to unregister {}: {}", entry.accelerator, e);
            }
        }
    }
}

/// Dispatch presses from the global event channel to `hotkeys` until `stop`
/// is set or the channel closes.
fn spawn_listener(hotkeys: HotkeyTable, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let receiver = GlobalHotKeyEvent::receiver();
        while !stop.load(Ordering::Relaxed) {
            let event = match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(event) => event,
                Err(e) if e.is_timeout() => continue,
                Err(_) => {
                    debug!("Hotkey event channel closed");
                    return;
                }
            };
            if event.state != HotKeyState::Pressed {
                continue;
            }
            let hit = hotkeys
                .lock()
                .get(&event.id)
                .map(|entry| (entry.callback.clone(), entry.accelerator.clone()));
            if let Some((callback, accelerator)) = hit {
                callback(&accelerator);
            }
        }
        debug!("Hotkey listener stopped");
    })
}

/// Registrar for sessions where native grabs cannot work at all.
///
/// Every registration is rejected, which sends the hotkey manager down the
/// portal path.
#[derive(Debug, Clone)]
pub struct Unsupported {
    reason: String,
}

impl Unsupported {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl NativeRegistrar for Unsupported {
    fn register(&self, accelerator: &str, _callback: HotkeyCallback) -> Result<()> {
        Err(Error::RegistrationRejected(format!(
            "{accelerator}: {}",
            self.reason
        )))
    }

    fn unregister(&self, _accelerator: &str) -> Result<()> {
        Ok(())
    }

    fn is_registered(&self, _accelerator: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_rejects_everything() {
        let registrar = Unsupported::new("no display");
        let err = registrar
            .register("Control+Shift+R", Arc::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, Error::RegistrationRejected(ref m) if m.contains("no display")));
        assert!(!registrar.is_registered("Control+Shift+R"));
        assert!(registrar.unregister("Control+Shift+R").is_ok());
    }

    #[test]
    fn test_invalid_accelerator_never_reaches_the_system() {
        assert!(matches!(
            GlobalHotkeyRegistrar::hotkey_for("R"),
            Err(Error::InvalidAccelerator(_))
        ));
        assert!(GlobalHotkeyRegistrar::hotkey_for("Control+Shift+R").is_ok());
    }

    #[test]
    fn test_no_display_is_rejected() {
        for display in [None, Some("")] {
            let result = GlobalHotkeyRegistrar::with_env(|name| match name {
                "DISPLAY" => display.map(str::to_string),
                _ => None,
            });
            assert!(matches!(
                result.err(),
                Some(Error::RegistrationRejected(ref m)) if m.contains("DISPLAY")
            ));
        }
    }

    #[test]
    fn test_listener_exits_when_stopped() {
        let stop = Arc::new(AtomicBool::new(false));
        let listener = spawn_listener(Arc::new(Mutex::new(HashMap::new())), stop.clone());
        std::thread::sleep(POLL_INTERVAL / 2);
        assert!(!listener.is_finished());

        stop.store(true, Ordering::Relaxed);
        listener.join().unwrap();
    }
}
