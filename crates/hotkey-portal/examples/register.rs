//! Register Control+Shift+R through whichever mechanism the session allows
//! and print each activation.
//!
//! Run with `RUST_LOG=hotkey_portal=debug` to watch the portal handshake.

use hotkey_portal::{
    Accelerator, GlobalHotkeyRegistrar, GlobalShortcuts, HotkeyManager, NativeRegistrar,
    PortalConfig, Unsupported, ZbusBus, PORTAL_SERVICE,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let native: Arc<dyn NativeRegistrar> = match GlobalHotkeyRegistrar::new() {
        Ok(registrar) => Arc::new(registrar),
        Err(e) => Arc::new(Unsupported::new(e.to_string())),
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut manager = HotkeyManager::new(Accelerator::parse("ctrl+shift+r")?, native, move || {
        let _ = tx.send(());
    });
    if let Ok(bus) = ZbusBus::session(PORTAL_SERVICE).await {
        manager = manager.with_portal(GlobalShortcuts::new(
            Arc::new(bus),
            &PortalConfig::default(),
        ));
    }

    if !manager.register().await {
        return Err("no registration mechanism accepted the hotkey".into());
    }
    println!(
        "Registered {} ({}), press it or Ctrl+C",
        manager.display_hotkey(),
        manager.mode().as_str()
    );

    while rx.recv().await.is_some() {
        println!("activated");
    }
    Ok(())
}
