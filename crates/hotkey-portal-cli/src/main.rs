use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::{signal, sync::mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use hotkey_portal::{
    Accelerator, GlobalHotkeyRegistrar, GlobalShortcuts, HotkeyManager, KeyEvent,
    NativeRegistrar, PORTAL_SERVICE, PortalConfig, RegistrationState, SettingsStore,
    ShortcutDescriptor, Unsupported, ZbusBus, key_event_to_accelerator, session,
    settings::default_settings_path,
};

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Parser, Debug)]
#[command(name = "hotkey-portal")]
#[command(about = "Global hotkey registration through native grabs or the desktop portal", long_about = None)]
struct Args {
    /// Path to the settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Set the log level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    /// Seconds to wait for a portal response, 0 to wait forever
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Never talk to the portal
    #[arg(long, global = true, conflicts_with = "portal_only")]
    native_only: bool,

    /// Never grab keys natively
    #[arg(long, global = true)]
    portal_only: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register the hotkey and report activations until Ctrl+C (default)
    Listen,
    /// Bind the application shortcut through the portal's dialog
    Configure,
    /// Change the hotkey and save it on success
    Set {
        /// Accelerator, e.g. "Control+Shift+R"
        accelerator: String,
    },
    /// Restore the default hotkey
    Reset,
    /// Print the accelerator a key press normalizes to
    Normalize {
        /// Key name as reported by a key-capture surface, e.g. "r" or "ArrowUp"
        key: String,
        #[arg(long)]
        ctrl: bool,
        #[arg(long)]
        shift: bool,
        #[arg(long)]
        alt: bool,
        #[arg(long)]
        meta: bool,
    },
    /// Show session, portal and settings information
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Only initialize tracing if RUST_LOG is set or log level is explicitly provided
    if std::env::var("RUST_LOG").is_ok() || args.log_level.is_some() {
        let log_level = match args.log_level.clone().unwrap_or(LogLevel::Info) {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .without_time()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .with(
                EnvFilter::from_default_env()
                    .add_directive(format!("hotkey_portal={log_level}").parse()?)
                    .add_directive(format!("hotkey_portal_cli={log_level}").parse()?),
            )
            .init();
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;
    runtime.block_on(run(args))
}

async fn run(mut args: Args) -> Result<()> {
    let settings_path = match &args.settings {
        Some(path) => path.clone(),
        None => default_settings_path().context("No configuration directory on this system")?,
    };
    let mut store = SettingsStore::load(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let mut config = PortalConfig::default();
    if let Some(secs) = args.timeout {
        config.request_timeout_ms = (secs > 0).then(|| secs.saturating_mul(1000));
    }

    match args.command.take().unwrap_or(Command::Listen) {
        Command::Normalize {
            key,
            ctrl,
            shift,
            alt,
            meta,
        } => {
            let event = KeyEvent {
                key,
                ctrl_key: ctrl,
                shift_key: shift,
                alt_key: alt,
                meta_key: meta,
            };
            match key_event_to_accelerator(&event) {
                Some(accelerator) => println!("{accelerator}"),
                None => bail!("{:?} does not form a valid global shortcut", event.key),
            }
        }
        Command::Reset => {
            store.reset_hotkey().context("Failed to save settings")?;
            println!("Hotkey reset to {}", store.hotkey());
        }
        Command::Status => {
            let kind = session::detect();
            println!("Session:  {} ({})", kind.as_str(), session::desktop_name());
            println!(
                "Hotkey:   {}{}",
                store.hotkey(),
                if store.is_default_hotkey() { " (default)" } else { "" }
            );
            println!("Settings: {}", store.path().display());
            match connect_portal(&args, &config).await {
                Some(portal) if portal.is_available().await => {
                    println!("Portal:   available (version {})", portal.version());
                    if let Err(e) = portal.close().await {
                        debug!("Failed to close portal session: {}", e);
                    }
                }
                Some(_) => println!("Portal:   unavailable"),
                None => println!("Portal:   not connected"),
            }
        }
        Command::Configure => {
            let mut manager = build_manager(&args, &config, &store, || {}).await;
            if !manager.configure_portal_shortcut().await {
                bail!("Failed to configure the portal shortcut");
            }
            println!("Portal shortcut configured");
        }
        Command::Set { accelerator } => {
            let accelerator = Accelerator::parse(&accelerator)?;
            let mut manager = build_manager(&args, &config, &store, || {}).await;
            manager.register().await;
            if manager.uses_portal() {
                bail!("The hotkey is managed by the desktop portal; use `configure` instead");
            }
            if !manager.set_accelerator(accelerator.clone()).await {
                bail!("Failed to register {accelerator}");
            }
            store
                .set_hotkey(&accelerator)
                .context("Failed to save settings")?;
            println!("Hotkey set to {accelerator}");
        }
        Command::Listen => listen(&args, &config, &store).await?,
    }
    Ok(())
}

async fn listen(args: &Args, config: &PortalConfig, store: &SettingsStore) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut manager = build_manager(args, config, store, move || {
        let _ = tx.send(());
    })
    .await;

    if !manager.register().await {
        bail!("Could not register {} by any mechanism", manager.accelerator());
    }
    let how = match manager.state() {
        RegistrationState::RegisteredPortal => "portal",
        _ => "native",
    };
    println!(
        "Listening for {} ({how}); press Ctrl+C to exit",
        manager.display_hotkey()
    );

    let mut count = 0u64;
    loop {
        tokio::select! {
            activation = rx.recv() => {
                if activation.is_none() {
                    break;
                }
                count += 1;
                println!("Hotkey activated ({count})");
            }
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    manager.unregister();
    Ok(())
}

async fn connect_portal(args: &Args, config: &PortalConfig) -> Option<GlobalShortcuts> {
    if args.native_only {
        return None;
    }
    match ZbusBus::session(PORTAL_SERVICE).await {
        Ok(bus) => Some(GlobalShortcuts::new(Arc::new(bus), config)),
        Err(e) => {
            warn!("Session bus unavailable: {}", e);
            None
        }
    }
}

async fn build_manager<F>(
    args: &Args,
    config: &PortalConfig,
    store: &SettingsStore,
    on_activate: F,
) -> HotkeyManager
where
    F: Fn() + Send + Sync + 'static,
{
    let native: Arc<dyn NativeRegistrar> = if args.portal_only {
        Arc::new(Unsupported::new("native registration disabled"))
    } else {
        match GlobalHotkeyRegistrar::new() {
            Ok(registrar) => Arc::new(registrar),
            Err(e) => {
                warn!("Native hotkeys unavailable: {}", e);
                Arc::new(Unsupported::new(e.to_string()))
            }
        }
    };

    let mut manager = HotkeyManager::new(store.hotkey(), native, on_activate).with_shortcut(
        ShortcutDescriptor::new(
            config.shortcut_id.clone(),
            config.shortcut_description.clone(),
        ),
    );
    if let Some(portal) = connect_portal(args, config).await {
        manager = manager.with_portal(portal);
    }
    manager
}
