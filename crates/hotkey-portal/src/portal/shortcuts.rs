//! Session and shortcut lifecycle for `org.freedesktop.portal.GlobalShortcuts`.
//!
//! A [`GlobalShortcuts`] client connects lazily. The first caller that needs
//! the portal starts a connection attempt; every caller that arrives while it
//! is in flight awaits the same attempt, so at most one portal session is
//! ever created per successful connection. A failed attempt leaves the client
//! disconnected and the next caller starts over.

use super::events::ShortcutEvents;
use super::request::{HandleKind, Requester, PORTAL_PATH, PORTAL_SERVICE};
use super::{SESSION_INTERFACE, SHORTCUTS_INTERFACE};
use crate::bus::{Arg, Bus, CallBody, MethodCall, Options, SignalBody, SignalFilter};
use crate::config::PortalConfig;
use crate::error::{Error, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// A shortcut the application asks the portal to bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutDescriptor {
    pub id: String,
    pub description: String,
}

impl ShortcutDescriptor {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// A live portal session.
struct PortalSession {
    handle: String,
    version: u32,
    /// Forwards `Activated` signals for this session to the local listeners
    forwarder: JoinHandle<()>,
}

impl Drop for PortalSession {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

type Attempt = Shared<BoxFuture<'static, std::result::Result<Arc<PortalSession>, Arc<Error>>>>;

enum Slot {
    Idle,
    Pending { attempt: u64, future: Attempt },
    Ready(Arc<PortalSession>),
    Failed,
}

struct Inner {
    requests: Requester,
    events: ShortcutEvents,
    slot: Mutex<Slot>,
    next_attempt: AtomicU64,
}

/// Client for the GlobalShortcuts portal.
///
/// Cloning yields another handle to the same client and session.
#[derive(Clone)]
pub struct GlobalShortcuts {
    inner: Arc<Inner>,
}

impl GlobalShortcuts {
    /// Create a client that talks to the portal over `bus`.
    ///
    /// Nothing is sent until the first call that needs a session.
    pub fn new(bus: Arc<dyn Bus>, config: &PortalConfig) -> Self {
        let requests =
            Requester::new(bus, config.token_prefix.clone()).with_timeout(config.request_timeout());
        Self {
            inner: Arc::new(Inner {
                requests,
                events: ShortcutEvents::new(),
                slot: Mutex::new(Slot::Idle),
                next_attempt: AtomicU64::new(0),
            }),
        }
    }

    /// Connect if necessary and report whether a portal session exists.
    pub async fn is_available(&self) -> bool {
        match self.connect().await {
            Ok(_) => true,
            Err(e) => {
                debug!("GlobalShortcuts portal unavailable: {}", e);
                false
            }
        }
    }

    /// Protocol version reported by the portal, 0 when not connected.
    pub fn version(&self) -> u32 {
        match &*self.inner.slot.lock() {
            Slot::Ready(session) => session.version,
            _ => 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &*self.inner.slot.lock() {
            Slot::Idle => ConnectionState::Disconnected,
            Slot::Pending { .. } => ConnectionState::Connecting,
            Slot::Ready(_) => ConnectionState::Connected,
            Slot::Failed => ConnectionState::Failed,
        }
    }

    /// Object path of the live session, if connected.
    pub fn session_handle(&self) -> Option<String> {
        match &*self.inner.slot.lock() {
            Slot::Ready(session) => Some(session.handle.clone()),
            _ => None,
        }
    }

    /// Listeners for `ShortcutActivated`, keyed by shortcut id.
    pub fn events(&self) -> &ShortcutEvents {
        &self.inner.events
    }

    /// Ask the portal to bind `shortcuts` to the session.
    ///
    /// If no session can be established this returns `Ok(())` without
    /// sending anything; call [`GlobalShortcuts::is_available`] first to
    /// tell the two apart.
    ///
    /// # Errors
    ///
    /// Fails if the bind request itself fails: the call is rejected, the
    /// portal answers with something other than `Response`, the response
    /// code is non-zero, or the request times out. The session stays
    /// connected in every case.
    pub async fn bind_shortcuts(&self, shortcuts: &[ShortcutDescriptor]) -> Result<()> {
        let session = match self.connect().await {
            Ok(session) => session,
            Err(e) => {
                debug!("Skipping shortcut bind, portal not connected: {}", e);
                return Ok(());
            }
        };

        let entries: Vec<(String, Options)> = shortcuts
            .iter()
            .map(|shortcut| {
                let mut props = Options::new();
                props.insert(
                    "description".to_string(),
                    Arg::from(shortcut.description.as_str()),
                );
                (shortcut.id.clone(), props)
            })
            .collect();

        let bus = self.inner.requests.bus().clone();
        let session_handle = session.handle.clone();
        let result = self
            .inner
            .requests
            .make_request(move |request| async move {
                let mut options = Options::new();
                options.insert("handle_token".to_string(), Arg::from(request.token));
                bus.call(MethodCall::new(
                    PORTAL_SERVICE,
                    PORTAL_PATH,
                    SHORTCUTS_INTERFACE,
                    "BindShortcuts",
                    CallBody::BindShortcuts {
                        session_handle,
                        shortcuts: entries,
                        parent_window: String::new(),
                        options,
                    },
                ))
                .await
            })
            .await
            .and_then(|response| response.into_result());

        match result {
            Ok(_) => {
                info!(
                    "Bound {} shortcut(s) on {}",
                    shortcuts.len(),
                    session.handle
                );
                Ok(())
            }
            Err(e) => {
                error!("BindShortcuts failed: {}", e);
                Err(e)
            }
        }
    }

    /// Close the portal session and return to the disconnected state.
    ///
    /// A no-op when no session exists. The next call that needs the portal
    /// creates a new session.
    pub async fn close(&self) -> Result<()> {
        let session = {
            let mut slot = self.inner.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Ready(session) => session,
                other => {
                    *slot = other;
                    return Ok(());
                }
            }
        };
        session.forwarder.abort();

        info!("Closing portal session {}", session.handle);
        self.inner
            .requests
            .bus()
            .call(MethodCall::new(
                PORTAL_SERVICE,
                session.handle.as_str(),
                SESSION_INTERFACE,
                "Close",
                CallBody::Empty,
            ))
            .await
    }

    async fn connect(&self) -> Result<Arc<PortalSession>> {
        let (attempt, future) = {
            let mut slot = self.inner.slot.lock();
            match &*slot {
                Slot::Ready(session) => return Ok(session.clone()),
                Slot::Pending { attempt, future } => (*attempt, future.clone()),
                Slot::Idle | Slot::Failed => {
                    let attempt = self.inner.next_attempt.fetch_add(1, Ordering::Relaxed);
                    debug!("Starting portal connection attempt {}", attempt);
                    let inner = self.inner.clone();
                    let future = async move {
                        establish(&inner).await.map(Arc::new).map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *slot = Slot::Pending {
                        attempt,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let outcome = future.await;

        {
            let mut slot = self.inner.slot.lock();
            // close() or a newer attempt may have replaced the slot meanwhile
            if matches!(&*slot, Slot::Pending { attempt: current, .. } if *current == attempt) {
                *slot = match &outcome {
                    Ok(session) => Slot::Ready(session.clone()),
                    Err(_) => Slot::Failed,
                };
            }
        }

        outcome.map_err(|e| match e.as_ref() {
            Error::ConnectionFailure(msg) => Error::ConnectionFailure(msg.clone()),
            Error::ProtocolViolation(msg) => Error::ProtocolViolation(msg.clone()),
            other => Error::ConnectionFailure(other.to_string()),
        })
    }
}

/// Read the portal version, create a session and start forwarding
/// activations.
async fn establish(inner: &Inner) -> Result<PortalSession> {
    let bus = inner.requests.bus().clone();

    let version = bus
        .get_property(PORTAL_SERVICE, PORTAL_PATH, SHORTCUTS_INTERFACE, "version")
        .await
        .map_err(|e| {
            warn!("Failed to connect to GlobalShortcuts portal: {}", e);
            Error::ConnectionFailure(e.to_string())
        })?
        .as_u32()
        .ok_or_else(|| {
            Error::ProtocolViolation("GlobalShortcuts version is not a u32".to_string())
        })?;
    debug!("GlobalShortcuts portal version {}", version);

    let session = inner.requests.generate_handle(HandleKind::Session);
    let session_token = session.token.clone();
    let call_bus = bus.clone();
    let results = inner
        .requests
        .make_request(move |request| async move {
            let mut options = Options::new();
            options.insert("handle_token".to_string(), Arg::from(request.token));
            options.insert("session_handle_token".to_string(), Arg::from(session_token));
            call_bus
                .call(MethodCall::new(
                    PORTAL_SERVICE,
                    PORTAL_PATH,
                    SHORTCUTS_INTERFACE,
                    "CreateSession",
                    CallBody::Options(options),
                ))
                .await
        })
        .await?
        .into_result()?;

    let handle = results
        .get("session_handle")
        .and_then(Arg::as_str)
        .map(str::to_string)
        .unwrap_or(session.path);

    let mut activations = bus.subscribe(
        SignalFilter::new()
            .interface(SHORTCUTS_INTERFACE)
            .member("Activated"),
    );
    let events = inner.events.clone();
    let own_handle = handle.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(signal) = activations.recv().await {
            match signal.body {
                SignalBody::Activated {
                    session_handle,
                    shortcut_id,
                    ..
                } if session_handle == own_handle => events.emit(&shortcut_id),
                SignalBody::Activated { session_handle, .. } => {
                    trace!("Ignoring activation for session {}", session_handle)
                }
                _ => {}
            }
        }
    });

    info!("Portal session {} established (version {})", handle, version);
    Ok(PortalSession {
        handle,
        version,
        forwarder,
    })
}
