//! The message-bus seam.
//!
//! Portal code never touches a bus library directly. It talks to a [`Bus`]:
//! issue a method call, read a property, subscribe to inbound signals. The
//! production implementation is [`dbus::ZbusBus`]; tests script a fake.
//!
//! Subscriptions are RAII handles. Dropping a [`Subscription`] removes its
//! listener from the [`SignalHub`], so a listener can never outlive the
//! operation that created it, whatever path that operation exits by.

pub mod dbus;

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// A single dictionary value in a method call or a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Str(String),
    ObjectPath(String),
    U32(u32),
    U64(u64),
    Bool(bool),
    /// A value of a type this crate never inspects
    Other,
}

impl Arg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) | Arg::ObjectPath(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Arg::U32(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<u32> for Arg {
    fn from(v: u32) -> Self {
        Arg::U32(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

/// An `a{sv}` dictionary.
pub type Options = HashMap<String, Arg>;

/// Argument lists for the method calls the portal client issues.
#[derive(Debug, Clone, PartialEq)]
pub enum CallBody {
    /// `()`
    Empty,
    /// `(a{sv})`
    Options(Options),
    /// `(o, a(sa{sv}), s, a{sv})`
    BindShortcuts {
        session_handle: String,
        shortcuts: Vec<(String, Options)>,
        parent_window: String,
        options: Options,
    },
}

impl CallBody {
    /// The `handle_token` option, if this call carries one.
    pub fn handle_token(&self) -> Option<&str> {
        match self {
            CallBody::Options(options) | CallBody::BindShortcuts { options, .. } => {
                options.get("handle_token").and_then(Arg::as_str)
            }
            CallBody::Empty => None,
        }
    }
}

/// An outbound method call, addressed by well-known names.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub body: CallBody,
}

impl MethodCall {
    pub fn new(
        destination: impl Into<String>,
        path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
        body: CallBody,
    ) -> Self {
        Self {
            destination: destination.into(),
            path: path.into(),
            interface: interface.into(),
            member: member.into(),
            body,
        }
    }
}

/// Decoded payload of an inbound signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalBody {
    /// `org.freedesktop.portal.Request.Response (u, a{sv})`
    Response { code: u32, results: Options },
    /// `org.freedesktop.portal.GlobalShortcuts.Activated (o, s, t, a{sv})`
    Activated {
        session_handle: String,
        shortcut_id: String,
        timestamp: u64,
    },
    /// Any other member, or a body that did not decode
    Other,
}

/// An inbound signal as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub path: String,
    pub interface: Option<String>,
    pub member: String,
    pub body: SignalBody,
}

/// Selects which signals a subscription receives. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFilter {
    path: Option<String>,
    interface: Option<String>,
    member: Option<String>,
}

impl SignalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match only signals emitted on exactly this object path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        self.path.as_ref().is_none_or(|p| *p == signal.path)
            && self
                .interface
                .as_ref()
                .is_none_or(|i| signal.interface.as_ref() == Some(i))
            && self.member.as_ref().is_none_or(|m| *m == signal.member)
    }
}

/// Inter-process message bus used to reach the portal.
#[async_trait]
pub trait Bus: Send + Sync {
    /// This connection's unique name, e.g. `:1.42`.
    fn unique_name(&self) -> String;

    /// Issue a method call and wait for the reply (not for any later signal).
    async fn call(&self, call: MethodCall) -> Result<()>;

    /// `org.freedesktop.DBus.Properties.Get(interface, property)` on an object.
    async fn get_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<Arg>;

    /// Start receiving signals that match `filter`.
    fn subscribe(&self, filter: SignalFilter) -> Subscription;
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    listeners: HashMap<u64, (SignalFilter, mpsc::UnboundedSender<Signal>)>,
}

/// Fan-out of inbound signals to filtered listeners.
///
/// Bus implementations feed every received signal to [`SignalHub::dispatch`]
/// and hand out subscriptions from [`SignalHub::subscribe`].
#[derive(Clone, Default)]
pub struct SignalHub {
    state: Arc<Mutex<HubState>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, filter: SignalFilter) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        trace!("Adding signal listener {} for {:?}", id, filter);
        state.listeners.insert(id, (filter, tx));
        Subscription {
            id,
            rx,
            hub: self.clone(),
        }
    }

    /// Deliver `signal` to every listener whose filter matches it.
    pub fn dispatch(&self, signal: &Signal) {
        let state = self.state.lock();
        for (filter, tx) in state.listeners.values() {
            if filter.matches(signal) {
                // A closed receiver is removed by its Subscription's drop
                let _ = tx.send(signal.clone());
            }
        }
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    fn remove(&self, id: u64) {
        if self.state.lock().listeners.remove(&id).is_some() {
            trace!("Removed signal listener {}", id);
        }
    }
}

/// A live signal listener. Dropping it detaches the listener.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Signal>,
    hub: SignalHub,
}

impl Subscription {
    /// Wait for the next matching signal. `None` once the bus has gone away.
    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(self.id);
    }
}
