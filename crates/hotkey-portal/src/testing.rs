//! Scripted stand-ins for the bus and the native registrar.

use crate::bus::{
    Arg, Bus, MethodCall, Options, Signal, SignalBody, SignalFilter, SignalHub, Subscription,
};
use crate::error::{Error, Result};
use crate::native::{HotkeyCallback, NativeRegistrar};
use crate::portal::request::{sanitize_sender, PORTAL_PATH, REQUEST_INTERFACE};
use crate::portal::SHORTCUTS_INTERFACE;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const UNIQUE_NAME: &str = ":1.42";

#[derive(Clone)]
struct Reply {
    member: String,
    code: u32,
    results: Options,
}

struct Script {
    version: Option<Arg>,
    replies: HashMap<String, Reply>,
    silent: HashSet<String>,
    calls: Vec<MethodCall>,
}

/// An in-memory portal.
///
/// Every call carrying a `handle_token` is answered on its request path with
/// `Response` code 0, unless scripted otherwise with [`FakeBus::reply`] or
/// [`FakeBus::silence`].
pub struct FakeBus {
    hub: SignalHub,
    script: Mutex<Script>,
}

impl FakeBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            hub: SignalHub::new(),
            script: Mutex::new(Script {
                version: Some(Arg::U32(1)),
                replies: HashMap::new(),
                silent: HashSet::new(),
                calls: Vec::new(),
            }),
        })
    }

    /// `None` makes the version property read fail like an absent portal.
    pub fn set_version(&self, version: Option<u32>) {
        self.script.lock().version = version.map(Arg::U32);
    }

    /// Report `value` as the version property, whatever its type.
    pub fn set_version_value(&self, value: Arg) {
        self.script.lock().version = Some(value);
    }

    /// Answer `method` with signal `member` and response `code`.
    pub fn reply(&self, method: &str, member: &str, code: u32) {
        self.reply_with(method, member, code, Options::new());
    }

    pub fn reply_with(&self, method: &str, member: &str, code: u32, results: Options) {
        let mut script = self.script.lock();
        script.silent.remove(method);
        script.replies.insert(
            method.to_string(),
            Reply {
                member: member.to_string(),
                code,
                results,
            },
        );
    }

    /// Never answer `method`.
    pub fn silence(&self, method: &str) {
        self.script.lock().silent.insert(method.to_string());
    }

    /// Number of calls made to `member`.
    pub fn calls(&self, member: &str) -> usize {
        self.recorded(member).len()
    }

    pub fn recorded(&self, member: &str) -> Vec<MethodCall> {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|call| call.member == member)
            .cloned()
            .collect()
    }

    pub fn emit(&self, signal: Signal) {
        self.hub.dispatch(&signal);
    }

    /// Emit `GlobalShortcuts.Activated` for `session_handle`.
    pub fn activate(&self, session_handle: &str, shortcut_id: &str) {
        self.emit(Signal {
            path: PORTAL_PATH.to_string(),
            interface: Some(SHORTCUTS_INTERFACE.to_string()),
            member: "Activated".to_string(),
            body: SignalBody::Activated {
                session_handle: session_handle.to_string(),
                shortcut_id: shortcut_id.to_string(),
                timestamp: 0,
            },
        });
    }

    pub fn listener_count(&self) -> usize {
        self.hub.listener_count()
    }
}

#[async_trait]
impl Bus for FakeBus {
    fn unique_name(&self) -> String {
        UNIQUE_NAME.to_string()
    }

    async fn call(&self, call: MethodCall) -> Result<()> {
        let token = call.body.handle_token().map(str::to_string);
        let reply = {
            let mut script = self.script.lock();
            script.calls.push(call.clone());
            if script.silent.contains(&call.member) {
                None
            } else {
                Some(script.replies.get(&call.member).cloned().unwrap_or(Reply {
                    member: "Response".to_string(),
                    code: 0,
                    results: Options::new(),
                }))
            }
        };

        // Let concurrent callers interleave before the answer arrives
        tokio::task::yield_now().await;

        if let (Some(token), Some(reply)) = (token, reply) {
            self.emit(Signal {
                path: format!(
                    "{PORTAL_PATH}/request/{}/{token}",
                    sanitize_sender(UNIQUE_NAME)
                ),
                interface: Some(REQUEST_INTERFACE.to_string()),
                member: reply.member,
                body: SignalBody::Response {
                    code: reply.code,
                    results: reply.results,
                },
            });
        }
        Ok(())
    }

    async fn get_property(
        &self,
        _destination: &str,
        _path: &str,
        _interface: &str,
        property: &str,
    ) -> Result<Arg> {
        tokio::task::yield_now().await;
        let version = self.script.lock().version.clone();
        match (property, version) {
            ("version", Some(version)) => Ok(version),
            _ => Err(Error::Bus(
                "org.freedesktop.DBus.Error.ServiceUnknown".to_string(),
            )),
        }
    }

    fn subscribe(&self, filter: SignalFilter) -> Subscription {
        self.hub.subscribe(filter)
    }
}

/// A native registrar that accepts or rejects on command.
pub struct FakeNative {
    accept: bool,
    registered: Mutex<HashMap<String, HotkeyCallback>>,
    registers: AtomicUsize,
    unregisters: AtomicUsize,
}

impl FakeNative {
    pub fn new(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            accept,
            registered: Mutex::new(HashMap::new()),
            registers: AtomicUsize::new(0),
            unregisters: AtomicUsize::new(0),
        })
    }

    pub fn register_calls(&self) -> usize {
        self.registers.load(Ordering::SeqCst)
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregisters.load(Ordering::SeqCst)
    }

    /// Simulate a key press on `accelerator`. Returns false if nothing is bound.
    pub fn trigger(&self, accelerator: &str) -> bool {
        let callback = self.registered.lock().get(accelerator).cloned();
        match callback {
            Some(callback) => {
                callback(accelerator);
                true
            }
            None => false,
        }
    }
}

impl NativeRegistrar for FakeNative {
    fn register(&self, accelerator: &str, callback: HotkeyCallback) -> Result<()> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        if !self.accept {
            return Err(Error::RegistrationRejected(format!(
                "{accelerator} is bound elsewhere"
            )));
        }
        self.registered
            .lock()
            .insert(accelerator.to_string(), callback);
        Ok(())
    }

    fn unregister(&self, accelerator: &str) -> Result<()> {
        self.unregisters.fetch_add(1, Ordering::SeqCst);
        self.registered.lock().remove(accelerator);
        Ok(())
    }

    fn is_registered(&self, accelerator: &str) -> bool {
        self.registered.lock().contains_key(accelerator)
    }
}
