//! Request/response correlation for desktop portal calls.
//!
//! Portal methods return immediately; the real answer arrives later as a
//! `Response` signal on an object path the caller can predict:
//!
//! 1. Generate a handle token and derive the request path from it
//! 2. Subscribe to signals on exactly that path
//! 3. Dispatch the method call with the token in its `handle_token` option
//! 4. Await the first signal on the path, then drop the subscription
//!
//! The subscription is dropped on every exit path (success, protocol error,
//! dispatch failure, timeout), so no listener outlives its request.

use crate::bus::{Bus, Options, SignalBody, SignalFilter};
use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Well-known bus name of the desktop portal
pub const PORTAL_SERVICE: &str = "org.freedesktop.portal.Desktop";
/// Root object path of the desktop portal
pub const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";
pub const REQUEST_INTERFACE: &str = "org.freedesktop.portal.Request";

const RESPONSE_MEMBER: &str = "Response";

/// Disambiguates tokens generated in the same process.
static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// What a generated handle will name on the portal side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Request,
    Session,
}

impl HandleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HandleKind::Request => "request",
            HandleKind::Session => "session",
        }
    }
}

/// A handle token and the object path the portal derives from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub token: String,
    pub path: String,
}

/// The payload of a portal `Response` signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// 0 = success, 1 = cancelled by the user, 2 = other failure
    pub code: u32,
    pub results: Options,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// The results on success, `RequestFailed` otherwise.
    pub fn into_result(self) -> Result<Options> {
        if self.is_success() {
            Ok(self.results)
        } else {
            Err(Error::RequestFailed { code: self.code })
        }
    }
}

/// Turn a connection's unique name into a legal object path element.
///
/// `:1.42` becomes `1_42`.
pub fn sanitize_sender(unique_name: &str) -> String {
    unique_name.trim_start_matches(':').replace('.', "_")
}

/// Issues portal requests and correlates their responses.
pub struct Requester {
    bus: Arc<dyn Bus>,
    token_prefix: String,
    timeout: Option<Duration>,
}

impl Requester {
    /// Create a requester whose tokens start with `token_prefix`.
    ///
    /// Characters that are not legal in an object path element are replaced
    /// with `_`.
    pub fn new(bus: Arc<dyn Bus>, token_prefix: impl Into<String>) -> Self {
        let token_prefix: String = token_prefix
            .into()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Self {
            bus,
            token_prefix,
            timeout: None,
        }
    }

    /// Bound how long [`Requester::make_request`] waits for a response.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Generate a fresh token and the path the portal will use for it.
    pub fn generate_handle(&self, kind: HandleKind) -> Handle {
        let serial = TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed);
        let token = format!(
            "{}_{}_{:08x}",
            self.token_prefix,
            serial,
            rand::random::<u32>()
        );
        let sender = sanitize_sender(&self.bus.unique_name());
        let path = format!("{PORTAL_PATH}/{}/{sender}/{token}", kind.as_str());
        Handle { token, path }
    }

    /// Make a portal request and wait for its response.
    ///
    /// `dispatch` receives the request handle and must issue the actual
    /// method call, passing `handle.token` as the `handle_token` option.
    ///
    /// # Errors
    ///
    /// - whatever `dispatch` returns
    /// - `ProtocolViolation` if the signal on the request path is not a
    ///   well-formed `Response`
    /// - `Timeout` if a timeout is configured and elapses
    /// - `ConnectionFailure` if the bus stops delivering signals
    pub async fn make_request<F, Fut>(&self, dispatch: F) -> Result<Response>
    where
        F: FnOnce(Handle) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let request = self.generate_handle(HandleKind::Request);
        let mut subscription = self
            .bus
            .subscribe(SignalFilter::new().path(request.path.clone()));

        debug!("Dispatching portal request {}", request.path);
        dispatch(request.clone()).await?;

        let received = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, subscription.recv())
                .await
                .map_err(|_| Error::Timeout {
                    path: request.path.clone(),
                    timeout: limit,
                })?,
            None => subscription.recv().await,
        };
        drop(subscription);

        let signal = received.ok_or_else(|| {
            Error::ConnectionFailure(format!("bus closed while waiting on {}", request.path))
        })?;

        if signal.member != RESPONSE_MEMBER {
            warn!(
                "Unexpected portal response {} on {}",
                signal.member, request.path
            );
            return Err(Error::ProtocolViolation(format!(
                "Unexpected portal response: {}",
                signal.member
            )));
        }

        match signal.body {
            SignalBody::Response { code, results } => {
                debug!("Portal request {} answered with code {}", request.path, code);
                Ok(Response { code, results })
            }
            _ => Err(Error::ProtocolViolation(format!(
                "Malformed Response body on {}",
                request.path
            ))),
        }
    }
}
