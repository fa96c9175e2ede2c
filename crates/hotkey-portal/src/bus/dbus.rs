//! Session-bus implementation of [`Bus`] on top of `zbus`.

use super::{
    Arg, Bus, CallBody, MethodCall, Options, Signal, SignalBody, SignalFilter, SignalHub,
    Subscription,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::message::Type as MessageType;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};
use zbus::{Connection, MatchRule, Message, MessageStream};

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// A session-bus connection that forwards signals from one service to
/// subscribers.
///
/// The connection is created once and lives as long as this value; it is
/// never re-established behind the caller's back.
pub struct ZbusBus {
    connection: Connection,
    hub: SignalHub,
    pump: JoinHandle<()>,
}

impl ZbusBus {
    /// Connect to the session bus and watch signals sent by `service`.
    pub async fn session(service: &str) -> Result<Self> {
        let connection = Connection::session().await?;
        Self::with_connection(connection, service).await
    }

    /// Wrap an existing connection and watch signals sent by `service`.
    pub async fn with_connection(connection: Connection, service: &str) -> Result<Self> {
        let rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(service)?
            .build();
        let mut stream = MessageStream::for_match_rule(rule, &connection, None).await?;

        let hub = SignalHub::new();
        let pump_hub = hub.clone();
        let pump = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(message) => {
                        if let Some(signal) = decode_signal(&message) {
                            pump_hub.dispatch(&signal);
                        }
                    }
                    Err(e) => warn!("Dropping undecodable bus message: {}", e),
                }
            }
            debug!("Signal stream ended");
        });

        info!(
            "Connected to session bus as {}",
            connection
                .unique_name()
                .map(|n| n.to_string())
                .unwrap_or_default()
        );

        Ok(Self {
            connection,
            hub,
            pump,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl Drop for ZbusBus {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
impl Bus for ZbusBus {
    fn unique_name(&self) -> String {
        self.connection
            .unique_name()
            .map(|n| n.to_string())
            .unwrap_or_default()
    }

    async fn call(&self, call: MethodCall) -> Result<()> {
        let MethodCall {
            destination,
            path,
            interface,
            member,
            body,
        } = call;
        debug!("Calling {}.{} on {}", interface, member, path);

        let destination = Some(destination.as_str());
        let interface = Some(interface.as_str());
        match body {
            CallBody::Empty => {
                self.connection
                    .call_method(destination, path.as_str(), interface, member.as_str(), &())
                    .await?;
            }
            CallBody::Options(options) => {
                let options = to_values(&options)?;
                self.connection
                    .call_method(
                        destination,
                        path.as_str(),
                        interface,
                        member.as_str(),
                        &(options,),
                    )
                    .await?;
            }
            CallBody::BindShortcuts {
                session_handle,
                shortcuts,
                parent_window,
                options,
            } => {
                let session = ObjectPath::try_from(session_handle.as_str())?;
                let mut entries = Vec::with_capacity(shortcuts.len());
                for (id, props) in &shortcuts {
                    entries.push((id.as_str(), to_values(props)?));
                }
                let options = to_values(&options)?;
                self.connection
                    .call_method(
                        destination,
                        path.as_str(),
                        interface,
                        member.as_str(),
                        &(session, entries, parent_window.as_str(), options),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn get_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<Arg> {
        let reply = self
            .connection
            .call_method(
                Some(destination),
                path,
                Some(PROPERTIES_INTERFACE),
                "Get",
                &(interface, property),
            )
            .await?;
        let value: OwnedValue = reply.body().deserialize()?;
        Ok(arg_from_value(&value))
    }

    fn subscribe(&self, filter: SignalFilter) -> Subscription {
        self.hub.subscribe(filter)
    }
}

fn to_values(options: &Options) -> Result<HashMap<&str, Value<'_>>> {
    let mut values = HashMap::with_capacity(options.len());
    for (key, arg) in options {
        let value = match arg {
            Arg::Str(s) => Value::from(s.as_str()),
            Arg::ObjectPath(p) => Value::from(ObjectPath::try_from(p.as_str())?),
            Arg::U32(v) => Value::from(*v),
            Arg::U64(v) => Value::from(*v),
            Arg::Bool(v) => Value::from(*v),
            Arg::Other => {
                return Err(Error::Serialization(format!(
                    "option {key} has no wire representation"
                )))
            }
        };
        values.insert(key.as_str(), value);
    }
    Ok(values)
}

fn arg_from_value(value: &Value<'_>) -> Arg {
    match value {
        Value::Str(s) => Arg::Str(s.to_string()),
        Value::ObjectPath(p) => Arg::ObjectPath(p.to_string()),
        Value::U32(v) => Arg::U32(*v),
        Value::U64(v) => Arg::U64(*v),
        Value::Bool(v) => Arg::Bool(*v),
        Value::Value(inner) => arg_from_value(inner),
        _ => Arg::Other,
    }
}

fn options_from_values(values: &HashMap<String, OwnedValue>) -> Options {
    values
        .iter()
        .map(|(k, v)| (k.clone(), arg_from_value(v)))
        .collect()
}

fn decode_signal(message: &Message) -> Option<Signal> {
    let header = message.header();
    if header.message_type() != MessageType::Signal {
        return None;
    }
    let path = header.path()?.to_string();
    let member = header.member()?.to_string();
    let interface = header.interface().map(|i| i.to_string());

    let body = match member.as_str() {
        "Response" => message
            .body()
            .deserialize::<(u32, HashMap<String, OwnedValue>)>()
            .map(|(code, results)| SignalBody::Response {
                code,
                results: options_from_values(&results),
            })
            .unwrap_or(SignalBody::Other),
        "Activated" => message
            .body()
            .deserialize::<(OwnedObjectPath, String, u64, HashMap<String, OwnedValue>)>()
            .map(|(session, shortcut_id, timestamp, _)| SignalBody::Activated {
                session_handle: session.to_string(),
                shortcut_id,
                timestamp,
            })
            .unwrap_or(SignalBody::Other),
        _ => SignalBody::Other,
    };

    Some(Signal {
        path,
        interface,
        member,
        body,
    })
}
