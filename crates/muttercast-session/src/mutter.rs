//! zbus implementation of the seam traits against Mutter's ScreenCast API.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use muttercast_core::{CaptureTarget, CursorMode, NegotiationError};
use tracing::{debug, error, info, warn};
use zbus::message::Type as MessageType;
use zbus::zvariant::{OwnedObjectPath, Value};
use zbus::{Connection, MatchRule, MessageStream};

use crate::{CaptureSession, SessionConnector, SessionEvent};

const BUS_NAME: &str = "org.gnome.Mutter.ScreenCast";
const OBJECT_PATH: &str = "/org/gnome/Mutter/ScreenCast";
const SCREENCAST_IFACE: &str = "org.gnome.Mutter.ScreenCast";
const SESSION_IFACE: &str = "org.gnome.Mutter.ScreenCast.Session";
const STREAM_IFACE: &str = "org.gnome.Mutter.ScreenCast.Stream";

/// How many signal messages a subscription may queue before the bus
/// connection applies backpressure.
const SIGNAL_QUEUE: usize = 4;

/// Connect to the session bus.
pub async fn session_bus() -> Result<Connection, NegotiationError> {
    Connection::session()
        .await
        .map_err(|e| NegotiationError::Connect { reason: e.to_string() })
}

// ── D-Bus helpers ─────────────────────────────────────────────────────────────

async fn remote_call<B>(
    connection: &Connection,
    path: &str,
    interface: &str,
    method: &'static str,
    body: &B,
) -> Result<zbus::Message, NegotiationError>
where
    B: serde::ser::Serialize + zbus::zvariant::DynamicType,
{
    connection
        .call_method(Some(BUS_NAME), path, Some(interface), method, body)
        .await
        .map_err(|e| {
            error!("{} failed: {}", method, e);
            NegotiationError::RemoteCall { method, reason: e.to_string() }
        })
}

async fn remote_call_path<B>(
    connection: &Connection,
    path: &str,
    interface: &str,
    method: &'static str,
    body: &B,
) -> Result<OwnedObjectPath, NegotiationError>
where
    B: serde::ser::Serialize + zbus::zvariant::DynamicType,
{
    remote_call(connection, path, interface, method, body)
        .await?
        .body()
        .deserialize()
        .map_err(|e| NegotiationError::MalformedReply { method, reason: e.to_string() })
}

/// Subscribe to one signal on one object. Dropping the returned stream
/// removes the match rule from the bus.
async fn subscribe(
    connection: &Connection,
    interface: &'static str,
    member: &'static str,
    path: &str,
) -> Result<MessageStream, NegotiationError> {
    let wrap = |e: zbus::Error| NegotiationError::RemoteCall {
        method: "AddMatch",
        reason: e.to_string(),
    };
    let rule = MatchRule::builder()
        .msg_type(MessageType::Signal)
        .interface(interface)
        .map_err(|e| wrap(e.into()))?
        .member(member)
        .map_err(|e| wrap(e.into()))?
        .path(path)
        .map_err(|e| wrap(e.into()))?
        .build();
    MessageStream::for_match_rule(rule, connection, Some(SIGNAL_QUEUE))
        .await
        .map_err(wrap)
}

// ── MutterConnector ───────────────────────────────────────────────────────────

/// Creates Mutter ScreenCast sessions on the session bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutterConnector;

impl MutterConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl SessionConnector for MutterConnector {
    type Session = MutterSession;

    async fn create_session(&mut self) -> Result<MutterSession, NegotiationError> {
        let connection = session_bus().await?;

        // Some Mutter revisions reject a missing options dict.
        let mut options: HashMap<&str, Value<'_>> = HashMap::new();
        options.insert("dummy", Value::I32(0));

        let session_path = remote_call_path(
            &connection,
            OBJECT_PATH,
            SCREENCAST_IFACE,
            "CreateSession",
            &(options,),
        )
        .await?;
        debug!(session = %session_path, "screencast session created");

        let closed_rx =
            subscribe(&connection, SESSION_IFACE, "Closed", session_path.as_str()).await?;

        Ok(MutterSession {
            connection,
            session_path,
            stream_path: None,
            closed_rx,
            stream_added_rx: None,
            closed: false,
        })
    }
}

// ── MutterSession ─────────────────────────────────────────────────────────────

/// An open ScreenCast session. Signal subscriptions are released on drop.
pub struct MutterSession {
    connection: Connection,
    session_path: OwnedObjectPath,
    stream_path: Option<OwnedObjectPath>,
    closed_rx: MessageStream,
    stream_added_rx: Option<MessageStream>,
    closed: bool,
}

impl MutterSession {
    /// Object path of the remote session.
    pub fn path(&self) -> &str {
        self.session_path.as_str()
    }

    /// Object path of the stream, once `record` has been accepted.
    pub fn stream_path(&self) -> Option<&str> {
        self.stream_path.as_ref().map(|p| p.as_str())
    }
}

enum Incoming {
    Closed(Option<Result<zbus::Message, zbus::Error>>),
    Added(Option<Result<zbus::Message, zbus::Error>>),
}

#[async_trait(?Send)]
impl CaptureSession for MutterSession {
    async fn record(
        &mut self,
        target: &CaptureTarget,
        cursor: CursorMode,
    ) -> Result<(), NegotiationError> {
        let mut properties: HashMap<&str, Value<'_>> = HashMap::new();
        properties.insert("cursor-mode", Value::U32(cursor.to_wire()));

        let stream_path = match target {
            CaptureTarget::Monitor { connector } => {
                remote_call_path(
                    &self.connection,
                    self.session_path.as_str(),
                    SESSION_IFACE,
                    "RecordMonitor",
                    &(connector.as_str(), properties),
                )
                .await?
            }
            // Mutter resolves an empty connector to the primary monitor.
            CaptureTarget::Desktop => {
                remote_call_path(
                    &self.connection,
                    self.session_path.as_str(),
                    SESSION_IFACE,
                    "RecordMonitor",
                    &("", properties),
                )
                .await?
            }
            CaptureTarget::Window { id } => {
                properties.insert("window-id", Value::U64(*id));
                remote_call_path(
                    &self.connection,
                    self.session_path.as_str(),
                    SESSION_IFACE,
                    "RecordWindow",
                    &(properties,),
                )
                .await?
            }
        };
        info!(stream = %stream_path, "record request accepted");

        // Subscribe before Start so the node announcement cannot be missed.
        self.stream_added_rx = Some(
            subscribe(
                &self.connection,
                STREAM_IFACE,
                "PipeWireStreamAdded",
                stream_path.as_str(),
            )
            .await?,
        );
        self.stream_path = Some(stream_path);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), NegotiationError> {
        remote_call(
            &self.connection,
            self.session_path.as_str(),
            SESSION_IFACE,
            "Start",
            &(),
        )
        .await?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), NegotiationError> {
        if self.closed {
            debug!(session = %self.session_path, "stop on closed session ignored");
            return Ok(());
        }
        // The remote object is gone after Stop either way.
        self.closed = true;
        remote_call(
            &self.connection,
            self.session_path.as_str(),
            SESSION_IFACE,
            "Stop",
            &(),
        )
        .await?;
        Ok(())
    }

    async fn next_event(&mut self) -> SessionEvent {
        if self.closed {
            return std::future::pending().await;
        }
        loop {
            let incoming = match self.stream_added_rx.as_mut() {
                Some(added) => tokio::select! {
                    m = self.closed_rx.next() => Incoming::Closed(m),
                    m = added.next() => Incoming::Added(m),
                },
                None => Incoming::Closed(self.closed_rx.next().await),
            };

            match incoming {
                // A dead signal stream means the bus connection is gone,
                // which ends the session just as surely as Closed.
                Incoming::Closed(Some(Ok(_))) | Incoming::Closed(None) => {
                    self.closed = true;
                    return SessionEvent::Closed;
                }
                Incoming::Added(Some(Ok(message))) => {
                    match message.body().deserialize::<u32>() {
                        Ok(node_id) => return SessionEvent::StreamAdded { node_id },
                        Err(e) => warn!("malformed PipeWireStreamAdded: {}", e),
                    }
                }
                Incoming::Added(None) => self.stream_added_rx = None,
                Incoming::Closed(Some(Err(e))) | Incoming::Added(Some(Err(e))) => {
                    warn!("signal stream error: {}", e);
                }
            }
        }
    }
}
