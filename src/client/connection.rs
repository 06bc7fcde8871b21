//! WebSocket connection to the chat transport.
//!
//! A [`Connection`] is an explicit handle: nothing is global, it is opened
//! with [`Connection::connect`] and closed with [`Connection::disconnect`]. One
//! background task owns the socket; [`Subscription`]s talk to it through a
//! command channel and receive messages and lifecycle updates back.

use futures::{stream::SplitSink, SinkExt, Stream, StreamExt};
use std::{
    collections::HashMap,
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll},
};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{
        mpsc::{self, error::SendError},
        watch,
    },
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::view::{SubscriptionState, Transition};
use crate::{
    broadcast::{BroadcastEvent, MESSAGE_SENT},
    channel::{Identity, USER_ID_HEADER},
    message::ChatMessage,
    protocol::{ClientFrame, ServerFrame},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("not joined: {0}")]
    NotJoined(String),
    #[error("connection closed")]
    Closed,
}

/// Latest state of one subscription, plus why it last failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub state: SubscriptionState,
    pub error: Option<String>,
}

enum Command {
    Subscribe { channel: String, local: Local },
    Leave { channel: String, id: u64 },
    Disconnect,
}

/// Driver-side end of a [`Subscription`].
struct Local {
    id: u64,
    events: mpsc::UnboundedSender<ChatMessage>,
    lifecycle: watch::Sender<Lifecycle>,
}

impl Local {
    fn update(&self, transition: Transition, error: Option<&str>) {
        self.lifecycle.send_modify(|lifecycle| {
            lifecycle.state = lifecycle.state.apply(transition);
            if let Some(error) = error {
                lifecycle.error = Some(error.to_owned());
            }
        });
    }
}

pub struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    driver: JoinHandle<()>,
    next_subscription: AtomicU64,
}

impl Connection {
    /// Opens the socket. `identity` is presented on the handshake for private channels.
    pub async fn connect(url: &str, identity: Option<Identity>) -> Result<Self, TransportError> {
        let mut request = url.into_client_request()?;
        if let Some(identity) = identity {
            request
                .headers_mut()
                .insert(USER_ID_HEADER, HeaderValue::from(identity.id));
        }

        let (socket, _) = connect_async(request).await?;
        info!(url, "connected to chat transport");

        let (commands, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(socket, rx));

        Ok(Self {
            commands,
            driver,
            next_subscription: AtomicU64::new(0),
        })
    }

    /// Joins `channel`. The returned subscription starts out `Joining`.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (lifecycle_tx, lifecycle) = watch::channel(Lifecycle {
            state: SubscriptionState::Disconnected.apply(Transition::Join),
            error: None,
        });

        let command = Command::Subscribe {
            channel: channel.to_owned(),
            local: Local {
                id,
                events: events_tx,
                lifecycle: lifecycle_tx,
            },
        };

        if let Err(SendError(Command::Subscribe { local, .. })) = self.commands.send(command) {
            local.update(Transition::Error, Some("connection closed"));
        }

        Subscription {
            channel: channel.to_owned(),
            id,
            events,
            lifecycle,
            commands: self.commands.clone(),
        }
    }

    /// Leaves every channel and closes the socket.
    pub async fn disconnect(self) {
        let _ = self.commands.send(Command::Disconnect);

        if let Err(error) = self.driver.await {
            warn!(%error, "connection task failed");
        }
    }
}

/// One join of one channel.
///
/// Yields every `MessageSent` payload received after the join, in arrival
/// order. The stream ends when the subscription is refused, left, or the
/// connection goes away, and it cannot be restarted: join again instead.
/// Dropping the subscription leaves the channel.
pub struct Subscription {
    channel: String,
    id: u64,
    events: mpsc::UnboundedReceiver<ChatMessage>,
    lifecycle: watch::Receiver<Lifecycle>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn next_message(&mut self) -> Option<ChatMessage> {
        self.events.recv().await
    }

    /// A stream of lifecycle changes, independent of the message stream.
    pub fn lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.clone()
    }

    pub fn state(&self) -> SubscriptionState {
        self.lifecycle.borrow().state
    }

    /// Waits for the join handshake to finish.
    pub async fn joined(&mut self) -> Result<(), TransportError> {
        let lifecycle = self
            .lifecycle
            .wait_for(|lifecycle| lifecycle.state != SubscriptionState::Joining)
            .await
            .map_err(|_| TransportError::Closed)?
            .clone();

        match lifecycle.state {
            SubscriptionState::Connected => Ok(()),
            _ => Err(TransportError::NotJoined(
                lifecycle
                    .error
                    .unwrap_or_else(|| String::from("subscription ended")),
            )),
        }
    }

    /// Leaves the channel. Same as dropping the subscription.
    pub fn leave(self) {}
}

impl Stream for Subscription {
    type Item = ChatMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Leave {
            channel: self.channel.clone(),
            id: self.id,
        });
    }
}

#[derive(Default)]
struct Subscribers {
    /// The server acknowledged the join; events are only delivered after that.
    confirmed: bool,
    locals: Vec<Local>,
}

struct Driver {
    sink: SplitSink<Socket, Message>,
    channels: HashMap<String, Subscribers>,
    /// Subscribe frames per channel the server has not answered yet. Only the
    /// answer to the latest one settles the channel's current join.
    awaiting: HashMap<String, usize>,
}

async fn drive(socket: Socket, mut commands: mpsc::UnboundedReceiver<Command>) {
    let (sink, mut stream) = socket.split();
    let mut driver = Driver {
        sink,
        channels: HashMap::new(),
        awaiting: HashMap::new(),
    };

    let outcome = loop {
        let step = tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Subscribe { channel, local }) => driver.subscribe(channel, local).await,
                Some(Command::Leave { channel, id }) => driver.leave(&channel, id).await,
                Some(Command::Disconnect) | None => break Ok(()),
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => driver.handle_text(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break Err(TransportError::Closed),
                Some(Ok(_)) => Ok(()),
                Some(Err(error)) => break Err(TransportError::from(error)),
            },
        };

        if let Err(error) = step {
            break Err(error);
        }
    };

    match outcome {
        Ok(()) => {
            driver.leave_all();
            let _ = driver.sink.send(Message::Close(None)).await;
            info!("disconnected from chat transport");
        }
        Err(error) => {
            warn!(%error, "chat transport lost");
            driver.fail_all(&error.to_string());
        }
    }
}

impl Driver {
    async fn subscribe(&mut self, channel: String, local: Local) -> Result<(), TransportError> {
        let subscribers = self.channels.entry(channel.clone()).or_default();
        let first = subscribers.locals.is_empty();

        if subscribers.confirmed {
            local.update(Transition::Subscribed, None);
        }
        subscribers.locals.push(local);

        if first {
            *self.awaiting.entry(channel.clone()).or_default() += 1;
            self.send(&ClientFrame::Subscribe { channel }).await?;
        }

        Ok(())
    }

    async fn leave(&mut self, channel: &str, id: u64) -> Result<(), TransportError> {
        let Some(subscribers) = self.channels.get_mut(channel) else {
            return Ok(());
        };

        if let Some(position) = subscribers.locals.iter().position(|local| local.id == id) {
            subscribers.locals.remove(position).update(Transition::Leave, None);
        }

        if subscribers.locals.is_empty() {
            self.channels.remove(channel);
            self.send(&ClientFrame::Unsubscribe {
                channel: channel.to_owned(),
            })
            .await?;
            debug!(channel, "left channel");
        }

        Ok(())
    }

    async fn handle_text(&mut self, text: &str) -> Result<(), TransportError> {
        let frame = match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "unreadable frame from server");
                return Ok(());
            }
        };

        match frame {
            ServerFrame::ConnectionEstablished { socket_id } => {
                debug!(%socket_id, "connection established");
            }
            ServerFrame::SubscriptionSucceeded { channel } => {
                if !self.settle(&channel) {
                    return Ok(());
                }
                if let Some(subscribers) = self.channels.get_mut(&channel) {
                    subscribers.confirmed = true;
                    for local in &subscribers.locals {
                        local.update(Transition::Subscribed, None);
                    }
                    info!(channel, "subscribed");
                }
            }
            ServerFrame::SubscriptionError { channel, error } => {
                if !self.settle(&channel) {
                    return Ok(());
                }
                if let Some(subscribers) = self.channels.remove(&channel) {
                    warn!(channel, error, "subscription refused");
                    for local in &subscribers.locals {
                        local.update(Transition::Error, Some(&error));
                    }
                }
            }
            ServerFrame::Event(event) => self.dispatch(event).await?,
            ServerFrame::Error { message } => warn!(reason = %message, "server reported an error"),
        }

        Ok(())
    }

    /// Counts one reply to a subscribe frame. Returns true when it answers the
    /// most recent one; earlier replies belong to joins already abandoned.
    fn settle(&mut self, channel: &str) -> bool {
        match self.awaiting.get_mut(channel) {
            Some(pending) if *pending > 1 => {
                *pending -= 1;
                debug!(channel, "ignoring reply to an abandoned join");
                false
            }
            Some(_) => {
                self.awaiting.remove(channel);
                true
            }
            None => false,
        }
    }

    async fn dispatch(&mut self, event: BroadcastEvent) -> Result<(), TransportError> {
        let Some(subscribers) = self.channels.get_mut(&event.channel) else {
            return Ok(());
        };

        if !subscribers.confirmed {
            return Ok(());
        }

        if event.event != MESSAGE_SENT {
            debug!(channel = %event.channel, event = %event.event, "ignoring unknown event");
            return Ok(());
        }

        subscribers
            .locals
            .retain(|local| local.events.send(event.data.clone()).is_ok());

        if subscribers.locals.is_empty() {
            self.channels.remove(&event.channel);
            self.send(&ClientFrame::Unsubscribe {
                channel: event.channel,
            })
            .await?;
        }

        Ok(())
    }

    fn leave_all(&mut self) {
        self.awaiting.clear();
        for (_, subscribers) in self.channels.drain() {
            for local in &subscribers.locals {
                local.update(Transition::Leave, None);
            }
        }
    }

    fn fail_all(&mut self, reason: &str) {
        self.awaiting.clear();
        for (_, subscribers) in self.channels.drain() {
            for local in &subscribers.locals {
                local.update(Transition::Error, Some(reason));
            }
        }
    }

    async fn send(&mut self, frame: &ClientFrame) -> Result<(), TransportError> {
        let text = serde_json::to_string(frame)?;
        self.sink.send(Message::Text(text.into())).await?;

        Ok(())
    }
}
