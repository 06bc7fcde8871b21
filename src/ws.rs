use crate::{
    broadcast::{BroadcastEvent, EventReceiver},
    channel::{Identity, USER_ID_HEADER},
    protocol::{ClientFrame, ServerFrame},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const OUTBOUND_BUFFER: usize = 64;

pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let identity = identity_from_headers(&headers);

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Reads the identity the authentication layer in front of us attached to the handshake.
pub fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let id = headers.get(USER_ID_HEADER)?.to_str().ok()?.trim().parse().ok()?;

    Some(Identity { id })
}

pub async fn handle_socket(ws: WebSocket, state: AppState, identity: Option<Identity>) {
    let (mut sender, mut receiver) = ws.split();
    let (deliveries, mut pending) = mpsc::channel(OUTBOUND_BUFFER);

    let mut session = Session {
        socket_id: Uuid::new_v4(),
        identity,
        state,
        forwarders: HashMap::new(),
        next_forwarder: 0,
        deliveries,
    };
    let socket_id = session.socket_id;

    info!(%socket_id, user_id = ?identity.map(|i| i.id), "client connected");

    let established = ServerFrame::ConnectionEstablished { socket_id };
    if send_frame(&mut sender, &established).await.is_err() {
        return;
    }

    loop {
        let frame = tokio::select! {
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => session.handle_text(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => None,
                Some(Err(error)) => {
                    debug!(%socket_id, %error, "websocket error");
                    break;
                }
            },
            Some(delivery) = pending.recv() => session.deliver(delivery),
        };

        if let Some(frame) = frame {
            if send_frame(&mut sender, &frame).await.is_err() {
                break;
            }
        }
    }

    session.close().await;
    info!(%socket_id, "client disconnected");
}

struct Forwarder {
    id: u64,
    task: JoinHandle<()>,
}

impl Forwarder {
    /// Cancels the task and waits until its receiver has been dropped.
    async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// An event picked up by one forwarder, tagged so late arrivals from a
/// cancelled subscription can be discarded.
struct Delivery {
    forwarder: u64,
    event: Arc<BroadcastEvent>,
}

struct Session {
    socket_id: Uuid,
    identity: Option<Identity>,
    state: AppState,
    forwarders: HashMap<String, Forwarder>,
    next_forwarder: u64,
    deliveries: mpsc::Sender<Delivery>,
}

impl Session {
    async fn handle_text(&mut self, text: &str) -> Option<ServerFrame> {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(socket_id = %self.socket_id, %error, "invalid frame");
                return Some(ServerFrame::Error {
                    message: format!("invalid frame: {error}"),
                });
            }
        };

        match frame {
            ClientFrame::Subscribe { channel } => Some(self.subscribe(channel)),
            ClientFrame::Unsubscribe { channel } => {
                self.unsubscribe(&channel).await;
                None
            }
        }
    }

    fn subscribe(&mut self, channel: String) -> ServerFrame {
        if self.forwarders.contains_key(&channel) {
            return ServerFrame::SubscriptionSucceeded { channel };
        }

        if let Err(error) = self
            .state
            .channels
            .authorize(&channel, self.identity.as_ref())
        {
            warn!(socket_id = %self.socket_id, channel, %error, "join refused");
            return ServerFrame::SubscriptionError {
                channel,
                error: error.to_string(),
            };
        }

        let rx = self.state.broadcaster.subscribe(&channel);
        let id = self.next_forwarder;
        self.next_forwarder += 1;

        let task = forward(rx, id, self.deliveries.clone(), self.socket_id);
        self.forwarders.insert(channel.clone(), Forwarder { id, task });

        info!(socket_id = %self.socket_id, channel, "joined channel");
        ServerFrame::SubscriptionSucceeded { channel }
    }

    async fn unsubscribe(&mut self, channel: &str) {
        match self.forwarders.remove(channel) {
            Some(forwarder) => {
                forwarder.stop().await;
                self.state.broadcaster.release(channel);
                info!(socket_id = %self.socket_id, channel, "left channel");
            }
            None => debug!(socket_id = %self.socket_id, channel, "unsubscribe from channel not joined"),
        }
    }

    fn deliver(&self, delivery: Delivery) -> Option<ServerFrame> {
        let current = self.forwarders.get(&delivery.event.channel)?;

        (current.id == delivery.forwarder)
            .then(|| ServerFrame::Event(BroadcastEvent::clone(&delivery.event)))
    }

    async fn close(&mut self) {
        for (channel, forwarder) in std::mem::take(&mut self.forwarders) {
            forwarder.stop().await;
            self.state.broadcaster.release(&channel);
        }
    }
}

fn forward(
    mut rx: EventReceiver,
    id: u64,
    deliveries: mpsc::Sender<Delivery>,
    socket_id: Uuid,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if deliveries.send(Delivery { forwarder: id, event }).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%socket_id, skipped, "subscriber lagging, events skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;

    sender.send(Message::Text(text.into())).await
}
