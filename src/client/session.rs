//! Terminal front-end: renders the `messages` channel and sends stdin lines.

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::{
    api::{websocket_url, ApiError, MessagesApi},
    connection::Connection,
    view::ChatView,
};
use crate::{
    channel::{Identity, MESSAGES_CHANNEL},
    config::ClientConfig,
    message::ChatMessage,
};

pub async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let api = MessagesApi::new(&config.server);
    let identity = config.user_id.map(|id| Identity { id });
    let connection = Connection::connect(&websocket_url(&config.server), identity).await?;

    let mut view = ChatView::new();
    view.draft.username = config.username.unwrap_or_default();

    let mut subscription = connection.subscribe(MESSAGES_CHANNEL);
    let mut lifecycle = subscription.lifecycle();
    view.set_state(lifecycle.borrow_and_update().state);
    render_status(&view, None);

    if view.draft.username.trim().is_empty() {
        println!("* pick a name with /name <your name> before sending");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            message = subscription.next_message() => match message {
                Some(message) => render_entry(view.receive(message)),
                None => {
                    let last = lifecycle.borrow().clone();
                    view.set_state(last.state);
                    render_status(&view, last.error.as_deref());
                    break;
                }
            },
            changed = lifecycle.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = lifecycle.borrow_and_update().clone();
                view.set_state(current.state);
                render_status(&view, current.error.as_deref());
            },
            line = lines.next_line() => match line? {
                Some(line) => submit_line(&api, &mut view, line).await,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    subscription.leave();
    connection.disconnect().await;

    Ok(())
}

async fn submit_line(api: &MessagesApi, view: &mut ChatView, line: String) {
    if let Some(name) = line.strip_prefix("/name ") {
        view.draft.username = name.trim().to_owned();
        println!("* you are now {}", view.draft.username);
        return;
    }

    view.draft.message = line;
    let Some(submission) = view.draft.submission() else {
        println!("* a name and a message are both required");
        return;
    };

    match api.send(&submission).await {
        Ok(()) => view.draft.submitted(),
        Err(ApiError::Validation(error)) => println!("* not sent: {error}"),
        Err(error) => {
            warn!(%error, "failed to send message");
            println!("* not sent: {error}");
        }
    }
}

fn render_entry(message: &ChatMessage) {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");

    println!("[{time}] {}: {}", message.username, message.message);
}

fn render_status(view: &ChatView, error: Option<&str>) {
    match error {
        Some(error) if !view.connected() => println!("* {} ({error})", view.state().label()),
        _ => println!("* {}", view.state().label()),
    }
}
