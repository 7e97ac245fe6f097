use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::response::sse::Event;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::error::Error;

const CHANNEL_CAPACITY: usize = 32;

type SessionMap = Arc<RwLock<HashMap<String, SseSession>>>;

#[derive(Debug)]
struct SseSession {
    sender: mpsc::Sender<Event>,
    token: Option<String>,
}

/// The event stream of one `GET /sse` client. Dropping it, which axum does
/// when the client disconnects, forgets the session.
#[derive(Debug)]
pub(crate) struct SseStream {
    receiver: ReceiverStream<Event>,
    session_id: String,
    sessions: SessionMap,
}

impl Stream for SseStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver)
            .poll_next(cx)
            .map(|event| event.map(Ok))
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        let session_id = std::mem::take(&mut self.session_id);

        match self.sessions.try_write() {
            Ok(mut sessions) => {
                sessions.remove(&session_id);
            }
            Err(_) => {
                let sessions = Arc::clone(&self.sessions);
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        sessions.write().await.remove(&session_id);
                    });
                }
            }
        }

        tracing::debug!("Closed SSE session");
    }
}

/// Open `GET /sse` streams, keyed by the session id handed to the client in
/// the `endpoint` event.
#[derive(Clone, Debug, Default)]
pub(crate) struct SseSessions {
    sessions: SessionMap,
}

impl SseSessions {
    /// Registers a stream for the caller. The first event names the endpoint
    /// the client must POST its messages to.
    pub(crate) async fn open(&self, token: Option<String>) -> Result<(String, SseStream), Error> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

        let endpoint = Event::default()
            .event("endpoint")
            .data(format!("/messages?sessionId={}", session_id));
        if sender.try_send(endpoint).is_err() {
            return Err(Error::SessionNotFound);
        }

        {
            let mut sessions = self.sessions.write().await;
            // streams dropped while the lock was busy
            sessions.retain(|_, session| !session.sender.is_closed());
            sessions.insert(session_id.clone(), SseSession { sender, token });
        }

        tracing::debug!(%session_id, "Opened SSE session");

        let stream = SseStream {
            receiver: ReceiverStream::new(receiver),
            session_id: session_id.clone(),
            sessions: Arc::clone(&self.sessions),
        };

        Ok((session_id, stream))
    }

    /// Forgets a session. Its stream ends once the client has drained it.
    pub(crate) async fn close(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// The bearer token the stream was opened with.
    pub(crate) async fn token(&self, session_id: &str) -> Result<Option<String>, Error> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|session| session.token.clone())
            .ok_or(Error::SessionNotFound)
    }

    /// Pushes a `message` event. A stream whose client went away is dropped.
    pub(crate) async fn send(&self, session_id: &str, message: &Value) -> Result<(), Error> {
        let sender = self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|session| session.sender.clone())
            .ok_or(Error::SessionNotFound)?;

        let event = Event::default().event("message").data(serde_json::to_string(message)?);

        if sender.send(event).await.is_err() {
            self.sessions.write().await.remove(session_id);
            tracing::debug!(%session_id, "SSE client disconnected");
            return Err(Error::SessionNotFound);
        }

        Ok(())
    }
}
