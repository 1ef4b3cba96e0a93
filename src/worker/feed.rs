use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::FeedSettings;
use crate::worker::transport::{FeedError, FeedSession, FeedTransport};

/// Subscription commands sent right after every successful handshake.
pub const SUBSCRIBE_NEW_TOKEN: &str = r#"{"method":"subscribeNewToken"}"#;
pub const SUBSCRIBE_MIGRATION: &str = r#"{"method":"subscribeMigration"}"#;

pub const RETRY_EXHAUSTED: &str = "Failed to connect after multiple attempts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal until `run` is called again
    Failed,
}

/// Connection status as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStatus {
    pub state: FeedState,
    /// Last transport error, or the terminal message once `Failed`
    pub error: Option<String>,
    pub reconnect_attempts: u32,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self {
            state: FeedState::Disconnected,
            error: None,
            reconnect_attempts: 0,
        }
    }
}

enum SessionEnd {
    Cancelled,
    /// Pipeline dropped its receiver, nothing left to feed
    Abandoned,
    Lost(Option<FeedError>),
}

/// Owns the feed connection lifecycle.
///
/// Features:
/// - Subscribes to launch and migration events on every connect
/// - Forwards raw frames, in order, to the ingest pipeline
/// - Reconnects after a constant delay, up to a fixed number of attempts
/// - Publishes its state over a watch channel
pub struct FeedManager<T: FeedTransport> {
    transport: T,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
    raw_sender: mpsc::Sender<String>,
    status: watch::Sender<FeedStatus>,
    reconnect_attempts: u32,
}

impl<T: FeedTransport> FeedManager<T> {
    pub fn new(transport: T, settings: &FeedSettings, raw_sender: mpsc::Sender<String>) -> Self {
        let (status, _) = watch::channel(FeedStatus::default());
        Self {
            transport,
            reconnect_delay: Duration::from_secs(settings.reconnect_delay_secs),
            max_reconnect_attempts: settings.max_reconnect_attempts,
            raw_sender,
            status,
            reconnect_attempts: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> FeedStatus {
        self.status.borrow().clone()
    }

    fn set_state(&self, state: FeedState, error: Option<String>) {
        self.status.send_replace(FeedStatus {
            state,
            error,
            reconnect_attempts: self.reconnect_attempts,
        });
    }

    /// Runs the state machine until cancelled, abandoned or out of retries.
    ///
    /// Returns the final state (`Disconnected` or `Failed`). Calling it again
    /// starts over with a fresh attempt counter.
    pub async fn run(&mut self, cancel: CancellationToken) -> FeedState {
        self.reconnect_attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return self.stop();
            }

            self.set_state(FeedState::Connecting, None);
            let connected = tokio::select! {
                _ = cancel.cancelled() => return self.stop(),
                result = self.transport.connect() => result,
            };

            let lost = match connected {
                Ok(mut session) => {
                    self.reconnect_attempts = 0;
                    match self.serve(&mut session, &cancel).await {
                        SessionEnd::Cancelled | SessionEnd::Abandoned => {
                            session.close().await;
                            return self.stop();
                        },
                        SessionEnd::Lost(e) => e,
                    }
                },
                Err(e) => Some(e),
            };

            self.reconnect_attempts += 1;
            if self.reconnect_attempts > self.max_reconnect_attempts {
                error!("{} ({})", RETRY_EXHAUSTED, self.reconnect_attempts - 1);
                self.set_state(FeedState::Failed, Some(RETRY_EXHAUSTED.to_string()));
                return FeedState::Failed;
            }

            let reason = lost.map(|e| e.to_string());
            warn!(
                "Feed connection lost ({}), reconnecting in {:?} (attempt {}/{})",
                reason.as_deref().unwrap_or("closed"),
                self.reconnect_delay,
                self.reconnect_attempts,
                self.max_reconnect_attempts
            );
            self.set_state(FeedState::Reconnecting, reason);

            tokio::select! {
                _ = cancel.cancelled() => return self.stop(),
                _ = tokio::time::sleep(self.reconnect_delay) => {},
            }
        }
    }

    fn stop(&self) -> FeedState {
        info!("Feed connection manager stopped");
        self.set_state(FeedState::Disconnected, None);
        FeedState::Disconnected
    }

    async fn serve(&self, session: &mut T::Session, cancel: &CancellationToken) -> SessionEnd {
        for command in [SUBSCRIBE_NEW_TOKEN, SUBSCRIBE_MIGRATION] {
            if let Err(e) = session.send(command.to_string()).await {
                return SessionEnd::Lost(Some(e));
            }
        }

        info!("Feed connected, subscribed to new tokens and migrations");
        self.set_state(FeedState::Connected, None);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                message = session.next_message() => match message {
                    Some(Ok(text)) => {
                        tokio::select! {
                            _ = cancel.cancelled() => return SessionEnd::Cancelled,
                            sent = self.raw_sender.send(text) => {
                                if sent.is_err() {
                                    warn!("Ingest pipeline is gone, closing feed");
                                    return SessionEnd::Abandoned;
                                }
                            },
                        }
                    },
                    Some(Err(e)) => return SessionEnd::Lost(Some(e)),
                    None => return SessionEnd::Lost(None),
                },
            }
        }
    }
}
