//! Secure publish/subscribe session to the controller.
//!
//! [`Transport`] is the seam the controller drives; [`MqttTransport`] is
//! the production implementation on top of `rumqttc` with TLS restricted
//! to the configured trust anchors. One background task owns the MQTT
//! event loop, subscribes to the profile wildcard once per connection, and
//! forwards every inbound publish into a single ordered channel.
//!
//! The transport never reconnects on its own: a dropped connection moves
//! the state to [`TransportState::Failed`] and the owner decides what to do.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeReasonCode,
};
use secrecy::ExposeSecret;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::credentials::Credentials;
use crate::error::Error;
use crate::tls::TrustAnchors;
use crate::topic;

/// Capacity of the request channel between client handles and the event loop.
const CLIENT_CAPACITY: usize = 64;

// ── Session types ────────────────────────────────────────────────────

/// Observable lifecycle of one transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Failed(String),
}

impl TransportState {
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed)
    }
}

/// A raw message received on the wildcard subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SessionTarget {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub profile: String,
    pub credentials: Credentials,
    pub trust: TrustAnchors,
    pub keep_alive: Duration,
    /// Bound on connect + subscribe.
    pub connect_timeout: Duration,
}

// ── Transport trait ──────────────────────────────────────────────────

/// Connection to the controller, as seen by the controller logic.
pub trait Transport: Send + Sync + 'static {
    /// Open a session and resolve once the wildcard subscription is confirmed.
    ///
    /// Any previous session is fully stopped first. Inbound messages are
    /// delivered on `inbound` in receipt order.
    fn start(
        &self,
        target: &SessionTarget,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Tear down the current session. Idempotent.
    fn stop(&self) -> impl Future<Output = ()> + Send;

    /// Publish one payload. Fails fast with [`Error::NotConnected`] unless subscribed.
    fn publish(&self, topic: &str, payload: Vec<u8>)
    -> impl Future<Output = Result<(), Error>> + Send;

    /// Observer for state transitions.
    fn state(&self) -> watch::Receiver<TransportState>;

    fn is_subscribed(&self) -> bool {
        self.state().borrow().is_subscribed()
    }
}

// ── MQTT implementation ──────────────────────────────────────────────

struct ActiveSession {
    client: AsyncClient,
    stopping: CancellationToken,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// `rumqttc`-backed transport over TLS.
pub struct MqttTransport {
    session: Mutex<Option<ActiveSession>>,
    state_tx: Arc<watch::Sender<TransportState>>,
    stop_timeout: Duration,
}

impl MqttTransport {
    pub fn new(stop_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(TransportState::Disconnected);
        Self {
            session: Mutex::new(None),
            state_tx: Arc::new(state_tx),
            stop_timeout,
        }
    }

    fn options(target: &SessionTarget) -> MqttOptions {
        let mut options = MqttOptions::new(&target.client_id, &target.host, target.port);
        options
            .set_keep_alive(target.keep_alive)
            .set_clean_session(true)
            .set_credentials(
                target.credentials.username.clone(),
                target.credentials.token.expose_secret(),
            )
            .set_transport(rumqttc::Transport::tls_with_config(
                target.trust.tls_configuration(),
            ));
        options
    }
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Transport for MqttTransport {
    async fn start(
        &self,
        target: &SessionTarget,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> Result<(), Error> {
        self.stop().await;

        tracing::info!(
            host = %target.host,
            port = target.port,
            profile = %target.profile,
            "Connecting to controller"
        );

        let (client, eventloop) = AsyncClient::new(Self::options(target), CLIENT_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stopping = CancellationToken::new();
        let cancel = CancellationToken::new();

        self.state_tx.send_replace(TransportState::Connecting);

        let task = tokio::spawn(run_event_loop(EventLoopContext {
            eventloop,
            client: client.clone(),
            wildcard: topic::wildcard(&target.profile),
            inbound,
            state: Arc::clone(&self.state_tx),
            stopping: stopping.clone(),
            cancel: cancel.clone(),
            ready: Some(ready_tx),
        }));

        *self.session.lock().await = Some(ActiveSession {
            client,
            stopping,
            cancel,
            task,
        });

        let outcome = match tokio::time::timeout(target.connect_timeout, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => Err(Error::Timeout {
                timeout_secs: target.connect_timeout.as_secs(),
            }),
        };

        if let Err(ref e) = outcome {
            tracing::warn!(error = %e, "Controller session failed to start");
            self.stop().await;
            self.state_tx.send_replace(TransportState::Failed(e.to_string()));
        }
        outcome
    }

    async fn stop(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        session.stopping.cancel();
        if session.client.try_disconnect().is_err() {
            session.cancel.cancel();
        }

        let mut task = session.task;
        if tokio::time::timeout(self.stop_timeout, &mut task).await.is_err() {
            tracing::debug!("Event loop did not stop in time, aborting");
            session.cancel.cancel();
            task.abort();
        }

        self.state_tx.send_replace(TransportState::Disconnected);
        tracing::debug!("Controller session stopped");
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Error> {
        let subscribed = self.state_tx.borrow().is_subscribed();
        if !subscribed {
            return Err(Error::NotConnected);
        }

        let client = self
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(Error::NotConnected)?;

        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        tracing::trace!(topic, "Published");
        Ok(())
    }

    fn state(&self) -> watch::Receiver<TransportState> {
        self.state_tx.subscribe()
    }
}

// ── Background event loop ────────────────────────────────────────────

struct EventLoopContext {
    eventloop: EventLoop,
    client: AsyncClient,
    wildcard: String,
    inbound: mpsc::Sender<InboundMessage>,
    state: Arc<watch::Sender<TransportState>>,
    stopping: CancellationToken,
    cancel: CancellationToken,
    ready: Option<oneshot::Sender<Result<(), Error>>>,
}

impl EventLoopContext {
    fn signal_ready(&mut self, result: Result<(), Error>) {
        if let Some(tx) = self.ready.take() {
            let _ = tx.send(result);
        }
    }

    fn fail(&mut self, err: Error) {
        if self.stopping.is_cancelled() {
            return;
        }
        tracing::warn!(error = %err, "Controller connection lost");
        self.state.send_replace(TransportState::Failed(err.to_string()));
        self.signal_ready(Err(err));
    }
}

/// Poll the MQTT event loop until cancelled, stopped, or failed.
async fn run_event_loop(mut ctx: EventLoopContext) {
    loop {
        let event = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break,
            event = ctx.eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::debug!("Connected, subscribing");
                ctx.state.send_replace(TransportState::Connected);
                if ctx
                    .client
                    .try_subscribe(ctx.wildcard.clone(), QoS::AtLeastOnce)
                    .is_err()
                {
                    ctx.fail(Error::ChannelClosed);
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    ctx.fail(Error::Rejected {
                        reason: format!("subscription to {} refused", ctx.wildcard),
                    });
                    break;
                }
                tracing::info!(topic = %ctx.wildcard, "Subscribed");
                ctx.state.send_replace(TransportState::Subscribed);
                ctx.signal_ready(Ok(()));
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                let sent = tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => break,
                    sent = ctx.inbound.send(message) => sent,
                };
                if sent.is_err() {
                    tracing::debug!("Inbound receiver dropped, leaving event loop");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                ctx.fail(map_connection_error(e));
                break;
            }
        }
    }
    tracing::debug!("MQTT event loop exiting");
}

fn map_connection_error(err: ConnectionError) -> Error {
    match err {
        ConnectionError::ConnectionRefused(
            code @ (ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized),
        ) => Error::Credential {
            reason: format!("controller refused the token ({code:?})"),
        },
        ConnectionError::ConnectionRefused(code) => Error::Rejected {
            reason: format!("connection refused ({code:?})"),
        },
        ConnectionError::Tls(e) => Error::Tls(e.to_string()),
        other => Error::Connection(other.to_string()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn refused_credentials_map_to_credential_error() {
        let err = map_connection_error(ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword,
        ));
        assert!(err.is_credential());

        let err =
            map_connection_error(ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized));
        assert!(err.is_credential());
    }

    #[test]
    fn other_refusals_are_not_credential_errors() {
        let err = map_connection_error(ConnectionError::ConnectionRefused(
            ConnectReturnCode::ServiceUnavailable,
        ));
        assert!(matches!(err, Error::Rejected { .. }));
        assert!(!err.is_credential());
    }

    #[tokio::test]
    async fn publish_without_session_fails_fast() {
        let transport = MqttTransport::default();
        let err = transport
            .publish("hobby/control/devices/cmd", b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(!transport.is_subscribed());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let transport = MqttTransport::default();
        transport.stop().await;
        transport.stop().await;
        assert_eq!(*transport.state().borrow(), TransportState::Disconnected);
    }
}
