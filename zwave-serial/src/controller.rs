use std::{io, time::Duration};

use log::{debug, error, trace, warn};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

use crate::{
    MAX_PAYLOAD_LEN,
    command::{Decode, Encode},
    decoder::Decoder,
    frame::Frame,
    link::DEFAULT_READ_TIMEOUT,
};

/// Device-initiated request frames, in the order they arrived.
///
/// Holding this without reading it eventually stalls the receive loop once
/// the queue is full. Dropping it makes the controller log and discard
/// unsolicited frames instead.
pub type Unsolicited = mpsc::Receiver<Frame>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How long the module has to acknowledge a request.
    pub ack_timeout: Duration,
    /// How long the module has to answer after acknowledging.
    pub response_timeout: Duration,
    /// Attempts at the acknowledgement handshake, the first one included.
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub retry_step: Duration,
    /// Extra wait after a CAN, on top of the retry backoff.
    pub cancel_backoff: Duration,
    /// Capacity of both the inbox and the unsolicited queue.
    pub queue_capacity: usize,
    pub read_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_base: Duration::from_millis(100),
            retry_step: Duration::from_secs(1),
            cancel_backoff: Duration::from_secs(1),
            queue_capacity: 20,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ControllerConfig {
    /// Wait after the `attempt`th failed handshake (1-based) before resending.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        self.retry_base + self.retry_step * attempt
    }
}

/// Why a single handshake attempt failed. All of these are retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeFailure {
    Nak,
    Cancel,
    Timeout,
}

impl std::fmt::Display for HandshakeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Nak => "message was not acknowledged by the device",
            Self::Cancel => "received CAN while waiting for acknowledgement",
            Self::Timeout => "timed out waiting for acknowledgement",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("link write failed: {0}")]
    Io(#[from] io::Error),

    #[error("payload of {len} bytes does not fit in a frame (max {max})", max = MAX_PAYLOAD_LEN)]
    PayloadTooLarge { len: usize },

    #[error("received unexpected frame waiting for acknowledgement: {0}")]
    UnexpectedFrame(Frame),

    #[error("received {0} while waiting for a response")]
    UnexpectedResponse(Frame),

    /// Every attempt failed; `cause` is the last failure.
    #[error("gave up after {attempts} attempts: {cause}")]
    Handshake {
        attempts: u32,
        cause: HandshakeFailure,
    },

    #[error("timed out waiting for response")]
    ResponseTimeout,

    /// The response arrived but acknowledging it failed. The frame is kept.
    #[error("could not acknowledge response {frame}: {source}")]
    ResponseNotAcknowledged {
        frame: Frame,
        #[source]
        source: io::Error,
    },

    #[error("could not decode response: {0}")]
    Codec(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Everything an exchange needs exclusive access to. Only reachable through
/// the controller's mutex, so at most one exchange is in flight.
struct Session {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    inbox: mpsc::Receiver<Frame>,
}

impl Session {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    async fn ack(&mut self) -> io::Result<()> {
        debug!("→ {}", Frame::Ack);
        self.write(&Frame::Ack.encode()).await
    }

    /// Drop answers that arrived after their wait gave up on them.
    fn discard_stale(&mut self) {
        while let Ok(frame) = self.inbox.try_recv() {
            warn!("discarding stale frame {frame}");
        }
    }

    /// The next solicited frame, or None once `wait` has elapsed.
    async fn next_frame(&mut self, wait: Duration) -> Result<Option<Frame>> {
        match timeout(wait, self.inbox.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(Error::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn await_acknowledgement(
        &mut self,
        config: &ControllerConfig,
    ) -> Result<Option<HandshakeFailure>> {
        match self.next_frame(config.ack_timeout).await? {
            Some(Frame::Ack) => Ok(None),
            Some(Frame::Nak) => Ok(Some(HandshakeFailure::Nak)),
            Some(Frame::Cancel) => {
                warn!("received CAN while waiting for acknowledgement");
                sleep(config.cancel_backoff).await;
                Ok(Some(HandshakeFailure::Cancel))
            }
            Some(frame) => Err(Error::UnexpectedFrame(frame)),
            None => Ok(Some(HandshakeFailure::Timeout)),
        }
    }

    /// Send a request and wait for the module to acknowledge it, resending
    /// on NAK, CAN or timeout. The caller already holds the session, so
    /// retries happen without touching the lock.
    async fn send_with_acknowledgement(
        &mut self,
        payload: Vec<u8>,
        config: &ControllerConfig,
    ) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge { len: payload.len() });
        }
        let request = Frame::request(payload);
        let bytes = request.encode();
        let mut attempt = 1;
        loop {
            // includes answers to our own earlier attempt that showed up during backoff
            self.discard_stale();
            debug!("→ {request}");
            self.write(&bytes).await?;

            let Some(cause) = self.await_acknowledgement(config).await? else {
                return Ok(());
            };
            if attempt >= config.max_attempts {
                return Err(Error::Handshake {
                    attempts: attempt,
                    cause,
                });
            }
            let backoff = config.retry_backoff(attempt);
            warn!("attempt {attempt} of {request} failed: {cause}; retrying in {backoff:?}");
            sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn await_response(&mut self, config: &ControllerConfig) -> Result<Frame> {
        match self.next_frame(config.response_timeout).await? {
            Some(frame) if frame.is_data() => Ok(frame),
            Some(frame) => Err(Error::UnexpectedResponse(frame)),
            None => Err(Error::ResponseTimeout),
        }
    }
}

/// One serial API session over an open link.
///
/// A background task decodes everything the module sends: device-initiated
/// requests go to [`Unsolicited`], everything else (ACK, NAK, CAN and
/// responses) to an inbox read by whichever exchange holds the session.
pub struct Controller {
    config: ControllerConfig,
    session: Mutex<Session>,
    shutdown: CancellationToken,
    receive_task: Option<JoinHandle<()>>,
}

impl Controller {
    /// Take over `link` and start the receive loop. Must be called from
    /// within a tokio runtime.
    pub fn open<L>(link: L, config: ControllerConfig) -> (Self, Unsolicited)
    where
        L: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(link);
        let capacity = config.queue_capacity.max(1);
        let (inbox_tx, inbox) = mpsc::channel(capacity);
        let (unsolicited_tx, unsolicited) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();

        let receive_task = tokio::spawn(receive(
            Decoder::new(reader),
            inbox_tx,
            unsolicited_tx,
            config.read_timeout,
            shutdown.clone(),
        ));

        let controller = Self {
            config,
            session: Mutex::new(Session {
                writer: Box::new(writer),
                inbox,
            }),
            shutdown,
            receive_task: Some(receive_task),
        };
        (controller, unsolicited)
    }

    /// False once the receive loop has stopped, e.g. after the link closed.
    pub fn is_receiving(&self) -> bool {
        self.receive_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Send a request that the module only acknowledges.
    pub async fn send_with_acknowledgement<Req>(&self, request: &Req) -> Result<()>
    where
        Req: Encode + ?Sized,
    {
        let mut session = self.session.lock().await;
        session
            .send_with_acknowledgement(request.encode(), &self.config)
            .await
    }

    /// One full round trip: request, acknowledgement, response, and our
    /// acknowledgement of the response. Only the first handshake is retried.
    pub async fn send_and_receive<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Encode + ?Sized,
        Resp: Decode,
    {
        let mut session = self.session.lock().await;
        session
            .send_with_acknowledgement(request.encode(), &self.config)
            .await?;
        let frame = session.await_response(&self.config).await?;
        debug!("← {frame} (response)");
        if let Err(source) = session.ack().await {
            return Err(Error::ResponseNotAcknowledged { frame, source });
        }
        let payload = frame.payload().unwrap_or_default();
        Resp::decode(payload).map_err(|err| Error::Codec(Box::new(err)))
    }

    /// Flush and shut down the link, stop the receive loop and wait for it.
    pub async fn close(mut self) -> Result<()> {
        let flushed = {
            let mut session = self.session.lock().await;
            session.writer.shutdown().await
        };
        self.shutdown.cancel();
        if let Some(task) = self.receive_task.take() {
            if let Err(err) = task.await {
                error!("receive loop failed: {err}");
            }
        }
        Ok(flushed?)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn receive<R>(
    mut decoder: Decoder<R>,
    inbox: mpsc::Sender<Frame>,
    unsolicited: mpsc::Sender<Frame>,
    read_timeout: Duration,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = timeout(read_timeout, decoder.next()) => next,
        };
        let frame = match next {
            Err(_) => {
                trace!("nothing received for {read_timeout:?}");
                continue;
            }
            Ok(Ok(frame)) => frame,
            Ok(Err(err)) if err.is_fatal() => {
                error!("{err}; receive loop stopping");
                break;
            }
            // a corrupt frame is not answered with a NAK, it is only dropped
            Ok(Err(err)) => {
                warn!("dropping frame: {err}");
                continue;
            }
        };

        if frame.is_request() {
            debug!("← {frame} (unsolicited)");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                sent = unsolicited.send(frame) => {
                    if let Err(err) = sent {
                        debug!("nobody listening for unsolicited frames, discarding {}", err.0);
                    }
                }
            }
        } else {
            debug!("← {frame}");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                sent = inbox.send(frame) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!("receive loop stopped");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.ack_timeout, Duration::from_secs(2));
        assert_eq!(config.response_timeout, Duration::from_secs(5));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn backoff_grows_per_attempt() {
        let config = ControllerConfig::default();
        assert_eq!(config.retry_backoff(1), Duration::from_millis(1100));
        assert_eq!(config.retry_backoff(2), Duration::from_millis(2100));
    }

    #[test]
    fn handshake_error_reports_last_cause() {
        let err = Error::Handshake {
            attempts: 3,
            cause: HandshakeFailure::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "gave up after 3 attempts: timed out waiting for acknowledgement"
        );
    }
}
