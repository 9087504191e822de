//! Socket state owned by the driver task.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use batchlink_protocol::{ClientMessage, FrameCodec, ServiceMessage};
use bytes::{Buf, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::codec::Decoder;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::status::ClientStatus;

use super::Shared;

const READ_CHUNK: usize = 16 * 1024;
/// Bytes read in one poll pass before yielding back to the loop.
const MAX_READ_PER_PASS: usize = 1024 * 1024;

type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

enum Link {
    Connecting(ConnectFuture),
    Connected(TcpStream),
    /// The socket failed or was released; nothing more is read or written.
    Down,
}

/// Why the session stopped.
#[derive(Debug)]
pub(crate) enum SessionEnd {
    /// Host called `close()`.
    Closed,
    /// The service sent Exit.
    Terminated,
    Disrupted(ClientError),
}

pub(crate) struct Session {
    link: Link,
    queue: mpsc::UnboundedReceiver<ClientMessage>,
    codec: FrameCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    timeout: Duration,
    readiness_wait: Duration,
    last_receive: Instant,
}

impl Session {
    pub(crate) fn new(config: &ClientConfig, queue: mpsc::UnboundedReceiver<ClientMessage>) -> Self {
        let addr = config.service_addr.clone();
        Self {
            link: Link::Connecting(Box::pin(TcpStream::connect(addr))),
            queue,
            codec: FrameCodec::new(),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            timeout: config.timeout,
            readiness_wait: config.readiness_wait,
            last_receive: Instant::now(),
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected(_))
    }

    /// One poll pass: drive the connect, read and dispatch inbound frames,
    /// flush queued messages, then check the deadline.
    pub(crate) async fn poll(&mut self, shared: &Shared) -> Result<(), SessionEnd> {
        if let Link::Connecting(connect) = &mut self.link {
            match time::timeout(self.readiness_wait, connect.as_mut()).await {
                Err(_) => {}
                Ok(Ok(stream)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        log::debug!("client({}): set_nodelay failed: {err}", shared.label());
                    }
                    self.link = Link::Connected(stream);
                    log::info!("client({}): connected", shared.label());
                    shared.status.publish(ClientStatus::Connected);
                }
                Ok(Err(err)) => return Err(self.fail(ClientError::io("connect", err))),
            }
        }

        if self.is_connected() {
            self.receive(shared).await?;
            self.flush(shared)?;
        }

        if Instant::now() > self.last_receive + self.timeout {
            return Err(SessionEnd::Disrupted(ClientError::ConnectionTimeout { timeout: self.timeout }));
        }
        Ok(())
    }

    /// Heartbeat duty. Does nothing until the connect has completed.
    pub(crate) fn refresh(&mut self, shared: &Shared) -> Result<(), SessionEnd> {
        if !self.is_connected() {
            return Ok(());
        }
        let seq = shared.enqueue(|seq| ClientMessage::ImAlive { seq });
        log::trace!("client({}): heartbeat seq={seq}", shared.label());
        self.flush(shared)
    }

    async fn receive(&mut self, shared: &Shared) -> Result<(), SessionEnd> {
        let Link::Connected(stream) = &self.link else {
            return Ok(());
        };
        match time::timeout(self.readiness_wait, stream.readable()).await {
            Err(_) => return Ok(()),
            Ok(Err(err)) => return Err(self.fail(ClientError::io("read", err))),
            Ok(Ok(())) => {}
        }

        let mut eof = false;
        let mut failure = None;
        let mut read = 0;
        while read < MAX_READ_PER_PASS {
            self.read_buf.reserve(READ_CHUNK);
            match stream.try_read_buf(&mut self.read_buf) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => read += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    failure = Some(ClientError::io("read", err));
                    break;
                }
            }
        }

        // Frames that arrived ahead of an EOF or error are still dispatched.
        loop {
            match self.codec.decode(&mut self.read_buf) {
                Ok(Some(payload)) => {
                    self.last_receive = Instant::now();
                    if dispatch(shared, &payload) {
                        return Err(SessionEnd::Terminated);
                    }
                }
                Ok(None) => break,
                Err(err) => return Err(self.fail(ClientError::from(err))),
            }
        }

        if let Some(err) = failure {
            return Err(self.fail(err));
        }
        if eof {
            return Err(self.fail(ClientError::peer_closed()));
        }
        Ok(())
    }

    /// Move queued messages into the write buffer in FIFO order and write as
    /// much as the socket accepts. Unwritten bytes stay at the head.
    fn flush(&mut self, shared: &Shared) -> Result<(), SessionEnd> {
        let Link::Connected(stream) = &self.link else {
            return Ok(());
        };
        while let Ok(message) = self.queue.try_recv() {
            match message.to_frame() {
                Ok(frame) => self.write_buf.extend_from_slice(&frame),
                Err(err) => {
                    log::warn!(
                        "client({}): dropping {} seq={}: {err}",
                        shared.label(),
                        message.kind(),
                        message.seq()
                    );
                    shared.errors.publish(ClientError::ProtocolEncode {
                        kind: message.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let mut failure = None;
        while !self.write_buf.is_empty() {
            match stream.try_write(&self.write_buf) {
                Ok(0) => {
                    failure = Some(ClientError::io("write", io::ErrorKind::WriteZero.into()));
                    break;
                }
                Ok(n) => self.write_buf.advance(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    failure = Some(ClientError::io("write", err));
                    break;
                }
            }
        }
        match failure {
            Some(err) => Err(self.fail(err)),
            None => Ok(()),
        }
    }

    /// Best-effort final flush followed by an Exit notice, bounded by `linger`.
    /// Only attempted while connected; failures are logged and swallowed.
    pub(crate) async fn say_goodbye(&mut self, shared: &Shared, linger: Duration) {
        if !self.is_connected() {
            return;
        }
        shared.enqueue(|seq| ClientMessage::Exit { seq });
        let drained = time::timeout(linger, async {
            loop {
                if let Err(SessionEnd::Disrupted(err)) = self.flush(shared) {
                    return Err(err);
                }
                if self.write_buf.is_empty() {
                    return Ok(());
                }
                let Link::Connected(stream) = &self.link else {
                    return Ok(());
                };
                if let Err(err) = stream.writable().await {
                    return Err(ClientError::io("write", err));
                }
            }
        })
        .await;
        match drained {
            Ok(Ok(())) => log::debug!("client({}): exit notice sent", shared.label()),
            Ok(Err(err)) => log::debug!("client({}): exit notice failed: {err}", shared.label()),
            Err(_) => log::debug!("client({}): exit notice timed out", shared.label()),
        }
    }

    /// Release the socket and refuse further queued messages.
    pub(crate) async fn release(&mut self, linger: Duration) {
        self.queue.close();
        if let Link::Connected(mut stream) = std::mem::replace(&mut self.link, Link::Down) {
            let _ = time::timeout(linger, stream.shutdown()).await;
        }
        self.write_buf.clear();
        self.read_buf.clear();
    }

    fn fail(&mut self, err: ClientError) -> SessionEnd {
        self.link = Link::Down;
        SessionEnd::Disrupted(err)
    }
}

/// Route one inbound frame to the feeds. Returns true when the service asked
/// the client to exit.
fn dispatch(shared: &Shared, payload: &[u8]) -> bool {
    match ServiceMessage::decode(payload) {
        Ok(ServiceMessage::Batch(batch)) => {
            log::debug!(
                "client({}): << batch lambda={} batch={} ({} bytes)",
                shared.label(),
                batch.lambda_id,
                batch.batch_id,
                batch.data.len()
            );
            shared.batches.publish(batch);
        }
        Ok(ServiceMessage::Lambda(lambda)) => {
            log::debug!("client({}): << lambda {}", shared.label(), lambda.lambda_id);
            shared.lambdas.publish(lambda);
        }
        Ok(ServiceMessage::ImAlive) => log::trace!("client({}): << im_alive", shared.label()),
        Ok(ServiceMessage::Exit) => {
            log::info!("client({}): service requested exit", shared.label());
            return true;
        }
        Err(err) => {
            log::warn!("client({}): rejecting inbound frame: {err}", shared.label());
            shared.errors.publish(ClientError::from(err));
        }
    }
    false
}
