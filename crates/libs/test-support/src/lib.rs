//! Test doubles shared by the batchlink integration tests.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use batchlink_protocol::{ClientMessage, FrameCodec, MessageKind, ServiceMessage};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;

/// How the fake service reacts to client traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behaviour {
    /// Reply to every client heartbeat with one of its own.
    pub answer_heartbeats: bool,
}

#[derive(Debug)]
enum Command {
    Send(ServiceMessage),
    SendRaw(Vec<u8>),
    AnswerHeartbeats(bool),
    Disconnect,
}

/// A distribution service stand-in bound to a loopback port.
///
/// Accepts a single client, records every decoded client message and lets the
/// test push messages, raw bytes, go silent or drop the connection.
pub struct FakeService {
    addr: SocketAddr,
    received: mpsc::UnboundedReceiver<ClientMessage>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl FakeService {
    pub async fn start() -> io::Result<Self> {
        Self::start_with(Behaviour::default()).await
    }

    pub async fn start_with(behaviour: Behaviour) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (frames, received) = mpsc::unbounded_channel();
        let (commands, queue) = mpsc::unbounded_channel();
        let task = tokio::spawn(serve(listener, behaviour, frames, queue));
        Ok(Self { addr, received, commands, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn send(&self, message: ServiceMessage) {
        let _ = self.commands.send(Command::Send(message));
    }

    /// Write bytes verbatim, bypassing framing.
    pub fn send_raw(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.commands.send(Command::SendRaw(bytes.into()));
    }

    /// Stop (or resume) answering heartbeats.
    pub fn answer_heartbeats(&self, answer: bool) {
        let _ = self.commands.send(Command::AnswerHeartbeats(answer));
    }

    /// Drop the client connection.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Next message from the client, waiting at most `within`.
    pub async fn recv(&mut self, within: Duration) -> Option<ClientMessage> {
        tokio::time::timeout(within, self.received.recv()).await.ok().flatten()
    }

    /// Next message of `kind`, discarding others.
    pub async fn recv_kind(&mut self, kind: MessageKind, within: Duration) -> Option<ClientMessage> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let message =
                tokio::time::timeout_at(deadline, self.received.recv()).await.ok().flatten()?;
            if message.kind() == kind {
                return Some(message);
            }
        }
    }

    /// Every message received so far, without waiting.
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.received.try_recv() {
            out.push(message);
        }
        out
    }
}

impl Drop for FakeService {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    behaviour: Behaviour,
    frames: mpsc::UnboundedSender<ClientMessage>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut stream = match listener.accept().await {
        Ok((stream, peer)) => {
            log::debug!("fake: accepted {peer}");
            stream
        }
        Err(err) => {
            log::warn!("fake: accept failed: {err}");
            return;
        }
    };
    if let Err(err) = session(&mut stream, behaviour, &frames, &mut commands).await {
        log::debug!("fake: session ended: {err}");
    }
}

async fn session(
    stream: &mut TcpStream,
    behaviour: Behaviour,
    frames: &mpsc::UnboundedSender<ClientMessage>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> io::Result<()> {
    let mut answer_heartbeats = behaviour.answer_heartbeats;
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(message)) => stream.write_all(&frame(&message)?).await?,
                Some(Command::SendRaw(bytes)) => stream.write_all(&bytes).await?,
                Some(Command::AnswerHeartbeats(answer)) => answer_heartbeats = answer,
                Some(Command::Disconnect) | None => return Ok(()),
            },
            read = stream.read_buf(&mut buf) => {
                if read? == 0 {
                    return Ok(());
                }
                for message in decode_frames(&mut codec, &mut buf)? {
                    if answer_heartbeats && message.kind() == MessageKind::ImAlive {
                        stream.write_all(&frame(&ServiceMessage::ImAlive)?).await?;
                    }
                    let _ = frames.send(message);
                }
            }
        }
    }
}

fn frame(message: &ServiceMessage) -> io::Result<Vec<u8>> {
    message.to_frame().map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn decode_frames(codec: &mut FrameCodec, buf: &mut BytesMut) -> io::Result<Vec<ClientMessage>> {
    let mut out = Vec::new();
    while let Some(payload) =
        codec.decode(buf).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
    {
        match ClientMessage::decode(&payload) {
            Ok(message) => out.push(message),
            Err(err) => log::warn!("fake: undecodable client frame: {err}"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_client_frames_and_answers_heartbeats() {
        let mut service =
            FakeService::start_with(Behaviour { answer_heartbeats: true }).await.expect("bind");
        let mut client = TcpStream::connect(service.addr()).await.expect("connect");

        let heartbeat = ClientMessage::ImAlive { seq: 1 }.to_frame().expect("frame");
        client.write_all(&heartbeat).await.expect("write");

        let received = service.recv(Duration::from_secs(5)).await.expect("heartbeat");
        assert_eq!(received, ClientMessage::ImAlive { seq: 1 });

        let reply = frame(&ServiceMessage::ImAlive).expect("frame");
        let mut buf = vec![0_u8; reply.len()];
        client.read_exact(&mut buf).await.expect("reply");
        assert_eq!(buf, reply);
    }
}
