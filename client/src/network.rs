//! TCP connection to the server, run on a background thread with its own
//! tokio runtime so the render loop never blocks on the socket.

use log::{debug, error, info, warn};
use shared::{ClientMessage, FrameDecoder, ServerMessage};
use std::io;
use std::thread;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Message(ServerMessage),
    /// The `\n` closing a snapshot was received.
    SnapshotEnd,
    Disconnected(String),
}

/// Handle to a connection running on its own thread
pub struct Connection {
    events: mpsc::UnboundedReceiver<NetworkEvent>,
    commands: mpsc::UnboundedSender<ClientMessage>,
    handle: Option<thread::JoinHandle<()>>,
    connected: bool,
}

impl Connection {
    /// Starts connecting to `server` in the background.
    pub fn spawn(server: &str) -> io::Result<Self> {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let server = server.to_string();

        let handle = thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start network runtime: {}", e);
                        let _ = events_tx.send(NetworkEvent::Disconnected(e.to_string()));
                        return;
                    }
                };

                let session = run_connection(&server, &events_tx, commands_rx);
                let reason = match runtime.block_on(session) {
                    Ok(()) => "server closed the connection".to_string(),
                    Err(e) => e.to_string(),
                };
                warn!("Disconnected from {}: {}", server, reason);
                let _ = events_tx.send(NetworkEvent::Disconnected(reason));
            })?;

        Ok(Self {
            events,
            commands,
            handle: Some(handle),
            connected: true,
        })
    }

    /// Drains every event received since the last call.
    pub fn poll(&mut self) -> Vec<NetworkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if matches!(event, NetworkEvent::Disconnected(_)) {
                self.connected = false;
            }
            events.push(event);
        }
        events
    }

    pub fn send(&self, message: ClientMessage) -> bool {
        self.connected && self.commands.send(message).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Closing the command channel ends the writer, which ends the session.
        let (closed, _) = mpsc::unbounded_channel();
        self.commands = closed;
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

/// Connects and pumps frames both ways until either direction ends.
pub async fn run_connection(
    server: &str,
    events: &mpsc::UnboundedSender<NetworkEvent>,
    commands: mpsc::UnboundedReceiver<ClientMessage>,
) -> io::Result<()> {
    info!("Connecting to {}...", server);
    let stream = TcpStream::connect(server).await?;
    stream.set_nodelay(true)?;
    info!("Connected to {}", server);

    let (reader, writer) = stream.into_split();
    tokio::select! {
        result = read_frames(reader, events) => result,
        result = write_commands(writer, commands) => result,
    }
}

/// Decodes server records and forwards them as events until end of stream.
///
/// A [`NetworkEvent::SnapshotEnd`] is sent for every newline terminator, in
/// stream order relative to the records around it.
pub async fn read_frames<R>(
    mut reader: R,
    events: &mpsc::UnboundedSender<NetworkEvent>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; 4096];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        decoder.push(&buffer[..n]);
        loop {
            let frame = decoder.next_frame();
            if decoder.take_line_end() && events.send(NetworkEvent::SnapshotEnd).is_err() {
                return Ok(());
            }
            let Some(frame) = frame else {
                break;
            };
            match ServerMessage::decode(&frame) {
                Ok(message) => {
                    if events.send(NetworkEvent::Message(message)).is_err() {
                        return Ok(());
                    }
                }
                Err(e) => debug!("Ignoring frame `{}`: {}", frame, e),
            }
        }
    }
}

/// Writes queued client messages until the queue is closed.
pub async fn write_commands<W>(
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<ClientMessage>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = commands.recv().await {
        writer.write_all(message.encode().as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
