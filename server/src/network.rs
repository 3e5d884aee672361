//! TCP front end: accepts connections, runs one reader and one writer per
//! session, and pushes a snapshot to every session after each simulation tick.

use crate::session_manager::SessionManager;
use log::{debug, error, info, warn};
use shared::FrameDecoder;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_BUFFER: usize = 1024;

/// Listening server bound to an address
pub struct Server {
    listener: TcpListener,
    manager: SessionManager,
}

impl Server {
    /// Binds the listening socket. Failing here is fatal for the process.
    pub async fn bind(addr: &str, manager: SessionManager) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Self { listener, manager })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Starts the broadcaster, then accepts connections forever.
    pub async fn run(self, ticks: mpsc::UnboundedReceiver<u64>) {
        spawn_broadcaster(self.manager.clone(), ticks);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let manager = self.manager.clone();
                    tokio::spawn(handle_connection(manager, stream, addr));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Spawns the task that turns tick notifications into snapshots.
///
/// Notifications that piled up while a broadcast was running are collapsed so
/// only the newest tick is sent.
pub fn spawn_broadcaster(
    manager: SessionManager,
    mut ticks: mpsc::UnboundedReceiver<u64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(mut tick) = ticks.recv().await {
            while let Ok(newer) = ticks.try_recv() {
                tick = newer;
            }
            manager.broadcast_snapshot(tick).await;
        }
        debug!("Broadcaster stopped");
    })
}

/// Serves one accepted connection until either side closes it.
pub async fn handle_connection(manager: SessionManager, stream: TcpStream, addr: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }

    let Some((id, outbound)) = manager.on_connect(addr).await else {
        warn!("Rejecting connection from {}: server full", addr);
        return;
    };

    let (reader, writer) = stream.into_split();
    serve_session(&manager, id, reader, writer, outbound).await;
}

/// Runs a registered session to completion and then evicts it, whether the
/// peer closed cleanly or a read or write failed.
pub async fn serve_session<R, W>(
    manager: &SessionManager,
    id: u32,
    reader: R,
    writer: W,
    outbound: mpsc::Receiver<String>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match run_session(manager, id, reader, writer, outbound).await {
        Ok(()) => debug!("Client {} closed the connection", id),
        Err(e) => warn!("Connection to client {} failed: {}", id, e),
    }

    manager.on_disconnect(id).await;
}

/// Drives the read and write halves of a session. Returns when either ends.
pub async fn run_session<R, W>(
    manager: &SessionManager,
    id: u32,
    reader: R,
    writer: W,
    outbound: mpsc::Receiver<String>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        result = read_loop(manager, id, reader) => result,
        result = write_loop(writer, outbound) => result,
    }
}

/// Reads frames until end of stream and hands each one to the manager.
pub async fn read_loop<R>(manager: &SessionManager, id: u32, mut reader: R) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; READ_BUFFER];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        decoder.push(&buffer[..n]);
        while let Some(frame) = decoder.next_frame() {
            manager.on_inbound_message(id, &frame).await;
        }
    }
}

/// Writes queued messages in order until the queue is closed.
pub async fn write_loop<W>(mut writer: W, mut outbound: mpsc::Receiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        writer.write_all(message.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_manager::SessionRegistry;
    use crate::world::World;
    use shared::{Bounds, Vector2};
    use std::sync::Arc;
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn test_manager() -> SessionManager {
        let world = World::new(
            Bounds::new(100.0, 100.0),
            SessionRegistry::new(None, Vector2::default()),
        );
        SessionManager::new(Arc::new(world))
    }

    #[tokio::test]
    async fn test_read_loop_reassembles_split_frames() {
        let manager = test_manager();
        let (a, _rx_a) = manager.on_connect(test_addr()).await.unwrap();
        let (_b, mut rx_b) = manager.on_connect(test_addr2()).await.unwrap();
        while rx_b.try_recv().is_ok() {}

        let reader = Builder::new()
            .read(b"MOV")
            .read(b"E:12,3")
            .read(b"4;garbage;MOVE:1,2\n")
            .build();

        read_loop(&manager, a, reader).await.unwrap();

        assert_eq!(rx_b.try_recv().unwrap(), "C:1,12,34;");
        assert_eq!(rx_b.try_recv().unwrap(), "C:1,1,2;");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_loop_reports_errors() {
        let manager = test_manager();
        let (a, _rx) = manager.on_connect(test_addr()).await.unwrap();

        let reader = Builder::new()
            .read(b"MOVE:1,1;")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let err = read_loop(&manager, a, reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_write_loop_preserves_order() {
        let (tx, rx) = mpsc::channel(4);
        tx.send("ID:1;".to_string()).await.unwrap();
        tx.send("T:0;\n".to_string()).await.unwrap();
        tx.send("DISCONNECTED_CLIENT:2;".to_string()).await.unwrap();
        drop(tx);

        let writer = Builder::new()
            .write(b"ID:1;")
            .write(b"T:0;\n")
            .write(b"DISCONNECTED_CLIENT:2;")
            .build();

        write_loop(writer, rx).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_session_ends_when_peer_closes() {
        let manager = test_manager();
        let (id, outbound) = manager.on_connect(test_addr()).await.unwrap();

        let reader = Builder::new().read(b"MOVE:3,4;").build();

        // The writer never finishes on its own while the session is registered.
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            run_session(&manager, id, reader, tokio::io::sink(), outbound),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        let sessions = manager.world().sessions().read().await;
        assert_eq!(sessions.get(id).unwrap().position, Vector2::new(3.0, 4.0));
    }

    #[tokio::test]
    async fn test_failed_write_evicts_session() {
        let manager = test_manager();
        let (a, mut rx_a) = manager.on_connect(test_addr()).await.unwrap();
        let (b, outbound_b) = manager.on_connect(test_addr2()).await.unwrap();
        while rx_a.try_recv().is_ok() {}

        // The read half stays open, so only the failed write can end the session.
        let (_remote, reader) = tokio::io::duplex(64);
        let writer = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
            .build();

        tokio::time::timeout(
            Duration::from_secs(1),
            serve_session(&manager, b, reader, writer, outbound_b),
        )
        .await
        .unwrap();

        assert_eq!(manager.world().sessions().read().await.ids(), vec![a]);
        assert_eq!(rx_a.try_recv().unwrap(), format!("DISCONNECTED_CLIENT:{};", b));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcaster_collapses_backlog() {
        let manager = test_manager();
        let (_id, mut rx) = manager.on_connect(test_addr()).await.unwrap();
        while rx.try_recv().is_ok() {}

        let (tx, ticks) = mpsc::unbounded_channel();
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        tx.send(3).unwrap();
        drop(tx);

        spawn_broadcaster(manager.clone(), ticks).await.unwrap();

        assert_eq!(rx.try_recv().unwrap(), "T:3;\n");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_server_welcomes_tcp_client() {
        let server = Server::bind("127.0.0.1:0", test_manager()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (_tx, ticks) = mpsc::unbounded_channel();
        tokio::spawn(server.run(ticks));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut received = String::new();
        let mut buffer = [0u8; 256];
        while !received.contains('\n') {
            let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buffer))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0);
            received.push_str(std::str::from_utf8(&buffer[..n]).unwrap());
        }

        assert!(received.starts_with("ID:1;T:0;"));
    }
}
