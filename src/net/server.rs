//! Line-oriented TCP server for the matchmaking protocol

use crate::error::Result;
use crate::matchmaking::manager::MatchManager;
use crate::net::handler::RequestHandler;
use crate::net::notifier::{ClientRegistry, ConnectionId};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, error, info, warn};

/// TCP front end: accepts connections, feeds request lines through the
/// [`RequestHandler`] and owns the notification fan-out wiring.
///
/// Binding happens in [`MatchServer::bind`] so a bind failure surfaces to
/// the caller before any client work starts (startup errors are the only
/// fatal ones).
pub struct MatchServer {
    listener: TcpListener,
    manager: Arc<MatchManager>,
    registry: Arc<ClientRegistry>,
    handler: Arc<RequestHandler>,
    next_conn_id: AtomicU64,
}

impl MatchServer {
    /// Bind the listener and wire the engine callbacks to the fan-out.
    pub async fn bind(address: &str, port: u16, manager: Arc<MatchManager>) -> Result<Self> {
        let listener = TcpListener::bind((address, port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", address, port))?;

        let registry = Arc::new(ClientRegistry::new());

        let match_sink = Arc::clone(&registry);
        manager.set_match_notify_callback(move |room| {
            match_sink.notify_match(room);
            Ok(())
        });

        let status_sink = Arc::clone(&registry);
        manager.set_player_status_callback(move |player_id, in_queue| {
            status_sink.notify_status(player_id, in_queue);
            Ok(())
        });

        let handler = Arc::new(RequestHandler::new(
            Arc::clone(&manager),
            Arc::clone(&registry),
        ));

        info!("Listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            manager,
            registry,
            handler,
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Actual bound address (useful when binding port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Accept loop; runs until the surrounding task is cancelled.
    pub async fn run(&self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
            info!("Client {} connected from {}", conn_id, peer);

            let handler = Arc::clone(&self.handler);
            let registry = Arc::clone(&self.registry);
            let manager = Arc::clone(&self.manager);
            tokio::spawn(async move {
                handle_connection(stream, conn_id, handler, Arc::clone(&registry)).await;

                // Disconnect cleanup mirrors an explicit player removal.
                if let Some(player_id) = registry.unregister(conn_id) {
                    info!(
                        "Client {} disconnected, removing player {}",
                        conn_id, player_id
                    );
                    manager.remove_player(player_id);
                } else {
                    info!("Client {} disconnected", conn_id);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    conn_id: ConnectionId,
    handler: Arc<RequestHandler>,
    registry: Arc<ClientRegistry>,
) {
    let (read_half, write_half) = stream.into_split();

    // All writes (responses and pushes) drain through one channel so they
    // serialize onto the socket. The writer task exits once every sender is
    // gone: the local one below and the registry's clone, which the caller
    // drops via unregister.
    let (tx, rx) = unbounded_channel::<String>();
    registry.register(conn_id, tx.clone());
    tokio::spawn(write_loop(write_half, rx));

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let response = handler.handle(line, conn_id);
                let payload = match serde_json::to_string(&response) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Failed to serialize response: {}", e);
                        continue;
                    }
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Read error on client {}: {}", conn_id, e);
                break;
            }
        }
    }
}

async fn write_loop(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut rx: UnboundedReceiver<String>,
) {
    while let Some(line) = rx.recv().await {
        if write_half.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if write_half.write_all(b"\n").await.is_err() {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::io::AsyncReadExt;

    async fn start_server(players_per_room: usize) -> (Arc<MatchManager>, SocketAddr) {
        let manager = MatchManager::new(players_per_room);
        manager.init();
        let server = MatchServer::bind("127.0.0.1", 0, Arc::clone(&manager))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        (manager, addr)
    }

    async fn send_line(stream: &mut TcpStream, line: &str) {
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();
    }

    async fn read_json_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_create_player_over_tcp() {
        let (_manager, addr) = start_server(2).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_half
            .write_all(b"{\"cmd\":\"create_player\",\"data\":{\"name\":\"tcp\",\"rating\":1400}}\n")
            .await
            .unwrap();

        let response = read_json_line(&mut reader).await;
        assert_eq!(response["cmd"], "create_player");
        assert_eq!(response["success"], true);
        assert_eq!(response["data"]["rating"], 1400);
    }

    #[tokio::test]
    async fn test_disconnect_removes_player() {
        let (manager, addr) = start_server(2).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        send_line(
            &mut stream,
            r#"{"cmd":"create_player","data":{"name":"ghost"}}"#,
        )
        .await;

        let mut buf = vec![0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        let response: Value = serde_json::from_slice(&buf[..n]).unwrap();
        let player_id = response["data"]["player_id"].as_u64().unwrap();

        send_line(
            &mut stream,
            &format!(r#"{{"cmd":"join_matchmaking","data":{{"player_id":{}}}}}"#, player_id),
        )
        .await;
        let _ = stream.read(&mut buf).await.unwrap();
        assert_eq!(manager.queue_size(), 1);

        drop(stream);

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(manager.get_player(player_id).is_none());
        assert_eq!(manager.queue_size(), 0);

        manager.shutdown();
    }
}
