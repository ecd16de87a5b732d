//! Network Server
//!
//! TCP server accepting election messages from other nodes and queueing
//! them for the election dispatcher.

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use super::read_message;
use crate::election::Event;
use crate::error::{Error, Result};

/// Network server for election traffic
pub struct NetworkServer {
    /// Bind address
    bind_address: String,
    /// Queue of the local election dispatcher
    events: mpsc::Sender<Event>,
    /// Shutdown signal
    shutdown: watch::Sender<bool>,
}

impl NetworkServer {
    /// Create a new network server
    pub fn new(bind_address: String, events: mpsc::Sender<Event>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            bind_address,
            events,
            shutdown: shutdown_tx,
        }
    }

    /// Bind and serve until stopped
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        tracing::info!("Election server listening on {}", self.bind_address);
        self.serve(listener).await
    }

    /// Serve on an already bound listener until stopped
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let peer_addr = addr.to_string();
                            let events = self.events.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(socket, &peer_addr, events).await {
                                    tracing::warn!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Election server stopped");
        Ok(())
    }

    /// Stop the server
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Read messages from one connection until it closes
async fn handle_connection(
    mut socket: TcpStream,
    peer_addr: &str,
    events: mpsc::Sender<Event>,
) -> Result<()> {
    loop {
        match read_message(&mut socket).await {
            Ok(message) => {
                tracing::trace!("Received {} from {}", message.type_name(), peer_addr);

                if events.send(Event::Message(message)).await.is_err() {
                    return Err(Error::ShuttingDown);
                }
            }
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Connection closed
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Dropping connection from {}: {}", peer_addr, e);
                return Ok(());
            }
        }
    }
}
