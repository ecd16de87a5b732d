//! Network Client
//!
//! Sends election messages to other nodes over TCP.

use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{write_message, Transport};
use crate::cluster::NodeAddress;
use crate::election::Message;
use crate::error::{Error, Result};

/// Network client for sending messages to peer nodes
pub struct NetworkClient {
    /// Connection timeout
    connect_timeout: Duration,
    /// Write timeout
    write_timeout: Duration,
}

impl NetworkClient {
    /// Create a new network client
    pub fn new(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            write_timeout,
        }
    }

    /// Connect to an address
    async fn connect(&self, address: &str) -> Result<TcpStream> {
        let result = timeout(self.connect_timeout, TcpStream::connect(address)).await;

        match result {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Open a connection, write one message and close
    async fn send_once(&self, address: &str, message: &Message) -> Result<()> {
        let mut stream = self.connect(address).await?;

        let written = timeout(self.write_timeout, async {
            write_message(&mut stream, message).await?;
            stream.shutdown().await?;
            Ok::<(), Error>(())
        })
        .await;

        match written {
            Ok(inner) => inner,
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl Transport for NetworkClient {
    async fn send(&self, to: &NodeAddress, message: Message) -> Result<()> {
        tracing::trace!("Sending {} to {}", message.type_name(), to);
        self.send_once(to.endpoint(), &message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::read_message;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_delivers_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_message(&mut socket).await.unwrap()
        });

        let client = NetworkClient::new(Duration::from_secs(1), Duration::from_secs(1));
        let message = Message::request(NodeAddress::new("1", "a:1"), "1");
        let id = message.id();

        client
            .send(&NodeAddress::new("2", endpoint), message)
            .await
            .unwrap();

        let received = accept.await.unwrap();
        assert_eq!(received.id(), id);
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let client = NetworkClient::new(Duration::from_millis(100), Duration::from_millis(500));

        // Bind and drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = client
            .send(
                &NodeAddress::new("2", format!("127.0.0.1:{}", port)),
                Message::result(NodeAddress::new("1", "a:1")),
            )
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_retryable());
    }
}
