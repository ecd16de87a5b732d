//! Network Module
//!
//! Handles TCP communication of election messages between nodes.

mod server;
mod client;

pub use server::NetworkServer;
pub use client::NetworkClient;

use crate::cluster::NodeAddress;
use crate::election::{FrameHeader, Message};
use crate::error::{Error, Result};

/// Point-to-point delivery of election messages. A failed send is reported
/// to the caller immediately.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `message` to `to`
    async fn send(&self, to: &NodeAddress, message: Message) -> Result<()>;
}

/// Read a framed message from a reader
pub async fn read_message<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    use tokio::io::AsyncReadExt;

    // Read header
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = FrameHeader::from_bytes(&header_bytes);

    if header.length > FrameHeader::MAX_BODY {
        return Err(Error::Network(format!(
            "Frame of {} bytes exceeds limit",
            header.length
        )));
    }

    // Read body
    let mut body = vec![0u8; header.length as usize];
    reader.read_exact(&mut body).await?;

    // Verify checksum
    let computed_checksum = crc32fast::hash(&body);
    if computed_checksum != header.checksum {
        return Err(Error::Network("Message checksum mismatch".into()));
    }

    // Deserialize
    let message = Message::deserialize(&body)?;
    Ok(message)
}

/// Write a framed message to a writer
pub async fn write_message<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let body = message.serialize()?;
    let header = FrameHeader::new(&body);

    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_roundtrip_over_pipe() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let message = Message::result(NodeAddress::new("5", "node-5:7654"));
        let id = message.id();

        write_message(&mut a, &message).await.unwrap();
        let received = read_message(&mut b).await.unwrap();

        assert_eq!(received.id(), id);
        assert_eq!(received.sender().location(), "5");
    }

    #[tokio::test]
    async fn test_corrupted_frame_is_rejected() {
        use tokio::io::AsyncWriteExt;

        let (mut a, mut b) = tokio::io::duplex(1024);
        let body = Message::result(NodeAddress::new("5", "x:1")).serialize().unwrap();
        let mut header = FrameHeader::new(&body);
        header.checksum ^= 0xdead_beef;

        a.write_all(&header.to_bytes()).await.unwrap();
        a.write_all(&body).await.unwrap();

        let err = read_message(&mut b).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        use tokio::io::AsyncWriteExt;

        let (mut a, mut b) = tokio::io::duplex(64);
        let header = FrameHeader {
            length: FrameHeader::MAX_BODY + 1,
            checksum: 0,
        };
        a.write_all(&header.to_bytes()).await.unwrap();

        assert!(read_message(&mut b).await.is_err());
    }
}
