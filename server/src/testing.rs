//! Helpers shared by the unit tests

use crate::catalog::ItemCatalog;
use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::peer::{self, PeerHandle, PeerQueues};
use shared::{FrameBuffer, Message};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, DuplexStream};

pub fn test_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

pub fn test_context(config: ServerConfig) -> Arc<ServerContext> {
    ServerContext::new(config, ItemCatalog::default())
}

/// Reading end of an in-memory peer
pub struct TestClient {
    stream: DuplexStream,
    frames: FrameBuffer,
}

impl TestClient {
    /// Creates a peer whose writer task writes into an in-memory pipe.
    pub fn connect(capacity: usize) -> (PeerHandle, TestClient) {
        let (peer, queues) = peer::channel(test_addr(), capacity);
        (peer, Self::attach(queues))
    }

    /// Starts the writer for already created queues.
    pub fn attach(queues: PeerQueues) -> TestClient {
        let (server_side, client_side) = tokio::io::duplex(64 * 1024);
        tokio::spawn(peer::run_writer(queues, server_side));
        TestClient {
            stream: client_side,
            frames: FrameBuffer::new(),
        }
    }

    /// Next decoded message, or None once the writer has closed the pipe.
    /// Panics if nothing arrives within a second.
    pub async fn next_message(&mut self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(1), self.read_message())
            .await
            .expect("timed out waiting for a message")
    }

    async fn read_message(&mut self) -> Option<Message> {
        loop {
            if let Some(frame) = self.frames.next_frame().expect("valid framing") {
                return Some(Message::from_frame(&frame).expect("valid message"));
            }
            match self.stream.read_buf(self.frames.buffer_mut()).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    /// Asserts that no message arrives for `duration`.
    pub async fn expect_silence(&mut self, duration: Duration) {
        if let Ok(Some(message)) = tokio::time::timeout(duration, self.read_message()).await {
            panic!("unexpected message: {:?}", message);
        }
    }
}
