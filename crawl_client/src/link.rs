//! Link transport.
//!
//! A link is one open byte stream to the server carrying length-prefixed
//! text frames. Reading happens on a small spawned task that forwards frames
//! into a channel, so receiving is cancel-safe for the caller; the write half
//! stays with the owner.

use anyhow::Context;
use async_trait::async_trait;
use crawl_shared::net::{FrameReader, FrameWriter};
use serde::Serialize;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

/// Inbound frames buffered per link.
const INBOUND_CAPACITY: usize = 64;

/// Opens byte streams to the server.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn open(&self) -> anyhow::Result<Self::Stream>;
}

/// Connects over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn open(&self) -> anyhow::Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("tcp connect {}", self.addr))?;
        stream.set_nodelay(true).context("set nodelay")?;
        Ok(stream)
    }
}

/// What the reader task observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFrame {
    Text(String),
    /// Clean close by the peer.
    Closed,
    /// Transport error; the string is the reason.
    Failed(String),
}

/// One open link.
pub struct Link<S> {
    writer: FrameWriter<WriteHalf<S>>,
    inbound: mpsc::Receiver<LinkFrame>,
    reader: JoinHandle<()>,
}

impl<S> Link<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Splits `stream` and starts its reader task.
    pub fn spawn(stream: S) -> Self {
        let (rd, wr) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(read_loop(FrameReader::new(rd), tx));
        Self {
            writer: FrameWriter::new(wr),
            inbound: rx,
            reader,
        }
    }

    pub async fn send_msg<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        self.writer.send_msg(msg).await
    }

    /// Next inbound frame. Cancel-safe.
    pub async fn recv(&mut self) -> LinkFrame {
        self.inbound.recv().await.unwrap_or(LinkFrame::Closed)
    }

    /// Stops reading and shuts the write half down.
    pub async fn close(&mut self) {
        self.reader.abort();
        if let Err(e) = self.writer.shutdown().await {
            debug!(error = %e, "Link shutdown failed");
        }
    }
}

impl<S> Drop for Link<S> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<S: AsyncRead>(mut reader: FrameReader<ReadHalf<S>>, tx: mpsc::Sender<LinkFrame>) {
    loop {
        let frame = match reader.recv().await {
            Ok(Some(text)) => LinkFrame::Text(text),
            Ok(None) => LinkFrame::Closed,
            Err(e) => LinkFrame::Failed(format!("{e:#}")),
        };
        let last = !matches!(frame, LinkFrame::Text(_));
        if tx.send(frame).await.is_err() || last {
            break;
        }
    }
}
