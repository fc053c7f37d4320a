//! Test harness running the relay between a real client socket and a
//! scripted upstream, all on loopback.

use std::{net::SocketAddr, time::Duration};

use authpatch::{
    config::{Config, Rewrite, Upstream},
    controller::Signal,
    listener::Listener,
    proxy::AuthPatch,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::JoinHandle,
    time::timeout,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct Relay {
    /// Address clients connect to
    addr: SocketAddr,
    /// Stands in for the upstream SMTP server
    upstream: TcpListener,
    shutdown: broadcast::Sender<Signal>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Relay {
    pub async fn start(rewrite: Rewrite) -> Self {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = upstream.local_addr().unwrap().port();

        Self::start_with(upstream, port, rewrite).await
    }

    /// Start a relay whose upstream port refuses connections.
    pub async fn start_unreachable() -> Self {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);

        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::start_with(upstream, port, Rewrite::default()).await
    }

    async fn start_with(upstream: TcpListener, port: u16, rewrite: Rewrite) -> Self {
        let config = Config {
            listen: "127.0.0.1:0".parse().unwrap(),
            upstream: Upstream {
                host: "127.0.0.1".to_string(),
                port,
                ..Upstream::default()
            },
            rewrite,
        };
        config.validate().unwrap();

        let listener = Listener::bind(config.listen, AuthPatch::new(&config))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown, receiver) = broadcast::channel(1);
        let handle = tokio::spawn(listener.serve(receiver));

        Self {
            addr,
            upstream,
            shutdown,
            handle,
        }
    }

    /// Connect a client through the relay, returning the client's socket and
    /// the upstream's view of the same session.
    pub async fn connect(&self) -> (TcpStream, TcpStream) {
        let client = TcpStream::connect(self.addr).await.unwrap();
        let (server, _) = timeout(TIMEOUT, self.upstream.accept())
            .await
            .expect("relay never connected upstream")
            .unwrap();

        (client, server)
    }

    pub async fn connect_client(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown.send(Signal::Shutdown).unwrap();
        timeout(TIMEOUT, self.handle).await.unwrap().unwrap()
    }
}

/// Write `data` from one side, and check exactly that arrives on the other.
pub async fn relay(from: &mut TcpStream, to: &mut TcpStream, data: &[u8]) {
    relay_expecting(from, to, data, data).await;
}

/// Write `data` from one side, and check `expected` arrives on the other.
pub async fn relay_expecting(
    from: &mut TcpStream,
    to: &mut TcpStream,
    data: &[u8],
    expected: &[u8],
) {
    from.write_all(data).await.unwrap();
    assert_eq!(receive(to, expected.len()).await, expected);
}

pub async fn receive(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut received = vec![0; len];
    timeout(TIMEOUT, stream.read_exact(&mut received))
        .await
        .expect("timed out waiting for relayed data")
        .unwrap();
    received
}

/// Read until the peer closes, returning everything received.
pub async fn receive_to_end(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    timeout(TIMEOUT, stream.read_to_end(&mut received))
        .await
        .expect("connection was never closed")
        .unwrap();
    received
}
