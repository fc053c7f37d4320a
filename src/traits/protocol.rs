use std::{future::Future, net::SocketAddr};

use tokio::net::TcpStream;

use crate::error::SessionResult;

pub trait SessionHandler {
    fn run(self) -> impl Future<Output = SessionResult<()>> + Send;
}

pub trait Protocol: Send + Sync {
    type Session: SessionHandler + Send + 'static;

    fn handle(&self, stream: TcpStream, address: SocketAddr) -> Self::Session;

    fn ty() -> &'static str;
}
