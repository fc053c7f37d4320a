//! The relay itself: splicing bytes between a client and its upstream, and
//! rewriting the EHLO reply on the way back.

mod inspector;
mod session;
pub mod splice;
mod upstream;

use core::fmt::{self, Display, Formatter};
use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpStream;

pub use self::{
    inspector::{Chunk, Inspector},
    session::{Session, SessionState},
    splice::{Endpoint, Transfer},
};
use crate::{
    config::{Config, Rewrite, Upstream},
    error::SessionResult,
    internal,
    traits::protocol::{Protocol, SessionHandler},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Display for Direction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(match self {
            Self::ClientToServer => "client -> server",
            Self::ServerToClient => "server -> client",
        })
    }
}

/// Relays each accepted client to the configured upstream.
#[derive(Debug, Clone)]
pub struct AuthPatch {
    upstream: Arc<Upstream>,
    rewrite: Arc<Rewrite>,
}

impl AuthPatch {
    pub fn new(config: &Config) -> Self {
        Self {
            upstream: Arc::new(config.upstream.clone()),
            rewrite: Arc::new(config.rewrite.clone()),
        }
    }
}

impl Protocol for AuthPatch {
    type Session = Pending;

    fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Self::Session {
        Pending {
            client: stream,
            peer,
            upstream: Arc::clone(&self.upstream),
            rewrite: Arc::clone(&self.rewrite),
        }
    }

    fn ty() -> &'static str {
        "SMTP relay"
    }
}

/// An accepted client whose upstream connection has not been opened yet.
pub struct Pending {
    client: TcpStream,
    peer: SocketAddr,
    upstream: Arc<Upstream>,
    rewrite: Arc<Rewrite>,
}

impl SessionHandler for Pending {
    async fn run(self) -> SessionResult<()> {
        internal!(
            level = DEBUG,
            "[{}] Opening upstream {}:{}",
            self.peer,
            self.upstream.host,
            self.upstream.port
        );

        let upstream = self.upstream.connect().await?;

        Session::new(
            self.client,
            upstream,
            self.peer,
            Inspector::new(self.rewrite),
        )
        .run()
        .await
    }
}
