use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;

use super::{
    inspector::Inspector,
    splice::{self, Endpoint, Transfer},
    Direction,
};
use crate::{
    error::{SessionError, SessionResult, TransportError},
    incoming, internal, outgoing,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// The reply to a `QUIT` has been forwarded.
    Closing,
    Closed,
}

/// A single relayed connection: the client, its upstream, and the inspector
/// sitting between them.
pub struct Session<Client: Endpoint, Upstream: Endpoint> {
    peer: SocketAddr,
    client: Client,
    upstream: Upstream,
    inspector: Inspector,
    state: SessionState,
    /// The client has shut down its write half.
    client_done: bool,
}

impl<Client: Endpoint, Upstream: Endpoint> Session<Client, Upstream> {
    pub const fn new(
        client: Client,
        upstream: Upstream,
        peer: SocketAddr,
        inspector: Inspector,
    ) -> Self {
        Self {
            peer,
            client,
            upstream,
            inspector,
            state: SessionState::Active,
            client_done: false,
        }
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Relay until the client quits, the server goes away, or a transport
    /// error occurs. Both endpoints are shut down before returning.
    ///
    /// When the client closes its side, the close is passed on upstream and
    /// the server's remaining replies are still relayed back.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if reading or writing either
    /// endpoint fails.
    pub async fn run(mut self) -> SessionResult<()> {
        internal!(level = DEBUG, "[{}] Relaying session", self.peer);

        let result = self.relay().await;
        self.close().await;

        result
    }

    async fn relay(&mut self) -> SessionResult<()> {
        while self.state == SessionState::Active {
            tokio::select! {
                ready = self.client.readable(), if !self.client_done => ready.map_err(|err| {
                    SessionError::transport(Direction::ClientToServer, TransportError::Read(err))
                })?,
                ready = self.upstream.readable() => ready.map_err(|err| {
                    SessionError::transport(Direction::ServerToClient, TransportError::Read(err))
                })?,
            }

            self.pump().await?;
        }

        Ok(())
    }

    /// One iteration: whatever the client has ready goes upstream, then
    /// whatever the server has ready goes back to the client.
    async fn pump(&mut self) -> SessionResult<()> {
        let peer = self.peer;

        if !self.client_done {
            let inbound = splice::try_forward_with(&self.client, &mut self.upstream, |chunk| {
                incoming!("[{}] {}", peer, String::from_utf8_lossy(&chunk).trim_end());
                self.inspector.client_chunk(chunk)
            })
            .await
            .map_err(|err| SessionError::transport(Direction::ClientToServer, err))?;

            if inbound.eof {
                self.client_closed().await?;
            }
        }

        let outbound = splice::try_forward_with(&self.upstream, &mut self.client, |chunk| {
            let chunk = self.inspector.server_chunk(chunk);
            if !chunk.is_empty() {
                outgoing!("[{}] {}", peer, String::from_utf8_lossy(&chunk).trim_end());
            }
            chunk
        })
        .await
        .map_err(|err| SessionError::transport(Direction::ServerToClient, err))?;

        self.after_reply(outbound).await
    }

    /// Pass the client's end-of-stream on to the server, which still owes
    /// replies to anything already relayed.
    async fn client_closed(&mut self) -> SessionResult<()> {
        internal!(level = DEBUG, "[{}] Client closed the connection", self.peer);
        self.client_done = true;

        self.upstream.shutdown().await.map_err(|err| {
            SessionError::transport(Direction::ClientToServer, TransportError::Write(err))
        })
    }

    async fn after_reply(&mut self, outbound: Transfer) -> SessionResult<()> {
        if outbound.written > 0 && self.inspector.is_terminating() {
            internal!(level = DEBUG, "[{}] Client quit, closing session", self.peer);
            self.state = SessionState::Closing;
        }

        if outbound.eof {
            if let Some(held) = self.inspector.flush() {
                splice::forward(&mut self.client, &held)
                    .await
                    .map_err(|err| SessionError::transport(Direction::ServerToClient, err))?;
            }

            internal!(level = DEBUG, "[{}] Server closed the connection", self.peer);
            self.state = SessionState::Closed;
        }

        Ok(())
    }

    async fn close(&mut self) {
        if let Err(err) = self.upstream.shutdown().await {
            internal!(level = DEBUG, "[{}] Upstream shutdown: {}", self.peer, err);
        }

        if let Err(err) = self.client.shutdown().await {
            internal!(level = DEBUG, "[{}] Client shutdown: {}", self.peer, err);
        }

        self.state = SessionState::Closed;
        internal!(level = DEBUG, "[{}] Session closed", self.peer);
    }
}
