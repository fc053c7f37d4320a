use std::net::SocketAddr;

use futures_util::future::join_all;
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};

use crate::{
    controller::Signal,
    error::{SetupError, SetupResult},
    internal,
    traits::protocol::{Protocol, SessionHandler},
};

/// Accepts connections and runs each one as its own task.
pub struct Listener<Proto: Protocol> {
    handler: Proto,
    listener: TcpListener,
}

impl<Proto: Protocol> Listener<Proto> {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Bind`] if the address is unavailable.
    pub async fn bind(address: SocketAddr, handler: Proto) -> SetupResult<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| SetupError::Bind { address, source })?;

        Ok(Self { handler, listener })
    }

    /// The address actually bound, useful when binding to port 0.
    ///
    /// # Errors
    ///
    /// Propagates the underlying socket error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until a [`Signal::Shutdown`] arrives.
    ///
    /// Sessions still running at shutdown are aborted, not drained.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting a connection fails.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
        let address = self.listener.local_addr()?;
        internal!(level = INFO, "Serving {} on {}", Proto::ty(), address);

        let mut sessions: Vec<JoinHandle<()>> = Vec::default();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                        internal!(level = INFO, "Listener {} received shutdown signal, closing {} sessions ...", address, sessions.len());
                        for session in &sessions {
                            session.abort();
                        }
                        join_all(sessions).await;
                        break;
                    }
                }

                connection = self.listener.accept() => {
                    let (stream, peer) = connection.map_err(|err| {
                        internal!(level = ERROR, "Accept failed on {}: {}", address, err);
                        err
                    })?;
                    internal!(level = DEBUG, "Connection received from {}", peer);

                    sessions.retain(|session| !session.is_finished());

                    let handler = self.handler.handle(stream, peer);
                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = handler.run().await {
                            internal!(level = ERROR, "[{}] Session failed: {}", peer, err);
                        }
                    }));
                }
            }
        }

        Ok(())
    }
}
