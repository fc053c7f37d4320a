use tokio::sync::broadcast;

use crate::{config::Config, internal, listener::Listener, logging, proxy::AuthPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}

pub struct Controller {
    config: Config,
}

impl Controller {
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the relay until CTRL+C is received.
    ///
    /// # Errors
    ///
    /// This function will return an error if the upstream cannot be resolved,
    /// the listening socket cannot be bound, or accepting connections fails.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        internal!("Controller running");

        let upstream = &self.config.upstream;
        let addresses = upstream.resolve().await?;
        internal!(
            level = INFO,
            "Relaying to {}:{} ({:?})",
            upstream.host,
            upstream.port,
            addresses
        );

        let listener = Listener::bind(self.config.listen, AuthPatch::new(&self.config)).await?;

        let (sender, receiver) = broadcast::channel(1);
        let serve = listener.serve(receiver);
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result?,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                internal!(level = INFO, "CTRL+C entered, shutting down ...");
                let _ = sender.send(Signal::Shutdown);
                serve.await?;
            }
        }

        internal!(level = INFO, "Shut down");

        Ok(())
    }
}
