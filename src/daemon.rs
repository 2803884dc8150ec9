//! Daemon - the call relay service
//!
//! Wires the packet listener, telephony event stream, session orchestrator
//! and status API together and runs them until ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::api::ApiServer;
use crate::media::{PacketListener, RouteTable};
use crate::pipeline::{PipelineFactory, SoxLauncher, fifo};
use crate::remote::{RemoteConnector, WsConnector};
use crate::session::{MediaSettings, Orchestrator};
use crate::telephony::{AriClient, AriEvents, Telephony};
use crate::{Config, Error, Result};

/// The call relay daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Create the playback directory and purge stale streaming objects
    ///
    /// Returns the number of objects removed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or read
    pub fn prepare_playback_dir(&self) -> Result<usize> {
        let dir = &self.config.playback.dir;
        std::fs::create_dir_all(dir)?;
        let removed = fifo::purge_stale(dir)?;
        if removed > 0 {
            tracing::info!(dir = %dir.display(), removed, "purged stale streaming objects");
        }
        Ok(removed)
    }

    /// Locate the resample program on `PATH`
    #[must_use]
    pub fn find_resampler(&self) -> Option<PathBuf> {
        which::which(&self.config.resample.program).ok()
    }

    /// Run the daemon until ctrl-c or a fatal error
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot bind, the telephony event stream
    /// cannot be established, or either is lost while running
    pub async fn run(self) -> Result<()> {
        self.prepare_playback_dir()?;
        match self.find_resampler() {
            Some(path) => tracing::debug!(path = %path.display(), "resample program found"),
            None => tracing::warn!(
                program = %self.config.resample.program,
                "resample program not found on PATH; playback will fail"
            ),
        }

        let routes = RouteTable::new();
        let listener = PacketListener::bind(self.config.media.listen, routes.clone()).await?;
        let external_host = match self.config.media.external_host {
            Some(host) => host,
            None => listener.local_addr()?,
        };

        let telephony: Arc<dyn Telephony> = Arc::new(AriClient::new(&self.config.ari));
        let connector: Arc<dyn RemoteConnector> =
            Arc::new(WsConnector::new(self.config.remote.url.clone()));
        let pipelines = PipelineFactory::new(
            self.config.playback.dir.clone(),
            Arc::new(SoxLauncher::new(self.config.resample.clone())),
        );
        let media = MediaSettings {
            app: self.config.ari.app.clone(),
            external_host,
            format: self.config.media.format.clone(),
        };
        let telephony_events = AriEvents::new(&self.config.ari)?;

        let (orchestrator, events_rx) =
            Orchestrator::new(telephony, connector, pipelines, media, routes);

        if self.config.api_server.enabled {
            let _api_task =
                ApiServer::new(orchestrator.subscribe(), self.config.api_server.port).spawn();
        }

        // Set up shutdown signal
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx_clone.send(()).await;
            }
        });

        let mut listener_task = tokio::spawn(listener.run());
        let mut events_task = tokio::spawn(telephony_events.run(orchestrator.sender()));
        let mut orchestrator_task = tokio::spawn(orchestrator.run(events_rx, shutdown_rx));

        tracing::info!(
            ari = %self.config.ari.url,
            app = %self.config.ari.app,
            remote = %self.config.remote.url,
            media = %external_host,
            "call relay running"
        );

        let fatal = tokio::select! {
            res = &mut events_task => fatal_error(res, Error::Telephony),
            res = &mut listener_task => fatal_error(res, Error::Listener),
            _ = &mut orchestrator_task => None,
        };

        listener_task.abort();
        events_task.abort();

        if let Some(e) = fatal {
            tracing::error!(error = %e, "fatal error, ending all calls");
            let _ = shutdown_tx.send(()).await;
            let _ = orchestrator_task.await;
            return Err(e);
        }

        tracing::info!("daemon stopped");
        Ok(())
    }
}

/// Error a finished background task should stop the daemon with
fn fatal_error(
    res: std::result::Result<Result<()>, JoinError>,
    wrap: fn(String) -> Error,
) -> Option<Error> {
    match res {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => Some(wrap(format!("task failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_tasks_map_to_fatal_errors() {
        assert!(fatal_error(Ok(Ok(())), Error::Listener).is_none());
        assert!(matches!(
            fatal_error(Ok(Err(Error::Telephony("gone".into()))), Error::Listener),
            Some(Error::Telephony(_))
        ));
    }

    #[test]
    fn playback_dir_is_created_and_purged() {
        let dir = tempfile::tempdir().unwrap();
        let sounds = dir.path().join("sounds");
        let mut config = Config::load_from(Some(&dir.path().join("missing.toml"))).unwrap();
        config.playback.dir.clone_from(&sounds);

        let daemon = Daemon::new(config);
        assert_eq!(daemon.prepare_playback_dir().unwrap(), 0);
        assert!(sounds.is_dir());

        std::fs::write(sounds.join("playback_c1.sln16"), b"").unwrap();
        assert_eq!(daemon.prepare_playback_dir().unwrap(), 1);
    }
}
