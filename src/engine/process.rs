use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::error::{Result, TopVpnError};

/// Managed lifecycle of the external engine binary.
///
/// The engine is an opaque subprocess; all configuration happens afterwards
/// over the control API.
pub struct EngineProcess {
    binary_path: PathBuf,
    child: Option<Child>,
}

impl EngineProcess {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            child: None,
        }
    }

    /// Start the engine if it is not already running under this handle.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            info!("Engine is already running");
            return Ok(());
        }

        let workdir = self
            .binary_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let child = Command::new(&self.binary_path)
            .current_dir(&workdir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TopVpnError::EngineUnavailable(format!(
                    "failed to start {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        info!(
            "Started engine {} with PID {:?}",
            self.binary_path.display(),
            child.id()
        );
        self.child = Some(child);
        Ok(())
    }

    /// Stop the engine. Termination failure is logged, not fatal: the run is
    /// over by the time this is called.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            info!("Engine is not running");
            return;
        };

        let pid = child.id();
        if let Err(e) = child.kill().await {
            warn!("Failed to terminate engine PID {:?}: {}", pid, e);
            return;
        }
        let _ = child.wait().await;
        info!("Stopped engine PID {:?}", pid);
    }

    pub async fn restart(&mut self) -> Result<()> {
        info!("Restarting engine...");
        self.stop().await;
        self.start()
    }

    /// Whether the child spawned by this handle is still alive.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Give the engine a moment to bring its control API up after start.
    pub async fn wait_ready(&self, startup_delay: Duration) {
        tokio::time::sleep(startup_delay).await;
    }
}
