//! OpenSSH control-master connections.
//!
//! A master is started with `ssh -N -M -S <control path> <target>` and left
//! running; transfers reach the host through `--rsh="ssh -S <control path>"`.
//! Opening waits until the master has created its control socket. A master
//! that exits first (unreachable host, rejected key) is reported as
//! unavailable. Closing asks the master to exit over its control socket, then
//! reaps the process, killing it if it does not go away on its own.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use mimic_core::{DaemonConfig, HostKey};
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::task::JoinSet;

use crate::error::SyncError;
use crate::pool::Connector;

/// How long a master may take to exit after `-O exit`.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// How long a master may take to authenticate and create its control socket.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between readiness checks while a master connects.
const READY_POLL: Duration = Duration::from_millis(25);

/// A running ssh control master.
#[derive(Debug)]
pub struct SshMaster {
    child: Child,
    control_path: Utf8PathBuf,
}

impl SshMaster {
    /// Returns the control socket path.
    #[must_use]
    pub fn control_path(&self) -> &Utf8Path {
        &self.control_path
    }
}

/// [`Connector`] that runs one ssh control master per host.
#[derive(Debug)]
pub struct SshConnector {
    ssh_path: String,
    control_dir: Utf8PathBuf,
    closing: Mutex<JoinSet<()>>,
}

impl SshConnector {
    /// Creates a connector using `ssh_path`, placing control sockets in
    /// `control_dir`.
    #[must_use]
    pub fn new(ssh_path: impl Into<String>, control_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            ssh_path: ssh_path.into(),
            control_dir: control_dir.into(),
            closing: Mutex::new(JoinSet::new()),
        }
    }

    /// Creates a connector from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(config.ssh_path.clone(), config.control_dir.clone())
    }

    /// Returns the control socket path used for `host`.
    #[must_use]
    pub fn control_path(&self, host: &HostKey) -> Utf8PathBuf {
        self.control_dir.join(host.control_file_name())
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Handle = SshMaster;

    /// Starts a master and waits for its control socket.
    ///
    /// Blocks the calling thread for up to ten seconds; call it from blocking
    /// context.
    fn open(&self, host: &HostKey) -> Result<SshMaster, SyncError> {
        let control_path = self.control_path(host);
        remove_stale_socket(&control_path);

        let mut child = Command::new(&self.ssh_path)
            .arg("-N")
            .arg("-M")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", CONNECT_TIMEOUT.as_secs()))
            .arg("-S")
            .arg(control_path.as_str())
            .arg(host.ssh_target())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SyncError::connection_unavailable(host, e))?;

        tracing::debug!(host = %host, control_path = %control_path, pid = ?child.id(), "Started ssh master");

        let deadline = Instant::now() + CONNECT_TIMEOUT;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Err(SyncError::connection_unavailable(
                        host,
                        format!("ssh master exited early ({status})"),
                    ));
                }
                Ok(None) => {}
                Err(error) => return Err(SyncError::connection_unavailable(host, error)),
            }

            if control_path.exists() {
                break;
            }

            if Instant::now() >= deadline {
                if let Err(error) = child.start_kill() {
                    tracing::debug!(host = %host, error = %error, "Failed to kill ssh master");
                }
                return Err(SyncError::connection_unavailable(
                    host,
                    "timed out waiting for the control socket",
                ));
            }
            std::thread::sleep(READY_POLL);
        }

        tracing::debug!(host = %host, "ssh master ready");
        Ok(SshMaster {
            child,
            control_path,
        })
    }

    fn close(&self, host: &HostKey, master: SshMaster) {
        let ssh_path = self.ssh_path.clone();
        let target = host.ssh_target();
        let SshMaster {
            mut child,
            control_path,
        } = master;

        let mut closing = self.closing.lock();
        reap_finished(&mut closing);
        closing.spawn(async move {
            let exit = Command::new(&ssh_path)
                .arg("-S")
                .arg(control_path.as_str())
                .arg("-O")
                .arg("exit")
                .arg(&target)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(error) = exit {
                tracing::debug!(host = %target, error = %error, "Could not signal ssh master");
            }

            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(host = %target, status = %status, "ssh master exited");
                }
                Ok(Err(error)) => {
                    tracing::warn!(host = %target, error = %error, "Failed to reap ssh master");
                }
                Err(_) => {
                    tracing::warn!(host = %target, "ssh master did not exit, killing");
                    if let Err(error) = child.kill().await {
                        tracing::warn!(host = %target, error = %error, "Failed to kill ssh master");
                    }
                }
            }
        });
    }

    async fn wait_closed(&self) {
        let mut closing = std::mem::take(&mut *self.closing.lock());
        while let Some(result) = closing.join_next().await {
            if let Err(error) = result {
                tracing::warn!(error = %error, "ssh master shutdown task failed");
            }
        }
    }
}

/// Removes a control socket left behind by a master that died uncleanly.
fn remove_stale_socket(control_path: &Utf8Path) {
    match std::fs::remove_file(control_path) {
        Ok(()) => tracing::debug!(control_path = %control_path, "Removed stale control socket"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::warn!(control_path = %control_path, error = %error, "Failed to remove stale control socket");
        }
    }
}

/// Joins close tasks that have already finished.
fn reap_finished(closing: &mut JoinSet<()>) {
    while let Some(result) = closing.try_join_next() {
        if let Err(error) = result {
            tracing::warn!(error = %error, "ssh master shutdown task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConnectionPool;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Stand-in for ssh: as a master it records its pid in the control path
    /// and sleeps; `-O exit` kills the recorded pid.
    const FAKE_SSH: &str = r#"#!/bin/sh
ctl=""
mode=master
while [ $# -gt 0 ]; do
    case "$1" in
        -S) ctl="$2"; shift ;;
        -O) mode="$2"; shift ;;
    esac
    shift
done
if [ "$mode" = exit ]; then
    kill "$(cat "$ctl")"
    exit 0
fi
echo $$ > "$ctl"
exec sleep 30
"#;

    fn fake_ssh(dir: &TempDir) -> Utf8PathBuf {
        let path = Utf8PathBuf::try_from(dir.path().join("fake-ssh")).unwrap();
        std::fs::write(&path, FAKE_SSH).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn control_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_control_path() {
        let connector = SshConnector::new("ssh", "/run/mimic");
        let host = HostKey::new(Some("bob"), "example.com");
        assert_eq!(
            connector.control_path(&host),
            Utf8PathBuf::from("/run/mimic/mimic_example.com_22_bob")
        );
    }

    #[tokio::test]
    async fn test_missing_ssh_is_unavailable() {
        let connector = SshConnector::new("/nonexistent/mimic-ssh", "/tmp");
        let host = HostKey::new(Some("bob"), "example.com");
        let err = connector.open(&host).unwrap_err();
        assert!(matches!(err, SyncError::ConnectionUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_master_exiting_early_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::new(SshConnector::new("false", control_dir(&dir)));
        let host = HostKey::new(Some("bob"), "unreachable.invalid");

        let err = pool.acquire(&host).unwrap_err();

        assert!(matches!(err, SyncError::ConnectionUnavailable { .. }));
        assert_eq!(pool.ref_count(&host), 0);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_open_waits_for_control_socket_and_close_reaps_master() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::new(SshConnector::new(fake_ssh(&dir), control_dir(&dir)));
        let host = HostKey::new(Some("bob"), "example.com");

        pool.acquire(&host).unwrap();
        assert!(pool.connector().control_path(&host).exists());
        assert_eq!(pool.ref_count(&host), 1);

        assert!(pool.release(&host));
        pool.connector().wait_closed().await;

        assert!(pool.connector().closing.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stale_control_socket_is_replaced() {
        let dir = TempDir::new().unwrap();
        let connector = SshConnector::new("false", control_dir(&dir));
        let host = HostKey::new(Some("bob"), "example.com");
        std::fs::write(connector.control_path(&host), "").unwrap();

        // A leftover file must not be mistaken for a live master.
        assert!(connector.open(&host).is_err());
        assert!(!connector.control_path(&host).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_finished_close_tasks_are_reaped() {
        let dir = TempDir::new().unwrap();
        let pool = ConnectionPool::new(SshConnector::new(fake_ssh(&dir), control_dir(&dir)));
        let first = HostKey::new(Some("bob"), "one.example.com");
        let second = HostKey::new(Some("bob"), "two.example.com");

        pool.acquire(&first).unwrap();
        pool.release(&first);
        tokio::time::sleep(Duration::from_secs(2)).await;

        pool.acquire(&second).unwrap();
        pool.release(&second);

        assert_eq!(pool.connector().closing.lock().len(), 1);
        pool.connector().wait_closed().await;
    }
}
