//! Thin wrapper over the external volume command.
//!
//! No arguments prints the current volume as a bare integer; `set|inc|dec <n>`
//! changes it.  Nothing is cached, every call runs the command.

use mspd_proto::config::VolumeConfig;
use mspd_proto::protocol::VolumeVerb;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("could not run volume command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("volume command '{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("volume command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("volume command printed '{0}', expected an integer")]
    Unparsable(String),
}

impl VolumeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, VolumeError::Timeout { .. })
    }
}

#[derive(Debug, Clone)]
pub struct VolumeControl {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl VolumeControl {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &VolumeConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone(), config.timeout())
    }

    pub async fn get(&self) -> Result<i32, VolumeError> {
        let output = self.run(&[]).await?;
        let text = String::from_utf8_lossy(&output.stdout);
        let text = text.trim();
        text.parse()
            .map_err(|_| VolumeError::Unparsable(text.to_string()))
    }

    pub async fn set(&self, percent: i64) -> Result<(), VolumeError> {
        self.apply(VolumeVerb::Set, percent).await
    }

    pub async fn increment(&self, percent: i64) -> Result<(), VolumeError> {
        self.apply(VolumeVerb::Inc, percent).await
    }

    pub async fn decrement(&self, percent: i64) -> Result<(), VolumeError> {
        self.apply(VolumeVerb::Dec, percent).await
    }

    /// Values are passed through unclamped; range checks are the command's job.
    pub async fn apply(&self, verb: VolumeVerb, amount: i64) -> Result<(), VolumeError> {
        self.run(&[verb.as_arg().to_string(), amount.to_string()])
            .await
            .map(|_| ())
    }

    async fn run(&self, extra: &[String]) -> Result<Output, VolumeError> {
        debug!("volume: {} {:?} {:?}", self.command, self.args, extra);
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| VolumeError::Timeout {
                command: self.command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| VolumeError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(VolumeError::Failed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell(script: &str) -> VolumeControl {
        VolumeControl::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "chvol".to_string()],
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_get_parses_trimmed_output() {
        let volume = shell("echo ' 42'");
        assert_eq!(volume.get().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_get_rejects_garbage() {
        let volume = shell("echo muted");
        assert!(matches!(
            volume.get().await,
            Err(VolumeError::Unparsable(s)) if s == "muted"
        ));
    }

    #[tokio::test]
    async fn test_verbs_are_passed_unclamped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls");
        let volume = shell(&format!("echo \"$1 $2\" >> '{}'", log.display()));

        volume.set(150).await.unwrap();
        volume.increment(5).await.unwrap();
        volume.decrement(-3).await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls, "set 150\ninc 5\ndec -3\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_an_error() {
        let volume = shell("echo 'card busy' >&2; exit 3");
        let err = volume.set(10).await.unwrap_err();
        assert!(matches!(err, VolumeError::Failed { .. }));
        assert!(err.to_string().contains("card busy"));
    }

    #[tokio::test]
    async fn test_missing_command_is_a_spawn_error() {
        let volume = VolumeControl::new("/nonexistent/chvol", vec![], Duration::from_secs(1));
        assert!(matches!(volume.get().await, Err(VolumeError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_hung_command_times_out() {
        let volume = VolumeControl::new(
            "sh",
            vec!["-c".to_string(), "exec sleep 5".to_string()],
            Duration::from_millis(100),
        );
        let err = volume.get().await.unwrap_err();
        assert!(err.is_timeout());
    }
}
