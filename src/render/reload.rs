//! Proxy reload invocation.
//!
//! The proxy is (re)started as a daemon that writes its PID file. When an
//! earlier instance's PID file is readable, its PIDs are passed with `-sf` so
//! the new process takes over gracefully.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::ProxyConfig;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} exited with {status}")]
    Exit { binary: String, status: ExitStatus },
}

/// Starts or gracefully reloads the proxy.
#[async_trait]
pub trait ProxyReloader: Send + Sync {
    async fn reload(&self, config_path: &Path) -> Result<(), ReloadError>;
}

/// Reloads HAProxy through its command line.
#[derive(Debug, Clone)]
pub struct HaproxyReloader {
    binary: String,
    pid_file: PathBuf,
}

impl HaproxyReloader {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            pid_file: PathBuf::from(&config.pid_file),
        }
    }

    /// Arguments for a reload given the previous instance's PIDs.
    pub fn command_args(&self, config_path: &Path, previous_pids: &[String]) -> Vec<String> {
        let mut args = vec![
            "-D".to_string(),
            "-p".to_string(),
            self.pid_file.display().to_string(),
            "-f".to_string(),
            config_path.display().to_string(),
        ];
        if !previous_pids.is_empty() {
            args.push("-sf".to_string());
            args.extend(previous_pids.iter().cloned());
        }
        args
    }
}

/// PIDs listed in `pid_file`. A missing or unreadable file means no prior
/// instance and yields an empty list.
pub fn read_previous_pids(pid_file: &Path) -> Vec<String> {
    match std::fs::read_to_string(pid_file) {
        Ok(contents) => contents.split_whitespace().map(str::to_string).collect(),
        Err(e) => {
            tracing::debug!(pid_file = %pid_file.display(), error = %e, "No previous proxy instance");
            Vec::new()
        }
    }
}

#[async_trait]
impl ProxyReloader for HaproxyReloader {
    async fn reload(&self, config_path: &Path) -> Result<(), ReloadError> {
        let previous = read_previous_pids(&self.pid_file);
        let args = self.command_args(config_path, &previous);

        tracing::info!(binary = %self.binary, handover_pids = previous.len(), "Reloading proxy");
        let status = Command::new(&self.binary)
            .args(&args)
            .status()
            .await
            .map_err(|source| ReloadError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ReloadError::Exit {
                binary: self.binary.clone(),
                status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reloader(pid_file: &str) -> HaproxyReloader {
        HaproxyReloader::new(&ProxyConfig {
            binary: "/usr/sbin/haproxy".into(),
            pid_file: pid_file.into(),
        })
    }

    #[test]
    fn test_plain_start_without_previous_pids() {
        let args = reloader("/run/haproxy.pid").command_args(Path::new("/srv/haproxy.cfg"), &[]);
        assert_eq!(args, vec!["-D", "-p", "/run/haproxy.pid", "-f", "/srv/haproxy.cfg"]);
    }

    #[test]
    fn test_graceful_handover() {
        let args = reloader("/run/haproxy.pid")
            .command_args(Path::new("/srv/haproxy.cfg"), &["12".to_string(), "13".to_string()]);
        assert_eq!(
            args,
            vec!["-D", "-p", "/run/haproxy.pid", "-f", "/srv/haproxy.cfg", "-sf", "12", "13"]
        );
    }

    #[test]
    fn test_read_previous_pids() {
        let path = std::env::temp_dir().join(format!("lbc-pids-{}.pid", std::process::id()));
        std::fs::write(&path, "101\n102 103\n").unwrap();
        assert_eq!(read_previous_pids(&path), vec!["101", "102", "103"]);
        std::fs::remove_file(&path).unwrap_or_default();

        assert!(read_previous_pids(Path::new("/nonexistent/haproxy.pid")).is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let reloader = HaproxyReloader::new(&ProxyConfig {
            binary: "/nonexistent/haproxy".into(),
            pid_file: "/nonexistent/haproxy.pid".into(),
        });
        let err = reloader.reload(Path::new("/tmp/haproxy.cfg")).await.unwrap_err();
        assert!(matches!(err, ReloadError::Spawn { .. }));
    }
}
