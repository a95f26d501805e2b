//! Storage in the `pass` password manager.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CredentialStore, StoreError, StoreResult};

/// Message `pass show` prints for unknown entries.
const NOT_FOUND: &str = "is not in the password store";

/// Entries of the `pass` password store.
#[derive(Debug, Clone)]
pub struct PassStore {
    program: String,
}

impl Default for PassStore {
    fn default() -> Self {
        Self::new("pass")
    }
}

impl PassStore {
    /// Uses `program` as the `pass` executable.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, action: &'static str, args: &[&str], input: &[u8]) -> StoreResult<std::process::Output> {
        info!(program = self.program, action, "Run pass command");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if input.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
        }

        let output = child.wait_with_output().await?;
        debug!(status = %output.status, "pass command exited");
        Ok(output)
    }
}

impl CredentialStore for PassStore {
    async fn load(&self, key: &str) -> StoreResult<Option<String>> {
        let output = self.run("show", &["show", key], &[]).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            return String::from_utf8(output.stdout)
                .map(Some)
                .map_err(|_| StoreError::NotUtf8(key.to_string()));
        }
        if stderr.contains(NOT_FOUND) {
            debug!(key, "No pass entry");
            return Ok(None);
        }

        Err(StoreError::Pass {
            action: "show",
            key: key.to_string(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }

    async fn store(&self, key: &str, value: &str) -> StoreResult<()> {
        let output = self
            .run("insert", &["insert", "--multiline", "--force", key], value.as_bytes())
            .await?;

        if output.status.success() {
            return Ok(());
        }
        Err(StoreError::Pass {
            action: "insert",
            key: key.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;

    /// Writes a stand-in for `pass` keeping entries as files in `dir`.
    fn fake_pass(dir: &Path) -> String {
        let script = dir.join("pass");
        let body = format!(
            r#"#!/bin/sh
store="{store}"
case "$1" in
  show)
    if [ -f "$store/$2" ]; then cat "$store/$2"; else echo "Error: $2 {NOT_FOUND}." >&2; exit 1; fi ;;
  insert)
    cat > "$store/$4" ;;
  *)
    echo "unexpected $1" >&2; exit 2 ;;
esac
"#,
            store = dir.display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.display().to_string()
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = PassStore::new(fake_pass(dir.path()));
        assert!(store.load("oauth2ms").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_then_show() {
        let dir = tempfile::tempdir().unwrap();
        let store = PassStore::new(fake_pass(dir.path()));

        store.store("oauth2ms", "{\"version\":1}").await.unwrap();
        assert_eq!(
            store.load("oauth2ms").await.unwrap().as_deref(),
            Some("{\"version\":1}")
        );
    }

    #[tokio::test]
    async fn test_missing_program() {
        let store = PassStore::new("/nonexistent/pass");
        assert!(matches!(
            store.load("oauth2ms").await,
            Err(StoreError::Io(_))
        ));
    }
}
