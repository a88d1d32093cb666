use super::{require_snapshot_separator, snapshot_name, SnapshotBackend};
use crate::error::Error;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

/// Shells out to the host's `zfs` binary (§4.2). A `keep` hold is placed
/// on every snapshot at creation so an in-progress upload can't be pruned
/// out from under the backend, and released before the snapshot is
/// destroyed.
#[derive(Debug, Default)]
pub struct ZfsBackend;

impl ZfsBackend {
    pub fn new() -> Self {
        ZfsBackend
    }
}

async fn blocking<F, T>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::TransientTransport(format!("blocking task panicked: {e}")))?
}

#[async_trait]
impl SnapshotBackend for ZfsBackend {
    fn file_type(&self) -> &'static str {
        "zfs"
    }

    async fn list_local(&self, _subvolume: &str) -> Result<Vec<String>, Error> {
        blocking(|| {
            let args: Vec<String> = vec!["list".into(), "-Ht".into(), "snapshot".into()];
            let output = duct::cmd("zfs", args).stdout_capture().run()?;
            let text = String::from_utf8_lossy(&output.stdout);
            Ok(text
                .lines()
                .filter_map(|line| line.split('\t').next())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect())
        })
        .await
    }

    async fn create(&self, subvolume: &str) -> Result<String, Error> {
        let name = snapshot_name(subvolume, Utc::now().timestamp());
        let snapshot = name.clone();
        blocking(move || {
            duct::cmd("zfs", vec!["snapshot".to_string(), snapshot.clone()]).run()?;
            duct::cmd("zfs", vec!["hold".to_string(), "keep".to_string(), snapshot]).run()?;
            Ok(())
        })
        .await?;
        info!(snapshot = %name, "zfs: created snapshot");
        Ok(name)
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        require_snapshot_separator(name)?;
        let name = name.to_string();
        blocking(move || {
            duct::cmd("zfs", vec!["release".to_string(), "-r".to_string(), "keep".to_string(), name.clone()])
                .run()?;
            duct::cmd("zfs", vec!["destroy".to_string(), name]).run()?;
            Ok(())
        })
        .await
    }

    async fn stream_send(&self, name: &str, parent: Option<&str>) -> Result<Vec<u8>, Error> {
        let name = name.to_string();
        let parent = parent.map(str::to_string);
        blocking(move || {
            let args: Vec<String> = match parent {
                Some(p) => vec!["send".into(), "-i".into(), p, name],
                None => vec!["send".into(), name],
            };
            let output = duct::cmd("zfs", args).stdout_capture().run()?;
            Ok(output.stdout)
        })
        .await
    }

    async fn stream_receive(&self, target: &str, data: &[u8]) -> Result<(), Error> {
        let target = target.to_string();
        let data = data.to_vec();
        blocking(move || {
            let args: Vec<String> = vec!["receive".into(), "-F".into(), target];
            duct::cmd("zfs", args).stdin_bytes(data).run()?;
            Ok(())
        })
        .await
    }

    async fn cleanup(&self, subvolume: &str, keep: &str) -> Result<(), Error> {
        debug!(subvolume, "zfs: cleanup");
        let prefix = format!("{subvolume}@");
        for snap in self.list_local(subvolume).await? {
            if snap == keep || !snap.starts_with(&prefix) {
                continue;
            }
            self.delete(&snap).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_rejects_names_without_separator() {
        let backend = ZfsBackend::new();
        assert!(backend.delete("tank/data").await.is_err());
    }
}
