use super::{require_snapshot_separator, SnapshotBackend};
use crate::error::Error;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

/// Where local read-only snapshots live. The source hashes the subvolume
/// name into this path with a CRC32; this implementation flattens the
/// subvolume path instead (replacing `/` with `_`), which is simpler and
/// avoids a dependency purely for a filename-safety transform.
const SNAPSHOT_DIR: &str = "/var/backups/snapshots";

fn flatten(subvolume: &str) -> String {
    subvolume.trim_matches('/').replace('/', "_")
}

/// Shells out to the host's `btrfs` binary (§4.2).
#[derive(Debug, Default)]
pub struct BtrfsBackend;

impl BtrfsBackend {
    pub fn new() -> Self {
        BtrfsBackend
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

fn parse_subvolume_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_once(" path ").map(|(_, path)| format!("/{path}")))
        .collect()
}

#[async_trait]
impl SnapshotBackend for BtrfsBackend {
    fn file_type(&self) -> &'static str {
        "btrfs"
    }

    async fn list_local(&self, _subvolume: &str) -> Result<Vec<String>, Error> {
        blocking(|| {
            std::fs::create_dir_all(SNAPSHOT_DIR)?;
            let args: Vec<String> = vec!["subvolume".into(), "list".into(), "-ros".into(), SNAPSHOT_DIR.into()];
            let output = duct::cmd("btrfs", args).stdout_capture().run()?;
            Ok(parse_subvolume_list(&String::from_utf8_lossy(&output.stdout)))
        })
        .await
    }

    async fn create(&self, subvolume: &str) -> Result<String, Error> {
        let snapshot_path = format!("{SNAPSHOT_DIR}/{}@{}", flatten(subvolume), Utc::now().timestamp());
        let subvolume = subvolume.to_string();
        let target = snapshot_path.clone();
        blocking(move || {
            std::fs::create_dir_all(SNAPSHOT_DIR)?;
            let args: Vec<String> = vec!["subvolume".into(), "snapshot".into(), "-r".into(), subvolume, target];
            duct::cmd("btrfs", args).run()?;
            Ok(())
        })
        .await?;
        info!(snapshot = %snapshot_path, "btrfs: created snapshot");
        Ok(snapshot_path)
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        require_snapshot_separator(name)?;
        let name = name.to_string();
        blocking(move || {
            let args: Vec<String> = vec!["subvolume".into(), "delete".into(), name];
            duct::cmd("btrfs", args).run()?;
            Ok(())
        })
        .await
    }

    async fn stream_send(&self, name: &str, parent: Option<&str>) -> Result<Vec<u8>, Error> {
        let name = name.to_string();
        let parent = parent.map(str::to_string);
        blocking(move || {
            let args: Vec<String> = match parent {
                Some(p) => vec!["send".into(), "-p".into(), p, name],
                None => vec!["send".into(), name],
            };
            let output = duct::cmd("btrfs", args).stdout_capture().run()?;
            Ok(output.stdout)
        })
        .await
    }

    async fn stream_receive(&self, target: &str, data: &[u8]) -> Result<(), Error> {
        let target = target.to_string();
        let data = data.to_vec();
        blocking(move || {
            std::fs::create_dir_all(&target)?;
            let args: Vec<String> = vec!["receive".into(), target];
            duct::cmd("btrfs", args).stdin_bytes(data).run()?;
            Ok(())
        })
        .await
    }

    async fn cleanup(&self, subvolume: &str, keep: &str) -> Result<(), Error> {
        debug!(subvolume, "btrfs: cleanup");
        let prefix = format!("{SNAPSHOT_DIR}/{}@", flatten(subvolume));
        for snap in self.list_local(subvolume).await? {
            if snap == keep || !snap.starts_with(&prefix) {
                continue;
            }
            self.delete(&snap).await?;
        }
        Ok(())
    }
}
