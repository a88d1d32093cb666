//! Ties a resolved `SnapshotBackend`, object-store folder handle, and
//! `Config` together into the handful of operations the CLI dispatches to
//! (§4.9, §4.10). Resolving the folder once here and threading it through
//! is what breaks the cyclic "manager needs a folder id, folder resolution
//! needs a manager" dependency noted in §9.

use crate::chain;
use crate::chunk::RetryPolicy;
use crate::config::Config;
use crate::downloader;
use crate::error::Error;
use crate::lock::SubvolumeLock;
use crate::metadata::Metadata;
use crate::object_store::{ObjectStoreBackend, Quota};
use crate::snapshot::{self, SnapshotBackend};
use crate::uploader;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct SnapshotManager {
    store: Arc<dyn ObjectStoreBackend>,
    folder: String,
    backend: Arc<dyn SnapshotBackend>,
    config: Config,
}

impl SnapshotManager {
    pub async fn new(
        store: Arc<dyn ObjectStoreBackend>,
        config: Config,
        backend_name: &str,
    ) -> Result<Self, Error> {
        let folder = store.find_or_create_folder(&config.folder).await?;
        let backend = snapshot::resolve(backend_name)?;
        Ok(SnapshotManager { store, folder, backend, config })
    }

    fn chunk_retry(&self) -> RetryPolicy {
        RetryPolicy::scaled(self.config.retry_ratio)
    }

    fn metadata_retry(&self) -> RetryPolicy {
        RetryPolicy::unbounded(self.config.retry_ratio)
    }

    /// Takes a fresh local snapshot of `--subvolume`, diffs it against the
    /// most recent local snapshot (unless `--full`), and uploads the
    /// result. Guarded by a host-local advisory lock so two concurrent
    /// invocations for the same subvolume can't race (§5, §8 scenario 6).
    pub async fn backup(&self) -> Result<Metadata, Error> {
        let subvolume = &self.config.subvolume;
        let lock = SubvolumeLock::acquire(&self.config.tmp_dir, subvolume).await?;

        let started = std::time::Instant::now();
        let result = self.backup_locked().await;
        lock.release()?;

        info!(
            subvolume,
            elapsed = %humantime::format_duration(started.elapsed()),
            ok = result.is_ok(),
            "manager: backup finished"
        );
        result
    }

    async fn backup_locked(&self) -> Result<Metadata, Error> {
        let subvolume = &self.config.subvolume;

        let mut locals = self.backend.list_local(subvolume).await?;
        locals.sort();
        let parent_local = if self.config.full { None } else { locals.last().cloned() };

        let parent_uuid = if self.config.full {
            None
        } else {
            chain::find_latest(&self.store, &self.folder, subvolume).await?
        };

        let name = self.backend.create(subvolume).await?;
        let data = self.backend.stream_send(&name, parent_local.as_deref()).await?;

        let metadata = uploader::upload(
            self.store.clone(),
            self.folder.clone(),
            &data,
            self.backend.file_type(),
            subvolume,
            &name,
            self.config.passphrase.as_deref(),
            self.config.encryption,
            self.config.authentication,
            self.config.chunk_size_mib,
            &self.config.tmp_dir,
            parent_uuid,
            self.chunk_retry(),
            self.metadata_retry(),
        )
        .await?;

        chain::set_latest(&self.store, &self.folder, subvolume, metadata.uuid).await?;
        self.backend.cleanup(subvolume, &name).await?;

        info!(subvolume, uuid = %metadata.uuid, "manager: backup complete");
        Ok(metadata)
    }

    /// Uploads an already-existing local snapshot named `name` directly,
    /// without taking a new one (`--upload=<name>`, §6). Always sends a
    /// full stream rather than diffing against a local parent — unlike
    /// `backup`, there is no guarantee the snapshot immediately preceding
    /// `name` on disk is the one the chain's `parent_uuid` refers to.
    pub async fn upload(&self, name: &str) -> Result<Metadata, Error> {
        let subvolume = &self.config.subvolume;
        let parent_uuid = if self.config.full {
            None
        } else {
            chain::find_latest(&self.store, &self.folder, subvolume).await?
        };

        let data = self.backend.stream_send(name, None).await?;

        let metadata = uploader::upload(
            self.store.clone(),
            self.folder.clone(),
            &data,
            self.backend.file_type(),
            subvolume,
            name,
            self.config.passphrase.as_deref(),
            self.config.encryption,
            self.config.authentication,
            self.config.chunk_size_mib,
            &self.config.tmp_dir,
            parent_uuid,
            self.chunk_retry(),
            self.metadata_retry(),
        )
        .await?;

        chain::set_latest(&self.store, &self.folder, subvolume, metadata.uuid).await?;
        info!(subvolume, uuid = %metadata.uuid, "manager: uploaded existing snapshot");
        Ok(metadata)
    }

    /// Where a backup's plaintext lands on restore: `--restoretarget` as a
    /// directory prefix, joined with the original snapshot's name, or just
    /// the name itself if no target override was given.
    fn receive_target(&self, file_name: &str) -> String {
        match &self.config.restore_target {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), file_name),
            None => file_name.to_string(),
        }
    }

    /// Restores a single backup's plaintext via the backend resolved from
    /// `--restore` at construction. Does not walk `parent` — use
    /// `restore_chain` to apply a full incremental chain.
    pub async fn restore(&self, uuid: Uuid) -> Result<Metadata, Error> {
        let (record, plaintext) = downloader::download(
            self.store.clone(),
            self.folder.clone(),
            uuid,
            self.config.passphrase.as_deref(),
            &self.config.tmp_dir,
            self.chunk_retry(),
        )
        .await?;

        let target = self.receive_target(&record.file_name);
        self.backend.stream_receive(&target, &plaintext).await?;
        info!(%uuid, "manager: restored single backup");
        Ok(record)
    }

    /// Applies every backup in the chain ending at `uuid`, in root-to-leaf
    /// order, into a single long-lived restore target — skipping any
    /// snapshot whose metadata reports `total_size_in == 0` (§4.8, §8
    /// scenario 2) rather than aborting the whole chain.
    pub async fn restore_chain(&self, uuid: Uuid) -> Result<Vec<Uuid>, Error> {
        let chain = chain::build_chain(&self.store, &self.folder, uuid, self.chunk_retry()).await?;
        let mut applied = Vec::new();
        let mut previous_target: Option<String> = None;

        for record in &chain {
            let result = downloader::download(
                self.store.clone(),
                self.folder.clone(),
                record.uuid,
                self.config.passphrase.as_deref(),
                &self.config.tmp_dir,
                self.chunk_retry(),
            )
            .await;

            let (_, plaintext) = match result {
                Ok(pair) => pair,
                Err(e) if e.kind() == "no_data" => {
                    info!(uuid = %record.uuid, "manager: skipping empty backup in chain");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let target = self.receive_target(&record.file_name);
            self.backend.stream_receive(&target, &plaintext).await?;
            applied.push(record.uuid);

            // Only reclaim the previous local snapshot once the next one
            // has landed successfully, so an incremental apply always has
            // a parent to diff against if it's interrupted (§4.8).
            if let Some(prev) = previous_target.replace(target.clone()) {
                if prev != target {
                    let _ = self.backend.delete(&prev).await;
                }
            }
        }

        info!(%uuid, applied = applied.len(), "manager: restored chain");
        Ok(applied)
    }

    pub async fn list(&self) -> Result<Vec<Metadata>, Error> {
        match chain::find_latest(&self.store, &self.folder, &self.config.subvolume).await? {
            Some(latest) => chain::build_chain(&self.store, &self.folder, latest, self.chunk_retry()).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn chain(&self) -> Result<Vec<Metadata>, Error> {
        self.list().await
    }

    pub async fn latest(&self) -> Result<Option<Uuid>, Error> {
        chain::find_latest(&self.store, &self.folder, &self.config.subvolume).await
    }

    pub async fn quota(&self) -> Result<Quota, Error> {
        self.store.quota().await
    }

    pub async fn cleanup(&self) -> Result<usize, Error> {
        chain::cleanup(&self.store, &self.folder, &self.config.subvolume, self.chunk_retry()).await
    }
}
