use clap::Parser;
use ozb::config::{Cli, Config};
use ozb::manager::SnapshotManager;
use ozb::object_store::LocalFsBackend;
use ozb::Error;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .parse_lossy("ozb=info,hyper=warn"),
        )
        .init();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = e.kind(), "{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let config = Config::from_cli(&cli)?;

    let store = Arc::new(LocalFsBackend::new(config.store_root.clone()));
    let backend_name = cli
        .backup
        .as_deref()
        .or(cli.restore.as_deref())
        .unwrap_or("discard");
    let manager = SnapshotManager::new(store, config, backend_name).await?;

    let mut did_something = false;

    if let Some(name) = &cli.upload {
        let metadata = manager.upload(name).await?;
        println!("uploaded {} as {}", name, metadata.uuid);
        did_something = true;
    } else if cli.backup.is_some() {
        let metadata = manager.backup().await?;
        println!("backed up {} as {}", metadata.subvolume, metadata.uuid);
        did_something = true;
    } else if let Some(uuid) = cli.download {
        let applied = manager.restore_chain(uuid).await?;
        println!("restored {} backup(s) ending at {}", applied.len(), uuid);
        did_something = true;
    } else if cli.list || cli.chain {
        for record in manager.chain().await? {
            println!(
                "{}  {}  parent={}  total_size={}  total_size_in={}",
                record.uuid,
                record.file_name,
                if record.parent.is_empty() { "-" } else { &record.parent },
                record.total_size,
                record.total_size_in,
            );
        }
        did_something = true;
    } else if cli.quota {
        let quota = manager.quota().await?;
        match quota.limit {
            Some(limit) => println!("{} / {} bytes used", quota.used, limit),
            None => println!("{} bytes used (no limit reported)", quota.used),
        }
        did_something = true;
    } else if cli.latest {
        match manager.latest().await? {
            Some(uuid) => println!("{uuid}"),
            None => println!("(no backups yet)"),
        }
        did_something = true;
    }

    // --cleanup runs after a backup or standalone, never gated behind the
    // if/else-if chain above: it's valid alongside --backup in the same
    // invocation.
    if cli.cleanup {
        let deleted = manager.cleanup().await?;
        println!("reclaimed {deleted} orphaned object(s)");
        did_something = true;
    }

    if !did_something {
        eprintln!("nothing to do: pass one of --upload, --backup, --download, --list, --chain, --quota, --latest, --cleanup");
    }

    Ok(())
}
