//! Concurrent download+extract engine: a bounded pool of async tasks, each
//! downloading one archive (with checksum verification and mirror
//! failover) and extracting it into the destination tree.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering as AtomicOrdering},
    },
};

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::{
    http::{HttpClient, HttpError},
    resolver::QtPackage,
};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("extraction of {archive} failed: {source}")]
    Extraction {
        archive: String,
        #[source]
        source: sevenz_rust2::Error,
    },
    #[error("external extractor exited with status {status}")]
    ExternalExtractor { status: i32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("installation cancelled")]
    Cancelled,
}

pub struct InstallOptions {
    pub concurrency: usize,
    pub max_retries_on_connection: u32,
    pub max_retries_on_checksum_error: u32,
    pub keep_archives: bool,
    pub archive_download_location: Option<PathBuf>,
    pub external_7z: Option<PathBuf>,
}

/// Downloads and extracts every package in `packages` into `base_dir`,
/// bounded to `options.concurrency` concurrent workers.
pub async fn install(
    client: Arc<HttpClient>,
    packages: Vec<QtPackage>,
    base_dir: Utf8PathBuf,
    options: Arc<InstallOptions>,
) -> Result<(), InstallError> {
    tokio::fs::create_dir_all(base_dir.as_std_path()).await?;

    let archive_dest = options
        .archive_download_location
        .clone()
        .unwrap_or_else(|| base_dir.as_std_path().join(".aqtr-archives"));
    tokio::fs::create_dir_all(&archive_dest).await?;

    let cancelled = Arc::new(AtomicBool::new(false));
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut join_set = tokio::task::JoinSet::new();

    for package in packages {
        let client = Arc::clone(&client);
        let options = Arc::clone(&options);
        let base_dir = base_dir.clone();
        let archive_dest = archive_dest.clone();
        let cancelled = Arc::clone(&cancelled);
        let semaphore = Arc::clone(&semaphore);

        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            if cancelled.load(AtomicOrdering::Relaxed) {
                return Err(InstallError::Cancelled);
            }
            install_one(&client, &package, &base_dir, &archive_dest, &options).await
        });
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut first_error = None;
    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                warn!("received interrupt, cancelling remaining downloads");
                cancelled.store(true, AtomicOrdering::Relaxed);
                join_set.abort_all();
                return Err(InstallError::Cancelled);
            }
            result = join_set.join_next() => {
                match result {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(err))) => {
                        cancelled.store(true, AtomicOrdering::Relaxed);
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                    Some(Err(join_err)) => {
                        if join_err.is_panic() {
                            cancelled.store(true, AtomicOrdering::Relaxed);
                        }
                    }
                }
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }
    Ok(())
}

async fn install_one(
    client: &HttpClient,
    package: &QtPackage,
    base_dir: &Utf8PathBuf,
    archive_dest: &Path,
    options: &InstallOptions,
) -> Result<(), InstallError> {
    let archive_file = archive_dest.join(&package.archive);
    let expected_hash = client.get_hash_for(&package.archive_path).await?;

    let mut base_url = package.url().map_err(|_| {
        InstallError::Http(HttpError::Download {
            url: package.archive_path.clone(),
            status: reqwest::StatusCode::BAD_REQUEST,
        })
    })?;

    let mut connection_attempt = 0;
    let mut checksum_attempt = 0;
    loop {
        match client.download_binary(&base_url, &archive_file, &expected_hash).await {
            Ok(()) => break,
            Err(HttpError::Connection { .. }) if connection_attempt < options.max_retries_on_connection => {
                connection_attempt += 1;
                warn!(package = %package.name, connection_attempt, "connection error, switching mirror");
                base_url = client.alt_link(&base_url).await;
            }
            Err(HttpError::Checksum { .. }) if checksum_attempt < options.max_retries_on_checksum_error => {
                checksum_attempt += 1;
                warn!(package = %package.name, checksum_attempt, "checksum mismatch, switching mirror");
                base_url = client.alt_link(&base_url).await;
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(package = %package.name, "extracting {}", package.archive);
    extract(&archive_file, base_dir.as_std_path(), options.external_7z.as_deref()).await?;

    if !options.keep_archives {
        tokio::fs::remove_file(&archive_file).await.ok();
    }

    Ok(())
}

async fn extract(archive: &Path, dest: &Path, external_7z: Option<&Path>) -> Result<(), InstallError> {
    if let Some(sevenzip) = external_7z {
        let status = tokio::process::Command::new(sevenzip)
            .arg("x")
            .arg("-y")
            .arg(format!("-o{}", dest.display()))
            .arg(archive)
            .status()
            .await?;
        return if status.success() {
            Ok(())
        } else {
            Err(InstallError::ExternalExtractor {
                status: status.code().unwrap_or(-1),
            })
        };
    }

    let archive = archive.to_owned();
    let dest = dest.to_owned();
    tokio::task::spawn_blocking(move || {
        sevenz_rust2::decompress_file(&archive, &dest).map_err(|source| InstallError::Extraction {
            archive: archive.display().to_string(),
            source,
        })
    })
    .await
    .expect("extraction task panicked")
}
