use crate::errors::{HmvError, Result};
use crate::transport::{ChunkStream, Connector, Transport};
use crate::{archive_file_name, Endpoints, Notifier, REQUEST_TIMEOUT};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;

/// Size of the blocks written to disk.
pub const CHUNK_SIZE: usize = 8192;
/// Minimum time between two progress updates while a body is streaming.
pub const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Fetches `<lowercased-name>.zip` from the download host into `dest_dir`.
/// No authentication is involved. The body is streamed into a `.part` file
/// that only takes the final name once complete, so a failed download leaves
/// nothing behind. Client error statuses mean the machine does not exist, as
/// do names that would place the archive outside `dest_dir`.
#[tracing::instrument(skip(connector, endpoints, notifier))]
pub async fn download_machine<C: Connector>(
    connector: &C,
    endpoints: &Endpoints,
    machine_name: &str,
    dest_dir: &Path,
    notifier: &Notifier,
) -> Result<Downloaded> {
    if !is_plain_name(machine_name) {
        tracing::error!("Refusing machine name {:?}", machine_name);
        return Err(HmvError::MachineNotFound(machine_name.to_string()));
    }
    let file_name = archive_file_name(machine_name);
    let url = endpoints.archive_url(machine_name)?;
    let client = connector.connect(None)?;

    notifier.info(format!("Downloading {file_name} from HackMyVM..."));
    let stream = match client.open_stream(&url, REQUEST_TIMEOUT).await {
        Ok(s) => s,
        Err(HmvError::ErrorStatusCode { status_code, url }) if (400..500).contains(&status_code) => {
            tracing::error!("Archive request rejected : {} => {}", url, status_code);
            return Err(HmvError::MachineNotFound(machine_name.to_string()));
        }
        Err(e) => return Err(e),
    };

    let destination = dest_dir.join(&file_name);
    let partial = dest_dir.join(format!("{file_name}.part"));
    match write_stream(stream, &partial, &file_name, notifier, PROGRESS_UPDATE_INTERVAL).await {
        Ok(bytes_written) => {
            fs::rename(&partial, &destination)
                .await
                .map_err(|e| HmvError::file_error(&destination, e))?;
            tracing::debug!("Download completed for {}, file @ {:?}", url, destination);
            Ok(Downloaded {
                path: destination,
                bytes_written,
            })
        }
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(&partial).await {
                tracing::debug!("Could not remove {:?} : {}", partial, remove_err);
            }
            Err(e)
        }
    }
}

/// Machine names end up in a local file name, so they must not carry path
/// separators or parent references.
fn is_plain_name(machine_name: &str) -> bool {
    let name = machine_name.trim();
    !name.is_empty() && !name.contains(|c| c == '/' || c == '\\') && !name.contains("..")
}

async fn write_stream(
    mut stream: Box<dyn ChunkStream>,
    partial: &Path,
    resource_name: &str,
    notifier: &Notifier,
    update_interval: Duration,
) -> Result<u64> {
    let file = File::create(partial)
        .await
        .map_err(|e| HmvError::file_error(partial, e))?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let file_size = stream.content_length().unwrap_or(0);
    let mut bytes_written = 0u64;
    let mut last_update_time = Instant::now();

    while let Some(chunk) = stream.next_chunk().await? {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| HmvError::file_error(partial, e))?;
        bytes_written += chunk.len() as u64;
        if last_update_time.elapsed() >= update_interval {
            notifier.progress(resource_name, bytes_written, file_size);
            last_update_time = Instant::now();
        }
    }
    writer
        .flush()
        .await
        .map_err(|e| HmvError::file_error(partial, e))?;
    notifier.progress(
        resource_name,
        bytes_written,
        if file_size == 0 { bytes_written } else { file_size },
    );
    Ok(bytes_written)
}
