//! The companion publisher: relays settings changes to the device and
//! answers its resync requests.
//!
//! Delivery is push-based and best-effort. There is no outbound
//! queue: a push that cannot be delivered is dropped and the
//! persisted `needsSync` flag raised instead, because the device
//! always asks for a soft resync when the channel comes back.

use crate::store::Store;
use anyhow::Result;
use std::io;
use std::path::Path;
use tally_ipc::{
    decode_line, write_line, Envelope, IpcError, ProjectOperation, SettingMessage, HARD_RESYNC,
    SOCKET_PATH, SOFT_RESYNC,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, error, info, warn};

async fn connect() -> Result<UnixStream, IpcError> {
    UnixStream::connect(SOCKET_PATH).await.map_err(|e| {
        if matches!(e.kind(), io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound) {
            IpcError::ConnectionRefused
        } else {
            IpcError::Io(e)
        }
    })
}

/// Pushes changed pairs to the device. On any failure the whole push
/// is abandoned and `needsSync` is persisted instead of retrying.
pub async fn push_changes(store: &mut Store, changed: Vec<SettingMessage>) -> Result<()> {
    if changed.is_empty() {
        return Ok(());
    }
    if let Err(e) = try_push(&changed).await {
        warn!("push failed ({e}); flagging for a later resync");
        store.set_needs_sync(true);
        store.save()?;
    }
    Ok(())
}

async fn try_push(changed: &[SettingMessage]) -> Result<(), IpcError> {
    let mut stream = connect().await?;
    for msg in changed {
        write_line(&mut stream, &Envelope::Setting(msg.clone())).await?;
    }
    Ok(())
}

/// Fire-and-forget delivery of a project operation. The editor has no
/// authority over counters, so an unreachable device simply loses the
/// operation; it is never queued or retried.
pub async fn push_operation(op: ProjectOperation) {
    match connect().await {
        Ok(mut stream) => {
            if let Err(e) = write_line(&mut stream, &Envelope::Operation(op)).await {
                error!("failed to send project operation: {e}");
            }
        }
        Err(e) => error!("device unreachable; project operation dropped: {e}"),
    }
}

/// Full snapshot republish over a fresh connection, then clears the
/// dirty flag. Used by the administrative `sync` command.
pub async fn sync_all(store: &mut Store) -> Result<()> {
    let mut stream = connect().await?;
    sync_all_to(&mut stream, store).await
}

async fn sync_all_to<W>(writer: &mut W, store: &mut Store) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    info!("republishing full settings snapshot");
    for msg in store.snapshot() {
        write_line(writer, &Envelope::Setting(msg)).await?;
    }
    store.set_needs_sync(false);
    store.save()?;
    Ok(())
}

/// Long-running publisher loop: stays connected to the device and
/// answers resync requests, reconnecting when the device goes away.
pub async fn serve(store_path: &Path) -> Result<()> {
    info!("companion publisher running against {}", SOCKET_PATH);
    loop {
        match connect().await {
            Ok(stream) => {
                info!("connected to device");
                match run_connection(stream, store_path).await {
                    Ok(()) => info!("device closed the connection"),
                    Err(e) => warn!("connection ended: {e}"),
                }
            }
            Err(e) => debug!("device not reachable: {e}"),
        }
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

async fn run_connection(stream: UnixStream, store_path: &Path) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        match decode_line(&line) {
            Ok(Envelope::Control(token)) if token == HARD_RESYNC => {
                let mut store = Store::open(store_path)?;
                sync_all_to(&mut writer, &mut store).await?;
            }
            Ok(Envelope::Control(token)) if token == SOFT_RESYNC => {
                // Reload from disk: another tallyctl invocation may
                // have edited the store since this process started.
                let mut store = Store::open(store_path)?;
                if store.needs_sync() {
                    sync_all_to(&mut writer, &mut store).await?;
                } else {
                    debug!("soft resync requested but nothing is pending");
                }
            }
            Ok(other) => debug!("ignoring message: {other:?}"),
            Err(e) => error!("rejecting malformed message: {e}"),
        }
    }
    Ok(())
}
