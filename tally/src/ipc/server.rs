//! Unix domain socket server: the device end of the channel.
//!
//! The socket task never touches app state. It turns the connection
//! lifecycle and incoming lines into a stream of [`ChannelEvent`]s
//! consumed by the run loop, and drains an outbound queue onto the
//! current peer. One peer at a time; a new connection is only
//! accepted once the previous one is gone, which is all the peer
//! model of the protocol requires.

use anyhow::Result;
use std::sync::mpsc;
use tally_ipc::{decode_line, write_line, Envelope, SOCKET_PATH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

#[derive(Debug)]
pub enum ChannelEvent {
    /// A peer connected; the run loop answers with a soft resync.
    Opened,
    Message(Envelope),
    Closed,
}

pub async fn start(
    events: mpsc::Sender<ChannelEvent>,
    mut outbound: UnboundedReceiver<Envelope>,
) -> Result<()> {
    // Remove old socket if it exists
    let _ = std::fs::remove_file(SOCKET_PATH);

    let listener = UnixListener::bind(SOCKET_PATH)?;
    info!("channel listening on {}", SOCKET_PATH);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                info!("peer connected");
                if events.send(ChannelEvent::Opened).is_err() {
                    return Ok(());
                }
                if let Err(e) = serve_peer(stream, &events, &mut outbound).await {
                    warn!("peer connection ended: {e}");
                }
                if events.send(ChannelEvent::Closed).is_err() {
                    return Ok(());
                }
            }
            Err(e) => {
                error!("error accepting connection: {e}");
            }
        }
    }
}

async fn serve_peer(
    stream: UnixStream,
    events: &mpsc::Sender<ChannelEvent>,
    outbound: &mut UnboundedReceiver<Envelope>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => match decode_line(&line) {
                    Ok(envelope) => {
                        if events.send(ChannelEvent::Message(envelope)).is_err() {
                            return Ok(());
                        }
                    }
                    // Shape-mismatched input rejects that message only.
                    Err(e) => error!("rejecting malformed message: {e}"),
                },
                None => return Ok(()),
            },
            envelope = outbound.recv() => match envelope {
                Some(envelope) => write_line(&mut writer, &envelope).await?,
                None => return Ok(()),
            },
        }
    }
}
