//! Outbound peer dialing. A joining node connects to every URL in `PEERS`
//! before announcing itself; each dialed socket is bridged to the runner
//! exactly like an accepted one.

use crate::runner::RunnerHandle;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use shared_types::PeerMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};

/// Dial one bootstrap peer and bridge it to the runner.
pub async fn dial(handle: RunnerHandle, url: &str) -> Result<()> {
    let (socket, _) = connect_async(url)
        .await
        .with_context(|| format!("dialing bootstrap peer {url}"))?;
    info!(%url, "bootstrap peer connected");
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<PeerMessage>();
    let conn = handle.register(tx);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let reader = handle.clone();
    tokio::spawn(async move {
        while let Some(Ok(frame)) = stream.next().await {
            match frame {
                Message::Text(text) => match serde_json::from_str::<PeerMessage>(text.as_str()) {
                    Ok(msg) => reader.frame(conn, msg),
                    Err(err) => debug!(conn, %err, "undecodable frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        reader.disconnect(conn);
    });

    Ok(())
}

/// Dial every bootstrap peer, then nudge the runner: a master starts its
/// mining tick, a joiner broadcasts its join announcement.
pub async fn connect_all(handle: &RunnerHandle, peers: &[String]) -> Result<()> {
    for url in peers {
        dial(handle.clone(), url).await?;
    }
    handle.bootstrap();
    Ok(())
}
