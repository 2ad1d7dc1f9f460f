use futures_util::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use papertrade_ports::{FeedError, RawTick, TickReceiver};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Open a WebSocket, optionally send one subscribe frame, and forward every
/// text frame `parse` turns into a tick. `Ok(None)` skips a frame quietly;
/// frames that fail to decode are logged and skipped.
///
/// The returned receiver ends when the socket closes or errors. Dropping the
/// receiver closes the socket.
pub(super) async fn stream_ticks(
    url: &str,
    subscribe: Option<String>,
    buffer: usize,
    parse: fn(&str) -> Result<Option<RawTick>, serde_json::Error>,
) -> Result<TickReceiver, FeedError> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| FeedError::Connect(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    if let Some(request) = subscribe {
        write
            .send(Message::Text(request.into()))
            .await
            .map_err(|e| FeedError::Protocol(e.to_string()))?;
    }

    let (tx, rx) = mpsc::channel(buffer);
    let url = url.to_string();

    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = tx.closed() => break,
                msg = read.next() => msg,
            };
            match msg {
                Some(Ok(Message::Text(text))) => match parse(&text) {
                    Ok(Some(tick)) => {
                        if tx.send(tick).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => trace!("Ignoring frame: {}", text.as_str()),
                    Err(e) => warn!("{} sent an undecodable frame ({}): {}", url, e, text.as_str()),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!("{} closed: {:?}", url, frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("{} read error: {}", url, e);
                    break;
                }
                None => break,
            }
        }
        let _ = write.close().await;
    });

    Ok(rx)
}
