//! WebSocket subscription to CometBFT `NewBlockHeader` events.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chaintxindex_core::client::HeaderSubscription;
use chaintxindex_core::error::IndexerError;
use chaintxindex_core::types::NewBlockHeader;

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse, RpcId};
use crate::wire::parse_header_event;

/// Event query for new block headers.
pub const NEW_BLOCK_HEADER_QUERY: &str = "tm.event='NewBlockHeader'";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type HeaderSender = mpsc::UnboundedSender<Result<NewBlockHeader, IndexerError>>;

fn sub_err(e: impl std::fmt::Display) -> IndexerError {
    IndexerError::Subscription(e.to_string())
}

/// Connect to `url`, subscribe to new block headers and return the stream.
///
/// Returns once the node has acknowledged the subscription. A background
/// task then forwards every header; it ends the stream with an `Err` when
/// the socket fails or closes, and exits when the receiver is dropped.
pub async fn subscribe_new_block_headers(
    url: &str,
    subscriber: &str,
) -> Result<HeaderSubscription, IndexerError> {
    tracing::info!(url = %url, subscriber, "subscribing to new block headers");

    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| sub_err(format!("connect {url}: {e}")))?;
    let (mut sink, mut source) = ws.split();

    let req = JsonRpcRequest::new(
        RpcId::String(subscriber.to_string()),
        "subscribe",
        json!({ "query": NEW_BLOCK_HEADER_QUERY }),
    );
    let text = serde_json::to_string(&req).map_err(sub_err)?;
    sink.send(Message::Text(text.into())).await.map_err(sub_err)?;

    let (tx, rx) = mpsc::unbounded_channel();

    // The first message answers the subscribe call.
    loop {
        match source.next().await {
            None => return Err(sub_err("websocket closed before subscribe was acknowledged")),
            Some(Err(e)) => return Err(sub_err(e)),
            Some(Ok(Message::Text(text))) => {
                if let Some(header) = handle_text(&text)? {
                    // Ack and first event arrived in one burst; keep it.
                    let _ = tx.send(Ok(header));
                }
                break;
            }
            Some(Ok(Message::Close(_))) => {
                return Err(sub_err("websocket closed before subscribe was acknowledged"))
            }
            Some(Ok(_)) => {}
        }
    }

    tokio::spawn(forward_headers(sink, source, tx));
    Ok(rx)
}

/// Decode one text frame. `Ok(None)` for the subscribe acknowledgement.
fn handle_text(text: &str) -> Result<Option<NewBlockHeader>, IndexerError> {
    let resp: JsonRpcResponse = serde_json::from_str(text)
        .map_err(|e| sub_err(format!("invalid message from node: {e}")))?;
    let result = resp
        .into_result()
        .map_err(|e| sub_err(e.detail()))?;
    parse_header_event(result)
}

async fn forward_headers(mut sink: WsSink, mut source: WsSource, tx: HeaderSender) {
    loop {
        tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("header receiver dropped, closing websocket");
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            msg = source.next() => {
                let failure = match msg {
                    None => sub_err("websocket closed"),
                    Some(Err(e)) => sub_err(e),
                    Some(Ok(Message::Text(text))) => match handle_text(&text) {
                        Ok(Some(header)) => {
                            if tx.send(Ok(header)).is_err() {
                                return;
                            }
                            continue;
                        }
                        Ok(None) => continue,
                        Err(e) => e,
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        sub_err(format!("websocket closed by node: {frame:?}"))
                    }
                    Some(Ok(_)) => continue,
                };
                tracing::warn!(error = %failure, "header subscription ended");
                let _ = tx.send(Err(failure));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    const ACK: &str = r#"{"jsonrpc":"2.0","id":"EVMIndexerService","result":{}}"#;

    fn header_event(height: u64) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": "EVMIndexerService",
            "result": {
                "query": NEW_BLOCK_HEADER_QUERY,
                "data": {
                    "type": "tendermint/event/NewBlockHeader",
                    "value": { "header": { "height": height.to_string() } }
                }
            }
        })
        .to_string()
    }

    /// Accept one WebSocket client, answer its subscribe call, then hand the
    /// socket to `then`.
    async fn node<F, Fut>(then: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            match ws.next().await {
                Some(Ok(Message::Text(req))) => {
                    let req: serde_json::Value = serde_json::from_str(&req).unwrap();
                    assert_eq!(req["method"], "subscribe");
                    assert_eq!(req["id"], "EVMIndexerService");
                    assert_eq!(req["params"]["query"], NEW_BLOCK_HEADER_QUERY);
                }
                other => panic!("expected subscribe, got {other:?}"),
            }
            ws.send(Message::Text(ACK.into())).await.unwrap();
            then(ws).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn forwards_headers_then_reports_close() {
        let url = node(|mut ws| async move {
            ws.send(Message::Text(header_event(812).into())).await.unwrap();
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        })
        .await;

        let mut rx = subscribe_new_block_headers(&url, "EVMIndexerService")
            .await
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(first.unwrap().unwrap(), NewBlockHeader { height: 812 });

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(matches!(second, Some(Err(IndexerError::Subscription(_)))));

        // The forwarding task has exited and dropped its sender.
        let end = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn dropping_receiver_closes_socket() {
        let (closed_tx, closed_rx) = oneshot::channel();
        let url = node(|mut ws| async move {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) => {
                        let _ = closed_tx.send(true);
                        return;
                    }
                    Some(Ok(_)) => {}
                    _ => {
                        let _ = closed_tx.send(false);
                        return;
                    }
                }
            }
        })
        .await;

        let rx = subscribe_new_block_headers(&url, "EVMIndexerService")
            .await
            .unwrap();
        drop(rx);

        let got_close = tokio::time::timeout(Duration::from_secs(5), closed_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(got_close, "node saw the socket drop without a Close frame");
    }

    #[tokio::test]
    async fn close_before_ack_fails_subscribe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let err = subscribe_new_block_headers(&format!("ws://{addr}"), "EVMIndexerService")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Subscription(_)));
    }

    #[test]
    fn ack_yields_nothing() {
        let ack = r#"{"jsonrpc":"2.0","id":"EVMIndexerService","result":{}}"#;
        assert!(handle_text(ack).unwrap().is_none());
    }

    #[test]
    fn event_yields_header() {
        let event = r#"{"jsonrpc":"2.0","id":"EVMIndexerService","result":{
            "query":"tm.event='NewBlockHeader'",
            "data":{"type":"tendermint/event/NewBlockHeader","value":{"header":{"height":"812"}}}
        }}"#;
        assert_eq!(handle_text(event).unwrap(), Some(NewBlockHeader { height: 812 }));
    }

    #[test]
    fn cancelled_subscription_is_an_error() {
        let err = r#"{"jsonrpc":"2.0","id":"EVMIndexerService","error":{
            "code":-32000,"message":"Server error","data":"subscription was cancelled (reason: client is not pulling messages fast enough)"
        }}"#;
        match handle_text(err) {
            Err(IndexerError::Subscription(msg)) => assert!(msg.contains("cancelled")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            handle_text("not json"),
            Err(IndexerError::Subscription(_))
        ));
    }
}
