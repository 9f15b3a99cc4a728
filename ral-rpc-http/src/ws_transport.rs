use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ral_core::RalError;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single websocket connection to one endpoint. Low-level: it knows
/// nothing about subscriptions, reconnects, or backoff — that policy lives
/// in the websocket supervisor (`ral::streaming`), which owns one
/// `WsConnection` at a time per endpoint and replaces it wholesale on
/// reconnect.
pub struct WsConnection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl WsConnection {
    /// Open a new websocket connection to `url`.
    pub async fn connect(url: &str) -> Result<Self, RalError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| RalError::classify(url, format!("websocket connect failed: {err}")))?;
        let (sink, stream) = ws.split();
        Ok(Self { sink, stream })
    }

    /// Send a text frame (the supervisor uses this for subscribe/unsubscribe
    /// control frames, spec §4.4's `{type, channel, params?}` shape).
    pub async fn send_text(&mut self, text: String) -> Result<(), RalError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|err| RalError::classify("ws", format!("send failed: {err}")))
    }

    /// Receive the next text frame, or `None` when the socket has closed.
    pub async fn next_text(&mut self) -> Option<Result<String, RalError>> {
        loop {
            match self.stream.next().await {
                None => return None,
                Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return None,
                Some(Ok(Message::Binary(_) | Message::Frame(_))) => continue,
                Some(Err(err)) => return Some(Err(RalError::classify("ws", format!("recv failed: {err}")))),
            }
        }
    }
}
