//! Binance WebSocket Feed - Primary Order-Book Price Source
//!
//! Connects to Binance's combined `bookTicker` stream for best bid/ask
//! updates on every tracked symbol. Implements the `FeedAdapter` port;
//! reconnects and liveness are handled by the feed connection.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::config::{BinanceConfig, InstrumentConfig};
use crate::domain::error::FeedError;
use crate::domain::quote::{InstrumentId, NormalizedQuote, Source};
use crate::ports::feed_adapter::{FeedAdapter, RawMessage};

type BinanceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Combined-stream envelope: `{"stream": "...", "data": {...}}`.
#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    data: Option<BookTickerMsg>,
}

/// Binance bookTicker payload.
#[derive(Debug, Deserialize)]
struct BookTickerMsg {
    /// Symbol.
    s: String,
    /// Best bid price as string.
    b: String,
    /// Best ask price as string.
    a: String,
    /// Order book update id.
    #[serde(default)]
    u: Option<u64>,
}

/// Binance bookTicker feed adapter.
pub struct BinanceFeed {
    /// Combined stream URL.
    ws_url: String,
    /// Binance symbol → tracked instrument.
    symbols: HashMap<String, InstrumentId>,
}

impl BinanceFeed {
    /// Build the adapter for the configured instruments.
    pub fn new(config: &BinanceConfig, instruments: &[InstrumentConfig]) -> Self {
        let streams = instruments
            .iter()
            .map(|i| format!("{}@bookTicker", i.binance_symbol.to_lowercase()))
            .collect::<Vec<_>>()
            .join("/");

        let symbols = instruments
            .iter()
            .map(|i| (i.binance_symbol.to_uppercase(), i.name.clone()))
            .collect();

        Self {
            ws_url: format!(
                "{}/stream?streams={}",
                config.ws_url.trim_end_matches('/'),
                streams
            ),
            symbols,
        }
    }

    /// Full combined-stream URL.
    pub fn url(&self) -> &str {
        &self.ws_url
    }

    /// Map a Binance symbol to the tracked instrument.
    pub fn symbol_to_instrument(&self, symbol: &str) -> Option<&InstrumentId> {
        self.symbols.get(symbol)
    }

    fn parse_price(field: &str, value: &str) -> Result<f64, FeedError> {
        value
            .parse::<f64>()
            .map_err(|_| FeedError::Parse(format!("invalid {field} price: {value:?}")))
    }
}

/// Text-level keep-alive some gateways send instead of ping frames.
fn is_text_ping(text: &str) -> bool {
    text.trim_start().starts_with("PING")
}

#[async_trait]
impl FeedAdapter for BinanceFeed {
    type Handle = BinanceSocket;

    fn name(&self) -> &'static str {
        "binance"
    }

    async fn connect(&self) -> Result<Self::Handle, FeedError> {
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| FeedError::Connect(format!("Binance WebSocket connection failed: {e}")))?;
        debug!(url = %self.ws_url, "Binance WebSocket connected");
        Ok(ws_stream)
    }

    async fn receive(&self, handle: &mut Self::Handle) -> Option<Result<String, FeedError>> {
        loop {
            match handle.next().await {
                Some(Ok(Message::Text(text))) => {
                    if is_text_ping(&text) {
                        let pong = text.replacen("PING", "PONG", 1);
                        if let Err(e) = handle.send(Message::Text(pong)).await {
                            return Some(Err(FeedError::Transport(format!("PONG send failed: {e}"))));
                        }
                        continue;
                    }
                    return Some(Ok(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    // Pong is queued by tungstenite and flushed on the next read
                    debug!(len = data.len(), "Binance ping received");
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Some(Err(FeedError::Closed(reason)));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Some(Err(FeedError::Transport(format!("WebSocket error: {e}"))));
                }
                None => return None,
            }
        }
    }

    async fn close(&self, mut handle: Self::Handle) {
        if let Err(e) = handle.close(None).await {
            debug!(error = %e, "Binance close handshake failed");
        }
    }

    fn parse(&self, source: Source, raw: &RawMessage) -> Result<Vec<NormalizedQuote>, FeedError> {
        let envelope: StreamEnvelope = serde_json::from_str(&raw.payload)?;

        // Subscription acks and other control frames carry no data
        let Some(msg) = envelope.data else {
            return Ok(Vec::new());
        };

        let Some(instrument) = self.symbol_to_instrument(&msg.s) else {
            debug!(symbol = %msg.s, stream = ?envelope.stream, "No instrument mapping for symbol");
            return Ok(Vec::new());
        };

        let bid = Self::parse_price("bid", &msg.b)?;
        let ask = Self::parse_price("ask", &msg.a)?;

        debug!(symbol = %msg.s, update_id = ?msg.u, bid, ask, "Binance book ticker");

        Ok(vec![NormalizedQuote {
            instrument: instrument.clone(),
            source,
            bid,
            ask,
            observed_at: raw.observed_at,
            observed_at_ms: raw.observed_at_ms,
            published_at_ms: None,
        }])
    }
}
