//! Pyth Hermes SSE Feed - Secondary Oracle Price Source
//!
//! Streams parsed price updates from Hermes over server-sent events.
//! Oracle prices carry a confidence interval rather than a book, so the
//! normalized quote is `bid = price - conf`, `ask = price + conf`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Deserialize;
use tracing::debug;

use crate::config::{InstrumentConfig, PythConfig};
use crate::domain::error::FeedError;
use crate::domain::quote::{InstrumentId, NormalizedQuote, Source};
use crate::ports::feed_adapter::{FeedAdapter, RawMessage};

/// Hermes price update event body.
#[derive(Debug, Deserialize)]
struct HermesUpdate {
    #[serde(default)]
    parsed: Option<Vec<ParsedPriceFeed>>,
}

/// One feed entry in `parsed[]`.
#[derive(Debug, Deserialize)]
struct ParsedPriceFeed {
    id: String,
    price: Option<HermesPrice>,
}

/// Fixed-point price with exponent.
#[derive(Debug, Deserialize)]
struct HermesPrice {
    price: FixedPoint,
    conf: FixedPoint,
    expo: i32,
    #[serde(default)]
    publish_time: Option<i64>,
}

/// Hermes encodes integers as strings; older payloads used numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FixedPoint {
    Text(String),
    Number(f64),
}

impl FixedPoint {
    fn scaled(&self, expo: i32) -> Result<f64, FeedError> {
        let raw = match self {
            Self::Text(s) => s
                .parse::<f64>()
                .map_err(|_| FeedError::Parse(format!("invalid fixed-point value: {s:?}")))?,
            Self::Number(n) => *n,
        };
        Ok(raw * 10f64.powi(expo))
    }
}

/// Strip `0x` and lowercase a feed id.
fn normalize_feed_id(id: &str) -> String {
    let id = id.trim();
    id.strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id)
        .to_lowercase()
}

/// Largest unterminated event the decoder will hold.
pub const MAX_PENDING_EVENT_BYTES: usize = 1 << 20;

/// Incremental server-sent-events decoder.
///
/// Buffers raw bytes and decodes only complete events, so multi-byte
/// characters split across chunks survive. Returns the `data:` payload
/// of each event; comment lines (`:` keep-alives) and events without
/// data are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// A CR ended the previous chunk; its LF may open the next one.
    pending_cr: bool,
}

impl SseDecoder {
    /// Append a received chunk, normalizing CR and CRLF to LF.
    ///
    /// Fails once an unterminated event outgrows
    /// `MAX_PENDING_EVENT_BYTES`; the buffer is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), FeedError> {
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                self.buffer.push(b'\n');
                if byte == b'\n' {
                    continue;
                }
            }
            if byte == b'\r' {
                self.pending_cr = true;
            } else {
                self.buffer.push(byte);
            }
        }

        let complete = self
            .buffer
            .windows(2)
            .rposition(|w| w == b"\n\n")
            .map_or(0, |i| i + 2);
        if self.buffer.len() - complete > MAX_PENDING_EVENT_BYTES {
            let pending = self.buffer.len() - complete;
            self.buffer.clear();
            self.pending_cr = false;
            return Err(FeedError::Transport(format!(
                "SSE event exceeds {MAX_PENDING_EVENT_BYTES} bytes ({pending} pending)"
            )));
        }
        Ok(())
    }

    /// Next complete event's data, if any.
    pub fn next_event(&mut self) -> Option<String> {
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&block);

            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|d| d.strip_prefix(' ').unwrap_or(d))
                .collect();

            if !data.is_empty() {
                return Some(data.join("\n"));
            }
        }
        None
    }
}

/// Open Hermes stream.
pub struct PythStream {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
}

/// Pyth Hermes feed adapter.
pub struct PythFeed {
    client: reqwest::Client,
    url: String,
    /// Normalized feed id → tracked instrument.
    feeds: HashMap<String, InstrumentId>,
}

impl PythFeed {
    /// Build the adapter for the configured instruments.
    pub fn new(config: &PythConfig, instruments: &[InstrumentConfig]) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;

        let query = instruments
            .iter()
            .map(|i| format!("ids[]={}", i.pyth_feed_id.trim()))
            .collect::<Vec<_>>()
            .join("&");

        let feeds = instruments
            .iter()
            .map(|i| (normalize_feed_id(&i.pyth_feed_id), i.name.clone()))
            .collect();

        Ok(Self {
            client,
            url: format!(
                "{}/v2/updates/price/stream?{}&parsed=true",
                config.endpoint.trim_end_matches('/'),
                query
            ),
            feeds,
        })
    }

    /// Full stream URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn instrument_for(&self, id: &str) -> Option<&InstrumentId> {
        self.feeds.get(&normalize_feed_id(id))
    }
}

#[async_trait]
impl FeedAdapter for PythFeed {
    type Handle = PythStream;

    fn name(&self) -> &'static str {
        "pyth"
    }

    async fn connect(&self) -> Result<Self::Handle, FeedError> {
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| FeedError::Connect(format!("Hermes request failed: {e}")))?
            .error_for_status()
            .map_err(|e| FeedError::Connect(format!("Hermes rejected stream: {e}")))?;

        debug!(url = %self.url, "Pyth Hermes stream opened");

        Ok(PythStream {
            body: resp.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
            decoder: SseDecoder::default(),
        })
    }

    async fn receive(&self, handle: &mut Self::Handle) -> Option<Result<String, FeedError>> {
        loop {
            if let Some(data) = handle.decoder.next_event() {
                return Some(Ok(data));
            }
            match handle.body.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = handle.decoder.push(&chunk) {
                        return Some(Err(e));
                    }
                }
                Some(Err(e)) => {
                    return Some(Err(FeedError::Transport(format!("Hermes stream error: {e}"))));
                }
                None => return None,
            }
        }
    }

    async fn close(&self, handle: Self::Handle) {
        // Dropping the body closes the HTTP connection
        drop(handle);
    }

    fn parse(&self, source: Source, raw: &RawMessage) -> Result<Vec<NormalizedQuote>, FeedError> {
        let update: HermesUpdate = serde_json::from_str(&raw.payload)?;

        let Some(parsed) = update.parsed else {
            return Ok(Vec::new());
        };

        let mut quotes = Vec::with_capacity(parsed.len());
        for feed in parsed {
            let Some(price) = feed.price else {
                continue;
            };
            let Some(instrument) = self.instrument_for(&feed.id) else {
                debug!(id = %feed.id, "No instrument mapping for Pyth feed");
                continue;
            };

            let px = price.price.scaled(price.expo)?;
            let conf = price.conf.scaled(price.expo)?;

            quotes.push(NormalizedQuote {
                instrument: instrument.clone(),
                source,
                bid: px - conf,
                ask: px + conf,
                observed_at: raw.observed_at,
                observed_at_ms: raw.observed_at_ms,
                published_at_ms: price.publish_time.map(|t| t * 1_000),
            });
        }

        Ok(quotes)
    }
}
