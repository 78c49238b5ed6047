//! etcd v3 JSON gateway client.
//!
//! Talks to the grpc-gateway that etcd exposes over HTTP:
//!
//! - `POST /v3/kv/range` for reads, one request per prefix, all pinned to the
//!   revision returned by the first so the result is a single consistent read;
//! - `POST /v3/watch` for change notifications, streamed back as
//!   newline-delimited JSON.
//!
//! Keys and values travel base64-encoded; 64-bit integers are JSON strings.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, trace};

use stratum_core::{
    ChangeKind, FetchResponse, OverlayError, OverlayResult, StoreClient, StoreEntry, StoreEvent,
    WatchStream,
};

/// Connection settings for [`EtcdGatewayClient`].
#[derive(Debug, Clone)]
pub struct EtcdGatewayConfig {
    /// Base URL of the gateway, e.g. `http://127.0.0.1:2379`.
    pub endpoint: String,
    /// Timeout for read requests.
    pub request_timeout: Duration,
    /// Timeout for establishing a connection, reads and watches alike.
    pub connect_timeout: Duration,
}

impl EtcdGatewayConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

/// A [`StoreClient`] backed by the etcd v3 JSON gateway.
pub struct EtcdGatewayClient {
    config: EtcdGatewayConfig,
    name: String,
    /// Client for bounded requests.
    client: Client,
    /// Client without a total timeout, for long-lived watch streams.
    watch_client: Client,
}

impl EtcdGatewayClient {
    /// Creates a client for the given gateway.
    pub fn new(config: EtcdGatewayConfig) -> OverlayResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| OverlayError::unavailable(format!("failed to create HTTP client: {e}")))?;
        let watch_client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| OverlayError::unavailable(format!("failed to create HTTP client: {e}")))?;

        info!(endpoint = %config.endpoint, "Created etcd gateway client");

        Ok(Self {
            name: format!("etcd({})", config.endpoint),
            config,
            client,
            watch_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint, path)
    }

    async fn range(&self, prefix: &str, revision: Option<u64>) -> OverlayResult<RangeResponse> {
        let body = RangeRequest {
            key: BASE64.encode(prefix),
            range_end: BASE64.encode(prefix_range_end(prefix.as_bytes())),
            revision: revision.map(|r| r.to_string()),
        };
        let resp = self
            .client
            .post(self.url("/v3/kv/range"))
            .json(&body)
            .send()
            .await
            .map_err(|e| OverlayError::unavailable(format!("range request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(OverlayError::unavailable(format!(
                "HTTP {} error: {}",
                status.as_u16(),
                text
            )));
        }
        resp.json()
            .await
            .map_err(|e| OverlayError::unavailable(format!("invalid range response: {e}")))
    }

    async fn watch_prefix(&self, prefix: &str) -> OverlayResult<WatchStream> {
        let body = WatchRequest {
            create_request: WatchCreateRequest {
                key: BASE64.encode(prefix),
                range_end: BASE64.encode(prefix_range_end(prefix.as_bytes())),
            },
        };
        let resp = self
            .watch_client
            .post(self.url("/v3/watch"))
            .json(&body)
            .send()
            .await
            .map_err(|e| OverlayError::unavailable(format!("watch request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(OverlayError::unavailable(format!(
                "HTTP {} error opening watch",
                status.as_u16()
            )));
        }
        debug!(endpoint = %self.config.endpoint, prefix, "Watch stream opened");
        Ok(decode_watch_stream(resp.bytes_stream().boxed()))
    }
}

impl std::fmt::Debug for EtcdGatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdGatewayClient")
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

#[async_trait]
impl StoreClient for EtcdGatewayClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_entries(&self, prefixes: &[String]) -> OverlayResult<FetchResponse> {
        let mut revision = None;
        let mut entries = Vec::new();

        for prefix in prefixes {
            let response = self.range(prefix, revision).await?;
            let header_revision = response.header.revision;
            revision.get_or_insert(header_revision);
            for kv in response.kvs {
                entries.push(kv.into_entry()?);
            }
        }

        trace!(count = entries.len(), "Fetched entries from etcd gateway");
        Ok(FetchResponse {
            revision: revision.unwrap_or_default(),
            entries,
        })
    }

    /// Watches every prefix over its own stream.
    ///
    /// Each prefix stream ends with an error, so the merged stream reports
    /// the loss of any single subscription.
    async fn watch(&self, prefixes: &[String]) -> OverlayResult<WatchStream> {
        let mut streams = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            streams.push(self.watch_prefix(prefix).await?);
        }
        Ok(stream::select_all(streams).boxed())
    }
}

/// Returns the smallest key greater than every key starting with `prefix`.
pub(crate) fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // Every byte was 0xff: range to the end of the keyspace.
    vec![0]
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct RangeRequest {
    key: String,
    range_end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
}

#[derive(Serialize)]
struct WatchRequest {
    create_request: WatchCreateRequest,
}

#[derive(Serialize)]
struct WatchCreateRequest {
    key: String,
    range_end: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseHeader {
    #[serde(default, deserialize_with = "de_int64")]
    revision: u64,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    header: ResponseHeader,
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct KeyValue {
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default, deserialize_with = "de_int64")]
    mod_revision: u64,
}

impl KeyValue {
    fn decode_key(&self) -> OverlayResult<String> {
        let raw = BASE64
            .decode(&self.key)
            .map_err(|e| OverlayError::malformed(&self.key, format!("invalid base64 key: {e}")))?;
        String::from_utf8(raw)
            .map_err(|e| OverlayError::malformed(&self.key, format!("key is not UTF-8: {e}")))
    }

    fn into_entry(self) -> OverlayResult<StoreEntry> {
        let key = self.decode_key()?;
        let value = BASE64
            .decode(&self.value)
            .map_err(|e| OverlayError::malformed(&key, format!("invalid base64 value: {e}")))?;
        Ok(StoreEntry::new(key, value, self.mod_revision))
    }
}

#[derive(Debug, Deserialize)]
struct WatchEnvelope {
    result: Option<WatchResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WatchResult {
    #[serde(default)]
    header: ResponseHeader,
    #[serde(default)]
    canceled: bool,
    #[serde(default)]
    events: Vec<WatchEvent>,
}

#[derive(Debug, Deserialize)]
struct WatchEvent {
    /// Omitted for PUT, the enum's zero value.
    #[serde(rename = "type", default)]
    kind: Option<String>,
    kv: KeyValue,
}

/// Accepts int64 values encoded either as JSON strings or numbers.
fn de_int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Text(String),
        Number(u64),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Decodes one line of the watch stream into change events.
fn decode_watch_line(line: &[u8]) -> OverlayResult<Vec<StoreEvent>> {
    let envelope: WatchEnvelope = serde_json::from_slice(line)
        .map_err(|e| OverlayError::unavailable(format!("invalid watch response: {e}")))?;
    if let Some(error) = envelope.error {
        return Err(OverlayError::unavailable(format!("watch error: {error}")));
    }
    let Some(result) = envelope.result else {
        return Ok(Vec::new());
    };
    if result.canceled {
        return Err(OverlayError::unavailable("watch canceled by server"));
    }

    let mut events = Vec::with_capacity(result.events.len());
    for event in result.events {
        let kind = match event.kind.as_deref() {
            Some("DELETE") => ChangeKind::Delete,
            _ => ChangeKind::Put,
        };
        let key = event.kv.decode_key()?;
        let revision = if event.kv.mod_revision > 0 {
            event.kv.mod_revision
        } else {
            result.header.revision
        };
        events.push(StoreEvent {
            key,
            kind,
            revision,
        });
    }
    Ok(events)
}

struct LineDecoder<S> {
    body: S,
    buffer: Vec<u8>,
    pending: VecDeque<OverlayResult<StoreEvent>>,
    finished: bool,
}

/// Turns a streamed HTTP body into a stream of watch events.
///
/// The stream ends with exactly one error: a transport failure, an error or
/// cancellation line from the server, or the body closing.
fn decode_watch_stream<S, B>(body: S) -> WatchStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let decoder = LineDecoder {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let stream: BoxStream<'static, OverlayResult<StoreEvent>> =
        stream::unfold(decoder, |mut decoder| async move {
            loop {
                if let Some(item) = decoder.pending.pop_front() {
                    if item.is_err() {
                        decoder.finished = true;
                        decoder.pending.clear();
                    }
                    return Some((item, decoder));
                }
                if decoder.finished {
                    return None;
                }
                match decoder.body.next().await {
                    Some(Ok(chunk)) => {
                        decoder.buffer.extend_from_slice(chunk.as_ref());
                        while let Some(pos) = decoder.buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = decoder.buffer.drain(..=pos).collect();
                            let line = line.trim_ascii();
                            if line.is_empty() {
                                continue;
                            }
                            match decode_watch_line(line) {
                                Ok(events) => decoder.pending.extend(events.into_iter().map(Ok)),
                                Err(e) => decoder.pending.push_back(Err(e)),
                            }
                        }
                    }
                    Some(Err(e)) => {
                        decoder
                            .pending
                            .push_back(Err(OverlayError::unavailable(format!(
                                "watch stream failed: {e}"
                            ))));
                    }
                    None => {
                        // The watch never ends on its own; a closed body means
                        // the subscription is gone and must be re-established.
                        if !decoder.buffer.trim_ascii().is_empty() {
                            debug!(bytes = decoder.buffer.len(), "Watch body ended mid-line");
                        }
                        decoder.finished = true;
                        decoder
                            .pending
                            .push_back(Err(OverlayError::unavailable("watch stream closed")));
                    }
                }
            }
        })
        .boxed();
    stream
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_range_end() {
        assert_eq!(prefix_range_end(b"/config/"), b"/config0".to_vec());
        assert_eq!(prefix_range_end(b"a\xff"), b"b".to_vec());
        assert_eq!(prefix_range_end(b"\xff\xff"), vec![0]);
    }

    #[test]
    fn test_decode_range_response() {
        let body = format!(
            r#"{{"header":{{"revision":"17"}},"kvs":[{{"key":"{}","value":"{}","mod_revision":"12"}}],"count":"1"}}"#,
            BASE64.encode("/config/dev/A"),
            BASE64.encode("42"),
        );
        let response: RangeResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.header.revision, 17);
        let entry = response.kvs.into_iter().next().unwrap().into_entry().unwrap();
        assert_eq!(entry, StoreEntry::new("/config/dev/A", "42", 12));
    }

    #[test]
    fn test_decode_empty_range_response() {
        let response: RangeResponse =
            serde_json::from_str(r#"{"header":{"revision":"3"}}"#).unwrap();
        assert!(response.kvs.is_empty());
        assert_eq!(response.header.revision, 3);
    }

    #[test]
    fn test_decode_watch_line() {
        let line = format!(
            r#"{{"result":{{"header":{{"revision":"9"}},"events":[{{"kv":{{"key":"{}","mod_revision":"9"}}}},{{"type":"DELETE","kv":{{"key":"{}"}}}}]}}}}"#,
            BASE64.encode("/config/dev/A"),
            BASE64.encode("/config/dev/B"),
        );
        let events = decode_watch_line(line.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ChangeKind::Put);
        assert_eq!(events[0].key, "/config/dev/A");
        assert_eq!(events[1].kind, ChangeKind::Delete);
        assert_eq!(events[1].revision, 9);
    }

    #[test]
    fn test_watch_created_line_has_no_events() {
        let line = br#"{"result":{"header":{"revision":"4"},"created":true}}"#;
        assert!(decode_watch_line(line).unwrap().is_empty());
    }

    #[test]
    fn test_watch_error_line() {
        let line = br#"{"error":{"grpc_code":14,"message":"unavailable"}}"#;
        assert!(decode_watch_line(line).unwrap_err().is_transient());
    }

    #[test]
    fn test_config_trims_endpoint() {
        let config = EtcdGatewayConfig::new("http://127.0.0.1:2379/");
        assert_eq!(config.endpoint, "http://127.0.0.1:2379");
    }

    fn chunks(
        parts: Vec<&'static str>,
    ) -> impl Stream<Item = Result<&'static [u8], reqwest::Error>> + Send + Unpin + 'static {
        stream::iter(parts.into_iter().map(|part| Ok(part.as_bytes())))
    }

    fn put_line(key: &str, revision: u64) -> String {
        format!(
            r#"{{"result":{{"header":{{"revision":"{revision}"}},"events":[{{"kv":{{"key":"{}","mod_revision":"{revision}"}}}}]}}}}"#,
            BASE64.encode(key),
        ) + "\n"
    }

    fn leak(text: String) -> &'static str {
        Box::leak(text.into_boxed_str())
    }

    #[tokio::test]
    async fn test_watch_line_split_across_chunks() {
        let line = put_line("/config/dev/A", 5);
        let (head, tail) = line.split_at(line.len() / 2);
        let mut stream = decode_watch_stream(chunks(vec![leak(head.into()), leak(tail.into())]));

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.key, "/config/dev/A");
        assert_eq!(event.revision, 5);
        assert!(stream.next().await.unwrap().unwrap_err().is_transient());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_several_lines_in_one_chunk() {
        let body = format!(
            "{}\n{}{}",
            r#"{"result":{"header":{"revision":"1"},"created":true}}"#,
            put_line("/config/dev/A", 2),
            put_line("/config/dev/B", 3),
        );
        let stream = decode_watch_stream(chunks(vec![leak(body)]));
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 3);
        let keys: Vec<_> = items[..2]
            .iter()
            .map(|item| item.as_ref().unwrap().key.clone())
            .collect();
        assert_eq!(keys, ["/config/dev/A", "/config/dev/B"]);
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn test_error_line_ends_stream() {
        let body = format!(
            "{}{}\n{}",
            put_line("/config/dev/A", 2),
            r#"{"error":{"grpc_code":14,"message":"unavailable"}}"#,
            put_line("/config/dev/B", 3),
        );
        let items: Vec<_> = decode_watch_stream(chunks(vec![leak(body)])).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().key, "/config/dev/A");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_body_ending_mid_line_reports_closed() {
        let line = put_line("/config/dev/A", 2);
        let partial = leak(line[..line.len() / 2].to_string());
        let items: Vec<_> = decode_watch_stream(chunks(vec![partial])).collect().await;

        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_closed_prefix_stream_surfaces_in_merged_watch() {
        let env_body = chunks(vec![r#"{"result":{"header":{"revision":"1"},"created":true}}"#, "\n"]);
        let sets_body = chunks(vec![leak(put_line("/config/extensions/a/X", 2))])
            .chain(stream::pending());
        let mut merged = stream::select_all([
            decode_watch_stream(env_body),
            decode_watch_stream(sets_body),
        ]);

        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match merged.next().await {
                    Some(Ok(event)) => {
                        assert_eq!(event.key, "/config/extensions/a/X");
                    }
                    Some(Err(e)) => return e,
                    None => panic!("merged watch ended without an error"),
                }
            }
        })
        .await
        .expect("closed env watch was not reported");

        assert!(closed.is_transient());
    }
}
