//! Chunked range queries against the indexing service.
//!
//! A request for `[start, end)` of a series is split into chunks of at most
//! `chunk_size` values. Each chunk is fetched with bounded retries: transient
//! failures reset the connection and wait `retry_delay × attempt` before the
//! next try. Chunks are fetched one after another and the result is only
//! returned once every chunk has arrived in full.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::{config::ScannerConfig, error::LoaderError};

/// A columnar data source.
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Raw values of `series` over `[start, end)`.
    async fn fetch_chunk(&self, series: &str, start: u64, end: u64)
        -> Result<Vec<Value>, LoaderError>;

    /// Drop and re-establish any connection state before a retry.
    async fn reset(&self) {}
}

/// [`SeriesSource`] over the indexer's HTTP API.
pub struct HttpSeriesSource {
    endpoint: String,
    timeout: Duration,
    client: RwLock<Client>,
}

impl HttpSeriesSource {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
            client: RwLock::new(Client::builder().timeout(timeout).build()?),
        })
    }

    pub fn from_config(config: &ScannerConfig) -> anyhow::Result<Self> {
        Self::new(&config.endpoint, config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn series_url(&self, series: &str) -> String {
        format!("{}/api/vecs/{}", self.endpoint, series)
    }
}

#[async_trait]
impl SeriesSource for HttpSeriesSource {
    async fn fetch_chunk(
        &self,
        series: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<Value>, LoaderError> {
        let client = self.client.read().clone();
        let transport = |e: reqwest::Error| LoaderError::Transport {
            series: series.to_string(),
            start,
            end,
            message: e.to_string(),
        };

        let response = client
            .get(self.series_url(series))
            .query(&[("from", start), ("to", end)])
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LoaderError::Status {
                series: series.to_string(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&bytes).map_err(|e| LoaderError::Decode {
            series: series.to_string(),
            message: e.to_string(),
        })
    }

    async fn reset(&self) {
        match Client::builder().timeout(self.timeout).build() {
            Ok(client) => *self.client.write() = client,
            Err(e) => tracing::warn!("Could not rebuild HTTP client: {}", e),
        }
    }
}

/// Typed, chunked, retrying reader over a [`SeriesSource`].
pub struct RangeDataLoader<S> {
    source: S,
    chunk_size: u64,
    max_retries: u32,
    retry_delay: Duration,
}

impl<S: SeriesSource> RangeDataLoader<S> {
    pub fn new(source: S, chunk_size: u64, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            max_retries,
            retry_delay,
        }
    }

    pub fn from_config(source: S, config: &ScannerConfig) -> Self {
        Self::new(
            source,
            config.chunk_size,
            config.max_retries,
            config.retry_delay(),
        )
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Values of `series` over `[start, end)`, decoded as `T`.
    pub async fn fetch_array<T: DeserializeOwned>(
        &self,
        series: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<T>, LoaderError> {
        let mut values = Vec::with_capacity(end.saturating_sub(start) as usize);
        let mut chunk_start = start;
        while chunk_start < end {
            let chunk_end = end.min(chunk_start.saturating_add(self.chunk_size));
            let chunk = self.fetch_with_retry(series, chunk_start, chunk_end).await?;

            let expected = (chunk_end - chunk_start) as usize;
            if chunk.len() != expected {
                return Err(LoaderError::ShortRead {
                    series: series.to_string(),
                    start: chunk_start,
                    end: chunk_end,
                    expected,
                    got: chunk.len(),
                });
            }

            for value in chunk {
                values.push(serde_json::from_value(value).map_err(|e| LoaderError::Decode {
                    series: series.to_string(),
                    message: e.to_string(),
                })?);
            }

            tracing::debug!("Fetched {} [{}, {})", series, chunk_start, chunk_end);
            chunk_start = chunk_end;
        }
        Ok(values)
    }

    /// Single value of `series` at `index`.
    pub async fn fetch_value<T: DeserializeOwned>(
        &self,
        series: &str,
        index: u64,
    ) -> Result<T, LoaderError> {
        let mut values = self.fetch_array(series, index, index + 1).await?;
        values.pop().ok_or_else(|| LoaderError::ShortRead {
            series: series.to_string(),
            start: index,
            end: index + 1,
            expected: 1,
            got: 0,
        })
    }

    async fn fetch_with_retry(
        &self,
        series: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<Value>, LoaderError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    "Retry {} for {} [{}, {})",
                    attempt,
                    series,
                    start,
                    end
                );
                self.source.reset().await;
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match self.source.fetch_chunk(series, start, end).await {
                Ok(values) => return Ok(values),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(LoaderError::RetriesExhausted {
            series: series.to_string(),
            start,
            end,
            attempts: self.max_retries + 1,
            last: Box::new(last_error.unwrap_or_else(|| LoaderError::Transport {
                series: series.to_string(),
                start,
                end,
                message: "no attempt made".to_string(),
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Serves `0, 1, 2, ...` for every series and fails the first
    /// `failures` calls.
    struct Counting {
        failures: Mutex<u32>,
        calls: Mutex<Vec<(u64, u64)>>,
        resets: Mutex<u32>,
        truncate: bool,
    }

    impl Counting {
        fn new(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(Vec::new()),
                resets: Mutex::new(0),
                truncate: false,
            }
        }
    }

    #[async_trait]
    impl SeriesSource for Counting {
        async fn fetch_chunk(
            &self,
            series: &str,
            start: u64,
            end: u64,
        ) -> Result<Vec<Value>, LoaderError> {
            self.calls.lock().push((start, end));
            {
                let mut failures = self.failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(LoaderError::Transport {
                        series: series.to_string(),
                        start,
                        end,
                        message: "connection reset by peer".into(),
                    });
                }
            }
            let end = if self.truncate { end - 1 } else { end };
            Ok((start..end).map(|i| json!(i)).collect())
        }

        async fn reset(&self) {
            *self.resets.lock() += 1;
        }
    }

    fn loader(source: Counting, chunk_size: u64, max_retries: u32) -> RangeDataLoader<Counting> {
        RangeDataLoader::new(source, chunk_size, max_retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_chunking_preserves_order() {
        let loader = loader(Counting::new(0), 4, 0);
        let values: Vec<u64> = loader.fetch_array("any", 3, 13).await.unwrap();
        assert_eq!(values, (3..13).collect::<Vec<_>>());
        assert_eq!(*loader.source().calls.lock(), vec![(3, 7), (7, 11), (11, 13)]);
    }

    #[tokio::test]
    async fn test_chunk_size_does_not_change_result() {
        let a: Vec<u64> = loader(Counting::new(0), 1, 0)
            .fetch_array("any", 0, 17)
            .await
            .unwrap();
        let b: Vec<u64> = loader(Counting::new(0), 1_000, 0)
            .fetch_array("any", 0, 17)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_empty_range_makes_no_request() {
        let loader = loader(Counting::new(0), 4, 0);
        let values: Vec<u64> = loader.fetch_array("any", 5, 5).await.unwrap();
        assert!(values.is_empty());
        assert!(loader.source().calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let loader = loader(Counting::new(2), 100, 3);
        let values: Vec<u64> = loader.fetch_array("any", 0, 5).await.unwrap();
        assert_eq!(values.len(), 5);
        assert_eq!(loader.source().calls.lock().len(), 3);
        assert_eq!(*loader.source().resets.lock(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_fatal() {
        let loader = loader(Counting::new(10), 100, 2);
        let err = loader.fetch_array::<u64>("any", 0, 5).await.unwrap_err();
        match err {
            LoaderError::RetriesExhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, LoaderError::Transport { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(loader.source().calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_short_read() {
        let mut source = Counting::new(0);
        source.truncate = true;
        let loader = loader(source, 100, 3);
        let err = loader.fetch_array::<u64>("any", 0, 5).await.unwrap_err();
        assert!(matches!(
            err,
            LoaderError::ShortRead {
                expected: 5,
                got: 4,
                ..
            }
        ));
        // not retried
        assert_eq!(loader.source().calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_decode_error() {
        let loader = loader(Counting::new(0), 100, 0);
        let err = loader.fetch_array::<String>("any", 0, 2).await.unwrap_err();
        assert!(matches!(err, LoaderError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_fetch_value() {
        let loader = loader(Counting::new(0), 100, 0);
        let value: u64 = loader.fetch_value("any", 41).await.unwrap();
        assert_eq!(value, 41);
    }

    #[test]
    fn test_series_url() {
        let source = HttpSeriesSource::new("http://localhost:3110/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.endpoint(), "http://localhost:3110");
        assert_eq!(
            source.series_url("txoutindex-to-value"),
            "http://localhost:3110/api/vecs/txoutindex-to-value"
        );
    }
}
