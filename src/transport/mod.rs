use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ingest::Ingestor;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on a single connect plus WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the subscription URL `ws://{broker}/{key}/{channel}`.
///
/// A broker that already carries a scheme (`ws://`, `wss://`) is used as is.
pub fn subscription_url(broker: &str, key: &str, channel: &str) -> String {
    let broker = broker.trim_end_matches('/');
    let key = key.trim_matches('/');
    let channel = channel.trim_start_matches('/');

    if broker.contains("://") {
        format!("{broker}/{key}/{channel}")
    } else {
        format!("ws://{broker}/{key}/{channel}")
    }
}

/// Doubles `current`, capped at `max`.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Live broker subscription feeding an [`Ingestor`].
///
/// Every Binary frame, and every Text frame as raw bytes, is ingested on the
/// reading task. Lost connections are retried with capped exponential backoff
/// until cancellation.
pub struct Subscriber {
    url: String,
    stream: Option<WsStream>,
    connect_timeout: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("url", &self.url)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl Subscriber {
    /// Opens the initial subscription. Fails if the handshake does not finish
    /// within `connect_timeout` or `cancel` fires first.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => bail!("cancelled while subscribing to {url}"),
            res = tokio::time::timeout(connect_timeout, connect_async(url)) => res,
        };

        let (stream, _) = match attempt {
            Ok(res) => res.with_context(|| format!("subscribing to {url}"))?,
            Err(_) => bail!(
                "subscribing to {url}: no handshake within {}",
                humantime::format_duration(connect_timeout),
            ),
        };

        info!(url, "subscribed to broker");

        Ok(Self {
            url: url.to_string(),
            stream: Some(stream),
            connect_timeout,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        })
    }

    /// Overrides the reconnect backoff bounds.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Reads frames until `cancel` fires, reconnecting on loss. Returns the
    /// number of data frames handed to the ingestor.
    pub async fn run(mut self, ingestor: Ingestor, cancel: CancellationToken) -> u64 {
        let mut frames = 0u64;

        loop {
            let mut ws = match self.stream.take() {
                Some(ws) => ws,
                None => match self.reconnect(&cancel).await {
                    Some(ws) => ws,
                    None => break,
                },
            };

            let cancelled = pump(&mut ws, &ingestor, &cancel, &mut frames).await;

            if cancelled {
                if tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await.is_err() {
                    debug!("timed out closing subscription");
                }
                break;
            }

            warn!(url = %self.url, frames, "subscription lost");
        }

        info!(frames, "subscription stopped");
        frames
    }

    async fn reconnect(&self, cancel: &CancellationToken) -> Option<WsStream> {
        let mut backoff = self.initial_backoff;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }

            let connect = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()));
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return None,
                res = connect => res,
            };

            match attempt {
                Ok(Ok((ws, _))) => {
                    info!(url = %self.url, "resubscribed to broker");
                    return Some(ws);
                }
                Ok(Err(e)) => {
                    warn!(url = %self.url, error = %e, ?backoff, "reconnect failed");
                }
                Err(_) => {
                    warn!(
                        url = %self.url,
                        timeout = ?self.connect_timeout,
                        ?backoff,
                        "reconnect timed out",
                    );
                }
            }

            backoff = next_backoff(backoff, self.max_backoff);
        }
    }
}

/// Forwards frames until the connection ends. Returns true if cancelled.
async fn pump(
    ws: &mut WsStream,
    ingestor: &Ingestor,
    cancel: &CancellationToken,
    frames: &mut u64,
) -> bool {
    loop {
        let msg = tokio::select! {
            biased;

            _ = cancel.cancelled() => return true,
            msg = ws.next() => msg,
        };

        match msg {
            Some(Ok(Message::Binary(data))) => {
                *frames += 1;
                ingestor.ingest(&data);
            }
            Some(Ok(Message::Text(text))) => {
                *frames += 1;
                ingestor.ingest(text.as_bytes());
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "broker closed subscription");
                return false;
            }
            // Pings are answered by the protocol layer on the next read.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "subscription read failed");
                return false;
            }
            None => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_url() {
        assert_eq!(
            subscription_url("127.0.0.1:8080", "cluster", "stats/"),
            "ws://127.0.0.1:8080/cluster/stats/"
        );
    }

    #[test]
    fn test_subscription_url_normalizes_slashes() {
        assert_eq!(
            subscription_url("broker:80/", "/cluster/", "/stats/"),
            "ws://broker:80/cluster/stats/"
        );
    }

    #[test]
    fn test_subscription_url_keeps_scheme() {
        assert_eq!(
            subscription_url("wss://broker.example.com", "k", "stats/"),
            "wss://broker.example.com/k/stats/"
        );
    }

    #[test]
    fn test_next_backoff_doubles_and_caps() {
        let max = Duration::from_secs(30);
        assert_eq!(next_backoff(Duration::from_secs(1), max), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(16), max), max);
        assert_eq!(next_backoff(max, max), max);
    }

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let url = subscription_url(&addr.to_string(), "k", "stats/");
        let err = Subscriber::connect(&url, DEFAULT_CONNECT_TIMEOUT, &CancellationToken::new())
            .await
            .expect_err("nothing listening");
        assert!(err.to_string().contains("subscribing to"));
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_broker() {
        // The kernel completes the TCP handshake from the backlog; nothing
        // ever answers the WebSocket upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let url = subscription_url(&addr.to_string(), "k", "stats/");

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(3),
            Subscriber::connect(&url, Duration::from_millis(200), &CancellationToken::new()),
        )
        .await
        .expect("connect must give up before the outer deadline");

        let err = result.expect_err("silent broker");
        assert!(err.to_string().contains("no handshake within"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(listener);
    }

    #[tokio::test]
    async fn test_connect_returns_when_cancelled() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let url = subscription_url(&addr.to_string(), "k", "stats/");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            Subscriber::connect(&url, Duration::from_secs(60), &cancel),
        )
        .await
        .expect("connect must observe cancellation");

        let err = result.expect_err("cancelled");
        assert!(err.to_string().contains("cancelled while subscribing"));
        drop(listener);
    }
}
