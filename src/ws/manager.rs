//! Connection lifecycle and subscription bookkeeping for the streams.

use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::types::MarketType;
use crate::ws::dialect;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub type PriceCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConnKey {
    venue: String,
    market: MarketType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    venue: String,
    symbol: String,
    market: MarketType,
}

#[derive(Default)]
struct WsState {
    /// Active base symbols per connection, replayed on reconnect.
    subscriptions: Mutex<HashMap<ConnKey, BTreeSet<String>>>,
    callbacks: Mutex<HashMap<StreamKey, Vec<(u64, PriceCallback)>>>,
    cache: RwLock<HashMap<StreamKey, f64>>,
    /// Outbound frame senders for live connections.
    senders: Mutex<HashMap<ConnKey, mpsc::UnboundedSender<String>>>,
}

pub struct WsManager {
    state: Arc<WsState>,
    /// Replaced on every `start` so a stopped manager can be restarted.
    shutdown: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    next_handle: AtomicU64,
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(WsState::default()),
            shutdown: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Spawn connection tasks for every venue×market with a known stream
    /// endpoint. Venues are lowercase identifiers (`"okx"`, `"bybit"`).
    pub fn start(&self, venues: &[String]) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let token = CancellationToken::new();
        *self.shutdown.lock().expect("ws shutdown poisoned") = token.clone();

        let mut tasks = self.tasks.lock().expect("ws task list poisoned");
        for venue in venues {
            for market in [MarketType::Spot, MarketType::Futures] {
                let Some(url) = dialect::stream_url(venue, market) else {
                    continue;
                };
                let key = ConnKey {
                    venue: venue.clone(),
                    market,
                };
                let state = Arc::clone(&self.state);
                tasks.push(tokio::spawn(run_connection(state, key, url, token.clone())));
            }
        }
        info!(venues = venues.len(), "stream manager started");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a callback for a symbol's stream. The first callback for
    /// a stream sends the wire subscribe when the connection is live.
    /// Returns a handle for [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(
        &self,
        venue: &str,
        symbol: &str,
        market: MarketType,
        callback: PriceCallback,
    ) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let key = StreamKey {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            market,
        };
        self.state
            .callbacks
            .lock()
            .expect("ws callbacks poisoned")
            .entry(key)
            .or_default()
            .push((handle, callback));

        let conn = ConnKey {
            venue: venue.to_string(),
            market,
        };
        let newly_added = self
            .state
            .subscriptions
            .lock()
            .expect("ws subscriptions poisoned")
            .entry(conn.clone())
            .or_default()
            .insert(symbol.to_string());

        if newly_added {
            if let Some(frame) = dialect::subscribe_frame(venue, market, symbol) {
                self.state.send_to(&conn, frame);
            }
            debug!(venue, symbol, %market, "stream subscription added");
        }
        handle
    }

    /// Drop one callback. Removing the last callback for a stream sends
    /// the wire unsubscribe and purges the cached price.
    pub fn unsubscribe(&self, venue: &str, symbol: &str, market: MarketType, handle: u64) {
        let key = StreamKey {
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            market,
        };
        let stream_empty = {
            let mut callbacks = self.state.callbacks.lock().expect("ws callbacks poisoned");
            if let Some(list) = callbacks.get_mut(&key) {
                list.retain(|(h, _)| *h != handle);
                if list.is_empty() {
                    callbacks.remove(&key);
                    true
                } else {
                    false
                }
            } else {
                true
            }
        };
        if !stream_empty {
            return;
        }

        let conn = ConnKey {
            venue: venue.to_string(),
            market,
        };
        if let Some(set) = self
            .state
            .subscriptions
            .lock()
            .expect("ws subscriptions poisoned")
            .get_mut(&conn)
        {
            set.remove(symbol);
        }
        if let Some(frame) = dialect::unsubscribe_frame(venue, market, symbol) {
            self.state.send_to(&conn, frame);
        }
        self.state
            .cache
            .write()
            .expect("ws cache poisoned")
            .remove(&key);
        debug!(venue, symbol, %market, "stream subscription removed");
    }

    /// Most recent streamed price, if any.
    pub fn cached_price(&self, venue: &str, symbol: &str, market: MarketType) -> Option<f64> {
        self.state
            .cache
            .read()
            .expect("ws cache poisoned")
            .get(&StreamKey {
                venue: venue.to_string(),
                symbol: symbol.to_string(),
                market,
            })
            .copied()
    }

    /// Signal shutdown, abort connection tasks and clear all state.
    /// Safe to call more than once.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.lock().expect("ws shutdown poisoned").cancel();
        for task in self.tasks.lock().expect("ws task list poisoned").drain(..) {
            task.abort();
        }
        self.state.senders.lock().expect("ws senders poisoned").clear();
        self.state
            .subscriptions
            .lock()
            .expect("ws subscriptions poisoned")
            .clear();
        self.state.callbacks.lock().expect("ws callbacks poisoned").clear();
        self.state.cache.write().expect("ws cache poisoned").clear();
        info!("stream manager stopped");
    }

    #[cfg(test)]
    fn handle_message(&self, venue: &str, market: MarketType, text: &str) {
        self.state.handle_message(venue, market, text);
    }

    #[cfg(test)]
    fn replay_frames(&self, venue: &str, market: MarketType) -> Vec<String> {
        self.state.replay_frames(&ConnKey {
            venue: venue.to_string(),
            market,
        })
    }

    #[cfg(test)]
    fn attach_sender(&self, venue: &str, market: MarketType, tx: mpsc::UnboundedSender<String>) {
        self.state.attach_sender(
            &ConnKey {
                venue: venue.to_string(),
                market,
            },
            tx,
        );
    }
}

impl WsState {
    fn send_to(&self, conn: &ConnKey, frame: String) {
        let senders = self.senders.lock().expect("ws senders poisoned");
        if let Some(tx) = senders.get(conn) {
            let _ = tx.send(frame);
        }
    }

    /// Make a fresh connection's sender visible, then queue the replay.
    /// The sender must be registered first: a `subscribe` racing the
    /// connect would otherwise record the symbol but lose its wire frame
    /// until the next reconnect.
    fn attach_sender(&self, conn: &ConnKey, tx: mpsc::UnboundedSender<String>) {
        self.senders
            .lock()
            .expect("ws senders poisoned")
            .insert(conn.clone(), tx.clone());
        for frame in self.replay_frames(conn) {
            let _ = tx.send(frame);
        }
    }

    /// Subscribe frames for every active symbol on a connection, one
    /// frame per symbol.
    fn replay_frames(&self, conn: &ConnKey) -> Vec<String> {
        let subscriptions = self.subscriptions.lock().expect("ws subscriptions poisoned");
        subscriptions
            .get(conn)
            .map(|symbols| {
                symbols
                    .iter()
                    .filter_map(|s| dialect::subscribe_frame(&conn.venue, conn.market, s))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn handle_message(&self, venue: &str, market: MarketType, text: &str) {
        let Some((symbol, price)) = dialect::parse_tick(venue, market, text) else {
            return;
        };
        let key = StreamKey {
            venue: venue.to_string(),
            symbol,
            market,
        };
        self.cache
            .write()
            .expect("ws cache poisoned")
            .insert(key.clone(), price);

        let callbacks: Vec<PriceCallback> = self
            .callbacks
            .lock()
            .expect("ws callbacks poisoned")
            .get(&key)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for cb in callbacks {
            if std::panic::catch_unwind(AssertUnwindSafe(|| cb(price))).is_err() {
                error!(venue, symbol = %key.symbol, "price callback panicked");
            }
        }
    }
}

async fn run_connection(
    state: Arc<WsState>,
    key: ConnKey,
    url: String,
    shutdown: CancellationToken,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match connect(&url).await {
            Ok(ws) => {
                info!(venue = %key.venue, market = %key.market, "stream connected");
                backoff = INITIAL_BACKOFF;
                let (mut sink, mut source) = ws.split();

                // Replay goes through the outbound channel so it shares
                // the send path with live subscribes.
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                state.attach_sender(&key, tx);

                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            let _ = sink.close().await;
                            state.senders.lock().expect("ws senders poisoned").remove(&key);
                            return;
                        }
                        Some(frame) = rx.recv() => {
                            if let Err(err) = sink.send(Message::Text(frame.into())).await {
                                warn!(venue = %key.venue, %err, "stream send failed");
                                break;
                            }
                        }
                        inbound = source.next() => {
                            match inbound {
                                Some(Ok(Message::Text(text))) => {
                                    state.handle_message(&key.venue, key.market, &text);
                                }
                                Some(Ok(Message::Ping(payload))) => {
                                    let _ = sink.send(Message::Pong(payload)).await;
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    warn!(venue = %key.venue, market = %key.market, "stream closed");
                                    break;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(err)) => {
                                    warn!(venue = %key.venue, %err, "stream read error");
                                    break;
                                }
                            }
                        }
                    }
                }
                state.senders.lock().expect("ws senders poisoned").remove(&key);
            }
            Err(err) => {
                warn!(venue = %key.venue, market = %key.market, %err, "stream connect failed");
            }
        }

        let jitter = Duration::from_millis(rand::random::<u64>() % 1000);
        let delay = backoff.min(MAX_BACKOFF) + jitter;
        debug!(venue = %key.venue, market = %key.market, ?delay, "reconnecting");
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect with TLSv1.2 as the floor.
async fn connect(url: &str) -> Result<WsStream, crate::adapters::ExchangeError> {
    let tls = native_tls::TlsConnector::builder()
        .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
        .build()
        .map_err(|e| crate::adapters::ExchangeError::ConnectionFailed(format!("TLS error: {e}")))?;

    let (stream, _response) =
        connect_async_tls_with_config(url, None, false, Some(Connector::NativeTls(tls)))
            .await
            .map_err(|e| crate::adapters::ExchangeError::WebSocket(Box::new(e)))?;
    Ok(stream)
}
