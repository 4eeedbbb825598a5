//! Feed Session Integration Tests
//!
//! Drives the connector against a mock authorize endpoint and a local
//! WebSocket server speaking the protobuf frame protocol.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use prost::Message as _;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use market_feed_ingest::infrastructure::feed::ConnectionState;
use market_feed_ingest::infrastructure::feed::codec::{
    Feed, FeedResponse, FeedType, FeedUnion, FullFeed, FullFeedUnion, IndexFullFeed, MarketInfo,
    MarketOhlc, MarketStatus, Ohlc,
};
use market_feed_ingest::{
    AccessToken, FeedConnector, FeedSettings, FeedStatus, InstrumentSource, QueueConsumer,
    TokenSource, ingest_queue,
};

const AUTHORIZE_PATH: &str = "/v3/feed/market-data-feed/authorize";
const INSTRUMENT: &str = "NSE_INDEX|Nifty 50";

// =============================================================================
// Frame builders
// =============================================================================

fn market_info_frame() -> Vec<u8> {
    FeedResponse {
        r#type: FeedType::MarketInfo as i32,
        feeds: BTreeMap::new(),
        current_ts: 1_757_580_000_000,
        market_info: Some(MarketInfo {
            segment_status: BTreeMap::from([(
                "NSE_INDEX".to_string(),
                MarketStatus::NormalOpen as i32,
            )]),
        }),
    }
    .encode_to_vec()
}

fn index_frame(feed_type: FeedType, close: f64, ts: i64) -> Vec<u8> {
    let candle = Ohlc {
        interval: "I1".to_string(),
        open: Some(24_950.5),
        high: Some(24_990.0),
        low: Some(24_940.25),
        close: Some(close),
        vol: None,
        ts,
    };
    let feed = Feed {
        feed_union: Some(FeedUnion::FullFeed(FullFeed {
            full_feed_union: Some(FullFeedUnion::IndexFf(IndexFullFeed {
                ltpc: None,
                market_ohlc: Some(MarketOhlc { ohlc: vec![candle] }),
            })),
        })),
    };
    FeedResponse {
        r#type: feed_type as i32,
        feeds: BTreeMap::from([(INSTRUMENT.to_string(), feed)]),
        current_ts: ts,
        market_info: None,
    }
    .encode_to_vec()
}

// =============================================================================
// Test servers
// =============================================================================

/// How the stream server treats one accepted connection.
#[derive(Clone, Copy)]
enum Script {
    /// Send the info frame, then hang up.
    DropAfterInfo,
    /// Send info, snapshot and two live frames, then hold the connection.
    Stream,
}

/// Serve the given scripts, one per accepted connection, in order.
async fn start_stream_server(
    scripts: Vec<Script>,
) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uri = format!("ws://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut subscriptions = Vec::new();
        for script in scripts {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let subscription = loop {
                match ws.next().await {
                    Some(Ok(Message::Binary(data))) => {
                        break String::from_utf8(data.to_vec()).unwrap();
                    }
                    Some(Ok(Message::Text(text))) => break text.as_str().to_string(),
                    Some(Ok(_)) => {}
                    other => panic!("connection ended before subscribing: {other:?}"),
                }
            };
            subscriptions.push(subscription);

            ws.send(Message::Binary(market_info_frame().into()))
                .await
                .unwrap();

            match script {
                Script::DropAfterInfo => {
                    let _ = ws.close(None).await;
                }
                Script::Stream => {
                    for frame in [
                        index_frame(FeedType::InitialFeed, 24_900.0, 1_757_579_940_000),
                        index_frame(FeedType::LiveFeed, 24_975.75, 1_757_580_000_000),
                        index_frame(FeedType::LiveFeed, 24_980.0, 1_757_580_060_000),
                    ] {
                        ws.send(Message::Binary(frame.into())).await.unwrap();
                    }
                    while let Some(Ok(_)) = ws.next().await {}
                }
            }
        }
        subscriptions
    });

    (uri, handle)
}

async fn start_authorize_server(stream_uri: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(AUTHORIZE_PATH))
        .and(header("authorization", "Bearer feed-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "data": {
                "authorized_redirect_uri": stream_uri,
            }
        })))
        .mount(&server)
        .await;
    server
}

fn settings(authorize_url: String) -> FeedSettings {
    let mut settings = FeedSettings::new(
        TokenSource::Static(AccessToken::new("feed-token")),
        InstrumentSource::List(vec![INSTRUMENT.to_string()]),
    );
    settings.authorize_url = authorize_url;
    settings.subscribe_delay = Duration::ZERO;
    settings.read_timeout = Duration::from_secs(5);
    settings.transport_retry_delay = Duration::from_millis(10);
    settings
}

async fn next_record(consumer: &mut QueueConsumer) -> market_feed_ingest::MarketRecord {
    timeout(Duration::from_secs(5), consumer.recv())
        .await
        .expect("no record arrived")
        .expect("queue closed")
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_live_frames_reach_the_queue_and_snapshot_is_discarded() {
    let (stream_uri, stream) = start_stream_server(vec![Script::Stream]).await;
    let auth = start_authorize_server(&stream_uri).await;

    let (producer, mut consumer) = ingest_queue(100);
    let status = Arc::new(FeedStatus::new());
    let cancel = CancellationToken::new();
    let connector = FeedConnector::new(
        settings(format!("{}{AUTHORIZE_PATH}", auth.uri())),
        reqwest::Client::new(),
        producer,
        Arc::clone(&status),
        cancel.clone(),
    );
    let task = tokio::spawn(connector.run());

    let first = next_record(&mut consumer).await;
    assert_eq!(first.feed_id, INSTRUMENT);
    assert_eq!(first.interval, "I1");
    assert_eq!(first.close, Some(24_975.75));
    assert_eq!(first.volume, None);
    assert_eq!(first.timestamp_ms, 1_757_580_000_000);

    let second = next_record(&mut consumer).await;
    assert_eq!(second.close, Some(24_980.0));
    assert!(consumer.is_empty());

    assert_eq!(status.state(), ConnectionState::Streaming);
    timeout(Duration::from_secs(5), async {
        while status.snapshot().records_received < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("frame counters never caught up");
    let snapshot = status.snapshot();
    assert_eq!(snapshot.frames_received, 2);
    assert_eq!(snapshot.reconnects, 0);

    cancel.cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(status.state(), ConnectionState::Disconnected);

    let subscriptions = stream.await.unwrap();
    let request: serde_json::Value = serde_json::from_str(&subscriptions[0]).unwrap();
    assert_eq!(request["method"], "sub");
    assert_eq!(request["data"]["mode"], "full");
    assert_eq!(request["data"]["instrumentKeys"][0], INSTRUMENT);
}

#[tokio::test]
async fn test_dropped_connection_is_retried_with_same_authorization() {
    let (stream_uri, stream) =
        start_stream_server(vec![Script::DropAfterInfo, Script::Stream]).await;
    let auth = start_authorize_server(&stream_uri).await;

    let (producer, mut consumer) = ingest_queue(100);
    let status = Arc::new(FeedStatus::new());
    let cancel = CancellationToken::new();
    let connector = FeedConnector::new(
        settings(format!("{}{AUTHORIZE_PATH}", auth.uri())),
        reqwest::Client::new(),
        producer,
        Arc::clone(&status),
        cancel.clone(),
    );
    let task = tokio::spawn(connector.run());

    let record = next_record(&mut consumer).await;
    assert_eq!(record.close, Some(24_975.75));
    assert_eq!(status.snapshot().reconnects, 1);

    cancel.cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let subscriptions = stream.await.unwrap();
    assert_eq!(subscriptions.len(), 2);
    assert_eq!(auth.received_requests().await.unwrap().len(), 1);
}
