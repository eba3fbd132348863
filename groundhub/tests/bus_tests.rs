use std::sync::Once;
use std::time::Duration;

use serde_json::json;

use groundhub::bus::topics::{DEFAULT_TOPICS, TELEMETRY};
use groundhub::bus::{Hub, Message, RateLimit, Topic, TopicConf};

static INIT: Once = Once::new();
const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Debug;
const WAIT_DURATION: Duration = Duration::from_millis(50);
const WAIT_LONG_DURATION: Duration = Duration::from_millis(500);

fn initialize() {
    INIT.call_once(|| {
        env_logger::builder()
            // Suppress everything below `warn` for third-party modules
            .filter_level(log::LevelFilter::Warn)
            // Allow everything above `LOG_LEVEL` from current package
            .filter_module(env!("CARGO_PKG_NAME"), LOG_LEVEL)
            .init();
    });
}

#[tokio::test]
async fn stream_envelope_reaches_only_its_topic() {
    initialize();
    let hub = Hub::with_default_topics();

    let mut first = hub.subscribe(TELEMETRY, RateLimit::Unlimited).unwrap();
    let mut second = hub.subscribe(TELEMETRY, RateLimit::Unlimited).unwrap();
    let mut others: Vec<_> = DEFAULT_TOPICS
        .into_iter()
        .filter(|&topic| topic != TELEMETRY)
        .map(|topic| hub.subscribe(topic, RateLimit::Unlimited).unwrap())
        .collect();

    let data = json!({"latitude": 38.145, "longitude": -76.427, "altitude_msl": 100.0, "heading": 90.0});
    let envelope = json!({"type": "stream", "rec": TELEMETRY, "data": data});
    assert!(hub.handle_message(envelope.to_string().as_bytes()));

    for subscription in [&mut first, &mut second] {
        let message = subscription
            .recv_timeout(WAIT_LONG_DURATION)
            .await
            .unwrap();
        assert_eq!(message.value(), &data);
    }
    for other in others.iter_mut() {
        assert!(
            other.recv_timeout(WAIT_DURATION).await.is_none(),
            "`{}` received a message",
            other.topic()
        );
    }
}

#[tokio::test]
async fn malformed_and_misaddressed_envelopes_are_dropped() {
    initialize();
    let hub = Hub::with_default_topics();

    assert!(!hub.handle_message(b"{not json"));
    assert!(!hub.handle_message(br#"{"type": "stream", "rec": "nowhere", "data": 1}"#));
    assert!(!hub.handle_message(br#"{"type": "send", "rec": "nobody", "data": 1}"#));
    assert!(!hub.handle_message(br#"{"type": "shout", "rec": "telemetry", "data": 1}"#));
}

#[tokio::test]
async fn full_inbox_drops_further_publishes() {
    initialize();
    let conf = TopicConf {
        capacity: 4,
        ..Default::default()
    };
    // Dispatcher is not running, so nothing leaves the inbox.
    let (topic, _dispatcher) = Topic::new("bounded", conf);

    for n in 0..4 {
        assert!(topic.publish(Message::new(json!(n))));
    }
    assert!(!topic.publish(Message::new(json!(4))));
}

#[tokio::test]
async fn subscribers_see_publish_order() {
    initialize();
    let hub = Hub::builder().topic("ordered").build().unwrap();
    let mut subscription = hub.subscribe("ordered", RateLimit::Unlimited).unwrap();

    for n in 0..100 {
        hub.publish("ordered", Message::new(json!(n)));
    }

    let mut last = -1i64;
    while let Some(message) = subscription.recv_timeout(WAIT_DURATION).await {
        let n = message.value().as_i64().unwrap();
        assert!(n > last);
        last = n;
    }
    assert_eq!(last, 99);
}
