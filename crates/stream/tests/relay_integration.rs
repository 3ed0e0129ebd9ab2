//! Integration tests for the outbox relay pipeline.
//!
//! Wires a producer loop and a consumer loop together over the in-memory
//! broker: events appended to a local log must reach the consumer group in
//! offset order, and a crash between publish and cursor ack must result in a
//! duplicate delivery, never a lost one.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};

use stream::{
    EventLog, HandlerError, InMemoryStream, MessageHandler, MessageStream, OutboxEntry,
    run_consumer, run_producer,
};

const TOPIC: &str = "orders_stream";
const GROUP: &str = "payments_group";

/// Event log over a vector, the same shape the SQL-backed logs expose.
#[derive(Default)]
struct VecEventLog {
    entries: Mutex<Vec<OutboxEntry>>,
    acked: Mutex<i64>,
}

impl VecEventLog {
    fn with_entries(entries: Vec<OutboxEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            acked: Mutex::new(0),
        }
    }
}

#[async_trait]
impl EventLog for VecEventLog {
    type Error = Infallible;

    async fn next_event(&self) -> Result<Option<OutboxEntry>, Infallible> {
        let acked = *self.acked.lock().await;
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|e| e.offset > acked)
            .min_by_key(|e| e.offset)
            .cloned())
    }

    async fn ack(&self, offset: i64) -> Result<(), Infallible> {
        *self.acked.lock().await = offset;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingHandler {
    offsets: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, fields: &schema::Fields) -> Result<(), HandlerError> {
        self.offsets.lock().await.push(fields["offset"].clone());
        Ok(())
    }
}

fn entry(offset: i64) -> OutboxEntry {
    OutboxEntry {
        offset,
        fields: vec![("offset".to_string(), offset.to_string())],
    }
}

async fn wait_for_count(handler: &RecordingHandler, count: usize) {
    for _ in 0..500 {
        if handler.offsets.lock().await.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("handler never saw {count} entries");
}

#[tokio::test]
async fn test_outbox_events_reach_the_consumer_in_offset_order() {
    let broker = Arc::new(InMemoryStream::new());
    let log = Arc::new(VecEventLog::with_entries(vec![
        entry(1),
        entry(2),
        entry(3),
    ]));
    let handler = Arc::new(RecordingHandler::default());
    let (tx, rx) = watch::channel(false);

    let producer = tokio::spawn({
        let broker = broker.clone();
        let log = log.clone();
        let rx = rx.clone();
        async move { run_producer(&*broker, &*log, TOPIC, Duration::from_millis(2), rx).await }
    });
    let consumer = tokio::spawn({
        let broker = broker.clone();
        let handler = handler.clone();
        async move { run_consumer(&*broker, TOPIC, GROUP, &*handler, rx).await }
    });

    wait_for_count(&handler, 3).await;

    tx.send(true).unwrap();
    producer.await.unwrap();
    consumer.await.unwrap();

    assert_eq!(*handler.offsets.lock().await, ["1", "2", "3"]);
    assert_eq!(broker.pending_count(TOPIC, GROUP).await, 0);
}

#[tokio::test]
async fn test_crash_between_publish_and_ack_duplicates_but_never_drops() {
    let broker = Arc::new(InMemoryStream::new());

    // The previous producer incarnation published offset 1 and crashed
    // before advancing the cursor.
    broker.publish(TOPIC, &entry(1).fields).await.unwrap();

    let log = Arc::new(VecEventLog::with_entries(vec![entry(1), entry(2)]));
    let handler = Arc::new(RecordingHandler::default());
    let (tx, rx) = watch::channel(false);

    let producer = tokio::spawn({
        let broker = broker.clone();
        let log = log.clone();
        let rx = rx.clone();
        async move { run_producer(&*broker, &*log, TOPIC, Duration::from_millis(2), rx).await }
    });
    let consumer = tokio::spawn({
        let broker = broker.clone();
        let handler = handler.clone();
        async move { run_consumer(&*broker, TOPIC, GROUP, &*handler, rx).await }
    });

    // The restarted producer republishes offset 1, then publishes offset 2.
    wait_for_count(&handler, 3).await;

    tx.send(true).unwrap();
    producer.await.unwrap();
    consumer.await.unwrap();

    let seen = handler.offsets.lock().await;
    assert_eq!(*seen, ["1", "1", "2"]);
}

#[tokio::test]
async fn test_consumer_joins_before_the_stream_exists() {
    let broker = Arc::new(InMemoryStream::new());
    let handler = Arc::new(RecordingHandler::default());
    let (tx, rx) = watch::channel(false);

    // Consumer starts first; the group is created against an empty stream.
    let consumer = tokio::spawn({
        let broker = broker.clone();
        let handler = handler.clone();
        async move { run_consumer(&*broker, TOPIC, GROUP, &*handler, rx).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    broker.publish(TOPIC, &entry(1).fields).await.unwrap();

    wait_for_count(&handler, 1).await;

    tx.send(true).unwrap();
    consumer.await.unwrap();

    assert_eq!(*handler.offsets.lock().await, ["1"]);
}
