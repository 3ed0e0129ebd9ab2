//! Outbox producer loop.
//!
//! Drains a service's local event log into the shared stream: fixed-period
//! poll, at most one publish in flight, unbounded exponential backoff on
//! publish failure, cursor advanced only after a confirmed publish. There is
//! no event-dropping path; a permanently unreachable broker blocks progress
//! by design.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::client::MessageStream;
use crate::outbox::EventLog;

/// Runs the producer loop until the shutdown signal flips to `true`.
///
/// A crash (or failed cursor update) between publish and ack causes the same
/// entry to be republished on the next poll; consumers must tolerate
/// duplicate domain events.
pub async fn run_producer<S, L>(
    stream: &S,
    log: &L,
    topic: &str,
    poll_period: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: MessageStream,
    L: EventLog,
{
    let mut ticker = tokio::time::interval(poll_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender means the service is tearing down; stop
                // rather than spinning on the closed channel.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let entry = match log.next_event().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(error = %err, "failed to poll outbox");
                        continue;
                    }
                };

                let publish = || async { stream.publish(topic, &entry.fields).await };
                let retried = publish
                    .retry(
                        ExponentialBuilder::default()
                            .with_min_delay(Duration::from_millis(50))
                            .with_max_delay(Duration::from_secs(10))
                            .without_max_times(),
                    )
                    .notify(|err, delay| {
                        warn!(error = %err, ?delay, "publish failed, backing off");
                    });

                let message_id = tokio::select! {
                    published = retried => match published {
                        Ok(id) => id,
                        Err(err) => {
                            error!(error = %err, "publish failed permanently");
                            continue;
                        }
                    },
                    _ = wait_for_shutdown(&mut shutdown) => break,
                };

                if let Err(err) = log.ack(entry.offset).await {
                    // The event was published but the cursor did not advance;
                    // it will be republished on the next poll.
                    warn!(error = %err, offset = entry.offset, "failed to advance outbox cursor");
                    continue;
                }

                metrics::counter!("outbox_events_published_total").increment(1);
                debug!(offset = entry.offset, message_id = %message_id, topic, "outbox event published");
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::error::StreamError;
    use crate::memory::InMemoryStream;
    use crate::outbox::OutboxEntry;

    /// Event log over a vector, mirroring the shape of the SQL-backed logs.
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

        async fn acked_offset(&self) -> i64 {
            *self.acked.lock().await
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

    /// Stream wrapper whose first `failures` publishes fail.
    struct FlakyStream {
        inner: InMemoryStream,
        failures: AtomicUsize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl MessageStream for FlakyStream {
        async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
            self.inner.ensure_group(stream, group).await
        }

        async fn read_group(
            &self,
            stream: &str,
            group: &str,
            consumer: &str,
            block: Duration,
        ) -> Result<Vec<crate::StreamMessage>, StreamError> {
            self.inner.read_group(stream, group, consumer, block).await
        }

        async fn publish(
            &self,
            stream: &str,
            fields: &[(String, String)],
        ) -> Result<String, StreamError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StreamError::InvalidEntry {
                    id: "injected".to_string(),
                });
            }
            self.inner.publish(stream, fields).await
        }

        async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
            self.inner.ack(stream, group, id).await
        }
    }

    fn entry(offset: i64) -> OutboxEntry {
        OutboxEntry {
            offset,
            fields: vec![("offset".to_string(), offset.to_string())],
        }
    }

    async fn wait_for_len(broker: &InMemoryStream, stream: &str, len: usize) {
        for _ in 0..500 {
            if broker.len(stream).await == len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("stream never reached {len} entries");
    }

    #[tokio::test]
    async fn test_publishes_in_offset_order_and_advances_cursor() {
        let broker = Arc::new(InMemoryStream::new());
        let log = Arc::new(VecEventLog::with_entries(vec![
            entry(1),
            entry(2),
            entry(3),
        ]));
        let (tx, rx) = watch::channel(false);

        let task = {
            let broker = broker.clone();
            let log = log.clone();
            tokio::spawn(async move {
                run_producer(&*broker, &*log, "topic", Duration::from_millis(2), rx).await;
            })
        };

        wait_for_len(&broker, "topic", 3).await;

        tx.send(true).unwrap();
        task.await.unwrap();

        let published = broker.entries("topic").await;
        let offsets: Vec<&str> = published
            .iter()
            .map(|m| m.fields["offset"].as_str())
            .collect();
        assert_eq!(offsets, ["1", "2", "3"]);
        assert_eq!(log.acked_offset().await, 3);
    }

    #[tokio::test]
    async fn test_publish_failure_retries_before_ack() {
        let broker = Arc::new(FlakyStream {
            inner: InMemoryStream::new(),
            failures: AtomicUsize::new(2),
            attempts: AtomicUsize::new(0),
        });
        let log = Arc::new(VecEventLog::with_entries(vec![entry(1)]));
        let (tx, rx) = watch::channel(false);

        let task = {
            let broker = broker.clone();
            let log = log.clone();
            tokio::spawn(async move {
                run_producer(&*broker, &*log, "topic", Duration::from_millis(2), rx).await;
            })
        };

        wait_for_len(&broker.inner, "topic", 1).await;

        tx.send(true).unwrap();
        task.await.unwrap();

        // Two injected failures plus the successful attempt.
        assert!(broker.attempts.load(Ordering::SeqCst) >= 3);
        assert_eq!(log.acked_offset().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_producer() {
        let broker = InMemoryStream::new();
        let log = VecEventLog::default();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn({
            let broker = broker.clone();
            async move {
                run_producer(&broker, &log, "topic", Duration::from_millis(2), rx).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("producer did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_producer() {
        let broker = InMemoryStream::new();
        let log = VecEventLog::default();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn({
            let broker = broker.clone();
            async move {
                run_producer(&broker, &log, "topic", Duration::from_millis(2), rx).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("producer did not stop after sender was dropped")
            .unwrap();
    }
}
