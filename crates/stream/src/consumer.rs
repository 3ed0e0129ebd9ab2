//! Stream consumer loop.
//!
//! Each service runs one consumer loop per subscribed stream: join the
//! consumer group (retrying until the broker is reachable), read one entry
//! at a time with a bounded block so shutdown is observed promptly, hand the
//! entry to the service handler, and acknowledge only on success. An entry
//! whose handler fails stays pending and is redelivered, so handlers must be
//! idempotent.

use std::time::Duration;

use async_trait::async_trait;
use schema::Fields;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::MessageStream;
use crate::error::StreamError;

const READ_BLOCK: Duration = Duration::from_secs(1);
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Infrastructure failure raised by a message handler.
///
/// Returning this leaves the entry unacknowledged so it is redelivered.
/// Domain-rule rejections are not errors at this level: the handler records
/// the rejection and returns `Ok`, because redelivering the entry would only
/// reproduce the same decision.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct HandlerError(Box<dyn std::error::Error + Send + Sync>);

impl HandlerError {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }
}

/// A service's reaction to entries of one stream.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, fields: &Fields) -> Result<(), HandlerError>;
}

/// Runs the consumer loop until the shutdown signal flips to `true` (or its
/// sender is dropped).
pub async fn run_consumer<S, H>(
    stream: &S,
    topic: &str,
    group: &str,
    handler: &H,
    mut shutdown: watch::Receiver<bool>,
) where
    S: MessageStream,
    H: MessageHandler,
{
    'join: loop {
        // Services start concurrently, so the broker may not be up yet; keep
        // retrying group creation until it succeeds or we are told to stop.
        while let Err(err) = stream.ensure_group(topic, group).await {
            warn!(error = %err, topic, group, "failed to join consumer group");
            if !sleep_or_shutdown(&mut shutdown).await {
                return;
            }
        }

        // A fresh name per process: pending entries of a dead consumer are not
        // reclaimed here, they stay visible in the group's pending list.
        let consumer = Uuid::new_v4().to_string();
        debug!(topic, group, consumer = %consumer, "consumer joined group");

        while !*shutdown.borrow() {
            let messages = match stream.read_group(topic, group, &consumer, READ_BLOCK).await {
                Ok(messages) => messages,
                Err(StreamError::GroupNotFound { .. }) => {
                    // The broker lost the group after we joined (flush,
                    // failover); recreate it instead of rereading forever.
                    warn!(topic, group, "consumer group disappeared, rejoining");
                    continue 'join;
                }
                Err(err) => {
                    warn!(error = %err, topic, group, "stream read failed");
                    if !sleep_or_shutdown(&mut shutdown).await {
                        return;
                    }
                    continue;
                }
            };

            for message in messages {
                metrics::counter!("stream_entries_received_total").increment(1);

                match handler.handle(&message.fields).await {
                    Ok(()) => {
                        if let Err(err) = stream.ack(topic, group, &message.id).await {
                            // The entry was handled but stays pending; the
                            // redelivered copy must hit the handler's idempotency.
                            warn!(error = %err, id = %message.id, topic, "failed to acknowledge entry");
                        } else {
                            debug!(id = %message.id, topic, "entry acknowledged");
                        }
                    }
                    Err(err) => {
                        metrics::counter!("stream_entries_failed_total").increment(1);
                        warn!(error = %err, id = %message.id, topic, "handler failed, entry left for redelivery");
                    }
                }
            }
        }

        return;
    }
}

/// Sleeps for the retry delay, waking early on a shutdown signal.
///
/// Returns `false` when the loop should stop: the signal flipped to `true`
/// or its sender is gone.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(RETRY_DELAY) => {}
        changed = shutdown.changed() => {
            if changed.is_err() {
                return false;
            }
        }
    }
    !*shutdown.borrow()
}
