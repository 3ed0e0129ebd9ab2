//! In-memory stream implementation for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schema::Fields;
use tokio::sync::RwLock;

use crate::client::{MessageStream, StreamMessage};
use crate::error::StreamError;

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    fields: Fields,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Index of the next never-delivered entry.
    cursor: usize,
    /// IDs delivered but not yet acknowledged.
    pending: Vec<String>,
    /// IDs explicitly requeued for redelivery.
    requeued: VecDeque<String>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: Vec<Entry>,
    groups: HashMap<String, GroupState>,
}

/// In-memory stream with real consumer-group semantics.
///
/// Behaves like the Redis implementation from the loops' point of view:
/// each group tracks its own delivery cursor and pending entries, and
/// unacknowledged entries can be requeued to exercise redelivery paths.
#[derive(Clone, Default)]
pub struct InMemoryStream {
    inner: Arc<RwLock<HashMap<String, StreamState>>>,
}

impl InMemoryStream {
    /// Creates a new empty stream broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries appended to `stream`.
    pub async fn len(&self, stream: &str) -> usize {
        self.inner
            .read()
            .await
            .get(stream)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    /// Returns true if `stream` has no entries.
    pub async fn is_empty(&self, stream: &str) -> bool {
        self.len(stream).await == 0
    }

    /// Returns the number of delivered-but-unacknowledged entries for a group.
    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.inner
            .read()
            .await
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }

    /// Returns every entry appended to `stream`, in append order.
    pub async fn entries(&self, stream: &str) -> Vec<StreamMessage> {
        self.inner
            .read()
            .await
            .get(stream)
            .map(|s| {
                s.entries
                    .iter()
                    .map(|e| StreamMessage {
                        id: e.id.clone(),
                        fields: e.fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Requeues all pending entries of a group for redelivery.
    ///
    /// Models a consumer that crashed between read and ack.
    pub async fn claim_pending(&self, stream: &str, group: &str) {
        let mut inner = self.inner.write().await;
        if let Some(state) = inner.get_mut(stream)
            && let Some(group) = state.groups.get_mut(group)
        {
            for id in group.pending.clone() {
                if !group.requeued.contains(&id) {
                    group.requeued.push_back(id);
                }
            }
        }
    }
}

#[async_trait]
impl MessageStream for InMemoryStream {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut inner = self.inner.write().await;
        let state = inner.entry(stream.to_string()).or_default();
        state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        block: Duration,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        let deadline = tokio::time::Instant::now() + block;

        loop {
            {
                let mut inner = self.inner.write().await;
                let state = inner.entry(stream.to_string()).or_default();
                let entries = state.entries.clone();
                let group_state = state.groups.get_mut(group).ok_or_else(|| {
                    StreamError::GroupNotFound {
                        stream: stream.to_string(),
                        group: group.to_string(),
                    }
                })?;

                if let Some(id) = group_state.requeued.pop_front() {
                    if let Some(entry) = entries.iter().find(|e| e.id == id) {
                        return Ok(vec![StreamMessage {
                            id: entry.id.clone(),
                            fields: entry.fields.clone(),
                        }]);
                    }
                }

                if group_state.cursor < entries.len() {
                    let entry = &entries[group_state.cursor];
                    group_state.cursor += 1;
                    group_state.pending.push(entry.id.clone());
                    return Ok(vec![StreamMessage {
                        id: entry.id.clone(),
                        fields: entry.fields.clone(),
                    }]);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn publish(
        &self,
        stream: &str,
        fields: &[(String, String)],
    ) -> Result<String, StreamError> {
        let mut inner = self.inner.write().await;
        let state = inner.entry(stream.to_string()).or_default();
        let id = format!("{}-0", state.entries.len() + 1);
        state.entries.push(Entry {
            id: id.clone(),
            fields: fields.iter().cloned().collect(),
        });
        Ok(id)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let mut inner = self.inner.write().await;
        if let Some(state) = inner.get_mut(stream)
            && let Some(group) = state.groups.get_mut(group)
        {
            group.pending.retain(|p| p != id);
            group.requeued.retain(|p| p != id);
        }
        Ok(())
    }
}
