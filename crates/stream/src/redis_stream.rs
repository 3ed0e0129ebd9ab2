//! Redis Streams implementation of [`MessageStream`].

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use schema::Fields;
use tracing::info;

use crate::client::{MessageStream, StreamMessage};
use crate::error::StreamError;

/// Stream client backed by Redis Streams (`XADD`/`XREADGROUP`/`XACK`).
#[derive(Clone)]
pub struct RedisStream {
    conn: ConnectionManager,
}

impl RedisStream {
    /// Connects to the broker at `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> Result<Self, StreamError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "connected to stream broker");

        Ok(Self { conn })
    }
}

#[async_trait]
impl MessageStream for RedisStream {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();

        // MKSTREAM covers the race where the group is created before any
        // producer has appended to the stream. Group starts at offset 0 so
        // entries published before the service came up are still delivered.
        let created: Result<String, redis::RedisError> =
            conn.xgroup_create_mkstream(stream, group, "0").await;

        match created {
            Ok(_) => {
                info!(stream, group, "created consumer group");
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(1)
            .block(block.as_millis() as usize);

        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> =
            match conn.xread_options(&[stream], &[">"], &options).await {
                Ok(reply) => reply,
                Err(err) if err.code() == Some("NOGROUP") => {
                    return Err(StreamError::GroupNotFound {
                        stream: stream.to_string(),
                        group: group.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            };

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut messages = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let mut fields = Fields::new();
                for (name, value) in &entry.map {
                    let value: String = redis::from_redis_value(value).map_err(|_| {
                        StreamError::InvalidEntry {
                            id: entry.id.clone(),
                        }
                    })?;
                    fields.insert(name.clone(), value);
                }
                messages.push(StreamMessage {
                    id: entry.id.clone(),
                    fields,
                });
            }
        }

        Ok(messages)
    }

    async fn publish(
        &self,
        stream: &str,
        fields: &[(String, String)],
    ) -> Result<String, StreamError> {
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", fields).await?;
        Ok(id)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, &[id]).await?;
        Ok(())
    }
}
