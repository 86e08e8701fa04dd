//! Redis backend.
//!
//! Commands go through a shared [`ConnectionManager`], which multiplexes and
//! reconnects on its own. Subscriptions need a connection of their own, so
//! every [`Backend::subscriber`] call opens a fresh `aio::PubSub`.

use std::pin::pin;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{ConnectionManager, PubSub};
use redis::{cmd, Client};
use tracing::{debug, info};

use super::{Backend, Notification, ScanPage, Subscriber};
use crate::config::Transport;
use crate::error::{MirrorError, Result};

pub struct RedisBackend {
    client: Client,
    connection: ConnectionManager,
}

impl RedisBackend {
    /// Connects to the server described by `transport`.
    pub async fn connect(transport: &Transport) -> Result<Self> {
        let url = transport.connection_url();
        let client = Client::open(url.as_str())?;
        let connection = ConnectionManager::new(client.clone()).await?;
        info!(url = %url, "Connected to backing store");
        Ok(Self { client, connection })
    }

    /// Turns on keyspace notifications server-side, e.g. with flags `Egx`.
    pub async fn enable_keyspace_events(&self, flags: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg(flags)
            .query_async(&mut conn)
            .await?;
        info!(flags, "Enabled keyspace notifications");
        Ok(())
    }
}

#[async_trait]
impl Backend for RedisBackend {
    type Subscriber = RedisSubscriber;

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        let values: Vec<Option<String>> = cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(values)
    }

    async fn scan(&self, cursor: u64, count: usize) -> Result<ScanPage> {
        let mut conn = self.connection.clone();
        let (cursor, keys): (u64, Vec<String>) = cmd("SCAN")
            .arg(cursor)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok(ScanPage { cursor, keys })
    }

    async fn subscriber(&self) -> Result<RedisSubscriber> {
        let pubsub = self.client.get_async_pubsub().await?;
        debug!("Opened subscription connection");
        Ok(RedisSubscriber { pubsub })
    }
}

pub struct RedisSubscriber {
    pubsub: PubSub,
}

#[async_trait]
impl Subscriber for RedisSubscriber {
    async fn psubscribe(&mut self, pattern: &str) -> Result<()> {
        self.pubsub.psubscribe(pattern).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Notification> {
        let mut messages = pin!(self.pubsub.on_message());
        let msg = messages.next().await.ok_or(MirrorError::ConnectionClosed)?;
        let payload: String = msg.get_payload()?;
        Ok(Notification::new(msg.get_channel_name(), payload))
    }
}
