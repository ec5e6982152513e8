//! Fakes shared by the worker tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use accord_core::{ChannelId, GuildId, Item, Registry, Subscription};

use crate::source::{Source, PAGE_SIZE};
use crate::transport::{Transport, TransportError};
use crate::wake::WakeSignal;

pub fn item(id: u64) -> Item {
    Item {
        id,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        url: format!("https://example.test/posts/{}", id),
    }
}

fn cursor(tags: &[String]) -> u64 {
    tags.iter()
        .find_map(|t| t.strip_prefix("id:>"))
        .and_then(|latest| latest.parse().ok())
        .unwrap_or(0)
}

/// Honors the cursor term and serves pages newest first, the way the real
/// source does.
#[derive(Default)]
pub struct FeedSource {
    items: Mutex<Vec<Item>>,
    pages_fetched: Mutex<Vec<u64>>,
}

impl FeedSource {
    pub fn new(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().collect()),
            pages_fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, item: Item) {
        self.items.lock().unwrap().push(item);
    }

    pub fn pages_fetched(&self) -> Vec<u64> {
        self.pages_fetched.lock().unwrap().clone()
    }

    fn matching(&self, tags: &[String]) -> Vec<Item> {
        let latest = cursor(tags);
        let mut items: Vec<Item> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.id > latest)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.id.cmp(&a.id));
        items
    }
}

#[async_trait]
impl Source for FeedSource {
    async fn count(&self, tags: &[String]) -> u64 {
        self.matching(tags).len() as u64
    }

    async fn fetch_page(&self, tags: &[String], page: u64) -> Vec<Item> {
        self.pages_fetched.lock().unwrap().push(page);
        self.matching(tags)
            .into_iter()
            .skip(((page - 1) * PAGE_SIZE) as usize)
            .take(PAGE_SIZE as usize)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub channel: ChannelId,
    pub item_id: u64,
    pub at: Instant,
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    fail_on: Mutex<Option<u64>>,
    panic_on: Mutex<Option<u64>>,
    shutdown_after_send: Mutex<Option<WakeSignal>>,
    remove_on_send: Mutex<Option<(Arc<Registry>, GuildId, Option<Subscription>)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn item_ids(&self) -> Vec<u64> {
        self.sent().iter().map(|s| s.item_id).collect()
    }

    pub fn fail_on(&self, id: Option<u64>) {
        *self.fail_on.lock().unwrap() = id;
    }

    pub fn panic_on(&self, id: u64) {
        *self.panic_on.lock().unwrap() = Some(id);
    }

    pub fn shutdown_after_first_send(&self, signal: WakeSignal) {
        *self.shutdown_after_send.lock().unwrap() = Some(signal);
    }

    /// Drop the receiving subscription from `registry` on the first send.
    pub fn remove_on_send(&self, registry: Arc<Registry>, guild: GuildId) {
        *self.remove_on_send.lock().unwrap() = Some((registry, guild, None));
    }

    /// Like `remove_on_send`, then record `replacement` on the same channel.
    pub fn replace_on_send(&self, registry: Arc<Registry>, guild: GuildId, replacement: Subscription) {
        *self.remove_on_send.lock().unwrap() = Some((registry, guild, Some(replacement)));
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), TransportError> {
        let item_id: u64 = text
            .rsplit('/')
            .next()
            .and_then(|id| id.parse().ok())
            .unwrap_or_default();

        if *self.panic_on.lock().unwrap() == Some(item_id) {
            panic!("transport blew up on {}", item_id);
        }
        if *self.fail_on.lock().unwrap() == Some(item_id) {
            return Err(TransportError::Send(format!("item {} refused", item_id)));
        }

        self.sent.lock().unwrap().push(Sent {
            channel,
            item_id,
            at: Instant::now(),
        });

        if let Some(signal) = self.shutdown_after_send.lock().unwrap().take() {
            signal.shutdown();
        }
        let remove = self.remove_on_send.lock().unwrap().take();
        if let Some((registry, guild, replacement)) = remove {
            let mut guilds = registry.lock().await;
            if let Some(g) = guilds.get_mut(&guild) {
                let _ = g.remove(channel);
                if let Some(replacement) = replacement {
                    let _ = g.insert(replacement);
                }
            }
        }
        Ok(())
    }
}
