use std::future::Future;

use futures::StreamExt;
use reqwest::{
    header::{ACCEPT, CACHE_CONTROL},
    Client,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use url::Url;

use crate::{
    error::{NagareError, NagareResult},
    locator::FragmentLocator,
    util::event_stream::{EventStreamParser, ServerEvent},
};

pub type LocatorReceiver = mpsc::UnboundedReceiver<NagareResult<FragmentLocator>>;

/// Announces fragments that became available on the fragment server.
///
/// ```text
/// ┌──────────────────┐  segment_path  ┌────────────────┐  locator  ┌────────────┐
/// │ Notification     ├───────────────►│ subscribe task ├──────────►│ Player     │
/// │ channel (server) │                │ parse, resolve │  [MPSC]   │ controller │
/// └──────────────────┘                └────────────────┘           └────────────┘
/// ```
///
/// The returned channel yields locators in arrival order. Closing it without an
/// error ends the feed, a fatal error is sent as the last item. Dropping the
/// receiver unsubscribes.
pub trait NotificationSource: Send + Sync + 'static {
    fn subscribe(&self) -> impl Future<Output = NagareResult<LocatorReceiver>> + Send;
}

#[derive(Debug, Deserialize)]
struct ReadySegment {
    segment_path: String,
}

/// Turns a server event into a locator.
///
/// Returns `Ok(None)` for named events, which are not fragment announcements.
pub fn parse_notification(
    event: &ServerEvent,
    fragment_base_url: &Url,
) -> NagareResult<Option<FragmentLocator>> {
    if event.event != "message" {
        return Ok(None);
    }

    let segment: ReadySegment = serde_json::from_str(&event.data)
        .map_err(|e| NagareError::NotificationParseError(format!("{e}: {}", event.data)))?;
    let locator = FragmentLocator::resolve(fragment_base_url, &segment.segment_path)?;
    Ok(Some(locator))
}

/// Live feed over a `text/event-stream` endpoint.
pub struct EventStreamSource {
    client: Client,
    endpoint: Url,
    fragment_base_url: Url,
}

impl EventStreamSource {
    pub fn new(client: Client, endpoint: Url, fragment_base_url: Url) -> Self {
        Self {
            client,
            endpoint,
            fragment_base_url,
        }
    }
}

impl NotificationSource for EventStreamSource {
    async fn subscribe(&self) -> NagareResult<LocatorReceiver> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| NagareError::SubscriptionError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NagareError::SubscriptionError(format!(
                "{} responded with {}",
                self.endpoint,
                response.status()
            )));
        }
        tracing::info!("Notification stream {} opened", self.endpoint);

        let (sender, receiver) = mpsc::unbounded_channel();
        let base = self.fragment_base_url.clone();
        let mut stream = response.bytes_stream().boxed();
        tokio::spawn(async move {
            let mut parser = EventStreamParser::new();
            loop {
                let chunk = tokio::select! {
                    _ = sender.closed() => break,
                    chunk = stream.next() => chunk,
                };

                let chunk = match chunk {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        _ = sender.send(Err(NagareError::SubscriptionError(e.to_string())));
                        break;
                    }
                    None => {
                        _ = sender.send(Err(NagareError::SubscriptionError(
                            "notification stream closed by server".to_string(),
                        )));
                        break;
                    }
                };

                for event in parser.feed(&chunk) {
                    match parse_notification(&event, &base) {
                        Ok(Some(locator)) => {
                            tracing::debug!("Fragment ready: {locator}");
                            if sender.send(Ok(locator)).is_err() {
                                return;
                            }
                        }
                        Ok(None) => log::debug!("Ignoring {} event", event.event),
                        Err(e) => log::warn!("Dropping notification. {e}"),
                    }
                }
            }
        });

        Ok(receiver)
    }
}

/// Finite, pre-known list of fragments.
pub struct StaticListSource {
    fragment_base_url: Url,
    fragments: Vec<String>,
}

impl StaticListSource {
    pub fn new(fragment_base_url: Url, fragments: Vec<String>) -> Self {
        Self {
            fragment_base_url,
            fragments,
        }
    }
}

impl NotificationSource for StaticListSource {
    async fn subscribe(&self) -> NagareResult<LocatorReceiver> {
        let (sender, receiver) = mpsc::unbounded_channel();
        for fragment in &self.fragments {
            let locator = FragmentLocator::resolve(&self.fragment_base_url, fragment)
                .map_err(|e| NagareError::NotificationParseError(format!("{fragment}: {e}")));
            // the receiver is still in our hands
            _ = sender.send(locator);
        }

        Ok(receiver)
    }
}
