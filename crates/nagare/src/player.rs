use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::Client;
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{
    config::{Feed, PlayerConfig},
    controller::{Command, DrainController, DrainState, SessionReport},
    error::NagareResult,
    fetch::{FragmentFetcher, HttpFetcher},
    locator::FragmentLocator,
    notify::{EventStreamSource, LocatorReceiver, NotificationSource, StaticListSource},
    sink::BufferSink,
};

enum Outcome<S> {
    Fetched(NagareResult<Bytes>),
    Appended(S, NagareResult<()>),
}

type Operation<S> = Pin<Box<dyn Future<Output = Outcome<S>> + Send>>;

/// Feeds a [BufferSink] with the fragments announced by a
/// [NotificationSource], one fetch or append at a time.
pub struct Player<N, F, S> {
    source: N,
    fetcher: Arc<F>,
    sink: S,
    controller: DrainController,
}

impl<N, F, S> Player<N, F, S>
where
    N: NotificationSource,
    F: FragmentFetcher,
    S: BufferSink,
{
    pub fn new(source: N, fetcher: F, sink: S, controller: DrainController) -> Self {
        Self {
            source,
            fetcher: Arc::new(fetcher),
            sink,
            controller,
        }
    }

    /// Plays until the feed ends or a fatal error occurs.
    pub async fn run(self) -> NagareResult<SessionReport> {
        let (_stop, stopped) = oneshot::channel();
        self.drive(stopped).await
    }

    /// Plays in the background until [PlayerHandle::stop] is called.
    pub fn start(self) -> PlayerHandle {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(self.drive(stopped));
        PlayerHandle {
            stop: Some(stop),
            task,
        }
    }

    async fn drive(self, mut stopped: oneshot::Receiver<()>) -> NagareResult<SessionReport> {
        let Player {
            source,
            fetcher,
            sink,
            mut controller,
        } = self;
        controller.reset();

        let mut sink = Some(sink);
        let mut receiver = Some(source.subscribe().await?);
        let mut operation: Option<Operation<S>> = None;
        let mut stopping = false;
        let mut failure = None;

        loop {
            let command = tokio::select! {
                _ = &mut stopped, if !stopping => {
                    tracing::info!("Stopping player.");
                    stopping = true;
                    None
                }
                item = next_locator(&mut receiver), if receiver.is_some() => match item {
                    Some(Ok(locator)) => controller.enqueue(locator),
                    Some(Err(e)) if e.is_fatal() => {
                        tracing::error!("Notification channel failed, stopping player. {e}");
                        failure = Some(e);
                        stopping = true;
                        None
                    }
                    Some(Err(e)) => {
                        log::warn!("Dropping notification. {e}");
                        None
                    }
                    None => {
                        tracing::info!("Fragment feed exhausted.");
                        receiver = None;
                        controller.close_input()
                    }
                },
                outcome = run_operation(&mut operation), if operation.is_some() => {
                    operation = None;
                    match outcome {
                        Outcome::Fetched(Ok(bytes)) => {
                            let buffered_end = sink.as_ref().and_then(|s| s.buffered_end());
                            Some(controller.on_fetch_complete(bytes, buffered_end))
                        }
                        Outcome::Fetched(Err(e)) => controller.on_fetch_failed(&e),
                        Outcome::Appended(returned, Ok(())) => {
                            sink = Some(returned);
                            let command = controller.on_append_complete();
                            let report = controller.report();
                            tracing::info!(
                                "Appended {}. ({} appended, {} pending)",
                                report.last_appended.as_ref().map(|l| l.file_name()).unwrap_or_default(),
                                report.appended,
                                controller.queue().len(),
                            );
                            command
                        }
                        Outcome::Appended(_, Err(e)) => {
                            controller.on_append_failed(&e);
                            return Err(e);
                        }
                    }
                },
            };

            if stopping {
                // unsubscribe
                receiver = None;
                // an outstanding fetch is abandoned, an outstanding append finishes
                if matches!(controller.state(), DrainState::Fetching(_)) {
                    operation = None;
                }
                if operation.is_none() {
                    break;
                }
                continue;
            }

            match command {
                Some(Command::Fetch(locator)) => {
                    tracing::debug!("Fetching {locator}");
                    let fetcher = fetcher.clone();
                    operation = Some(Box::pin(async move {
                        Outcome::Fetched(assert_send(fetcher.fetch(&locator)).await)
                    }));
                }
                Some(Command::Append {
                    locator,
                    bytes,
                    offset,
                }) => {
                    let Some(mut target) = sink.take() else {
                        unreachable!("append issued while the sink is busy");
                    };
                    tracing::info!(
                        "Appending {} ({} bytes) at offset {offset:.3}s",
                        locator.file_name(),
                        bytes.len()
                    );
                    operation = Some(Box::pin(async move {
                        target.set_offset(offset);
                        let result = assert_send(target.append(bytes)).await;
                        Outcome::Appended(target, result)
                    }));
                }
                Some(Command::EndOfStream) => break,
                None => {}
            }
        }

        let ended = match &mut sink {
            Some(sink) => sink.end_of_stream().await,
            None => Ok(()),
        };
        if let Some(e) = failure {
            return Err(e);
        }
        ended?;

        let report = controller.report().clone();
        if !report.failed.is_empty() {
            tracing::error!("Failed to fetch {} fragments:", report.failed.len());
            for locator in report.failed.iter() {
                tracing::error!("  - {locator}");
            }
        }

        Ok(report)
    }
}

async fn next_locator(
    receiver: &mut Option<LocatorReceiver>,
) -> Option<NagareResult<FragmentLocator>> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_operation<S>(operation: &mut Option<Operation<S>>) -> Outcome<S> {
    match operation {
        Some(operation) => operation.await,
        None => std::future::pending().await,
    }
}

// https://github.com/rust-lang/rust/issues/102211#issuecomment-1371414544
// TODO: remove this when this issue is fixed
fn assert_send<'a, T>(
    fut: impl Future<Output = T> + Send + 'a,
) -> impl Future<Output = T> + Send + 'a {
    fut
}

/// A player running in the background.
pub struct PlayerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<NagareResult<SessionReport>>,
}

impl PlayerHandle {
    /// Unsubscribes, lets an outstanding append finish, ends the stream on the
    /// sink and returns the session report.
    pub async fn stop(mut self) -> NagareResult<SessionReport> {
        if let Some(stop) = self.stop.take() {
            _ = stop.send(());
        }
        self.join().await
    }

    /// Waits for the player to finish on its own.
    pub async fn join(&mut self) -> NagareResult<SessionReport> {
        (&mut self.task).await?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Either feed variant, chosen by [PlayerConfig::feed].
pub enum FeedSource {
    Live(EventStreamSource),
    Static(StaticListSource),
}

impl NotificationSource for FeedSource {
    async fn subscribe(&self) -> NagareResult<LocatorReceiver> {
        match self {
            Self::Live(source) => source.subscribe().await,
            Self::Static(source) => source.subscribe().await,
        }
    }
}

impl<S> Player<FeedSource, HttpFetcher, S>
where
    S: BufferSink,
{
    pub fn from_config(config: &PlayerConfig, sink: S) -> NagareResult<Self> {
        let source = match config.feed()? {
            // the notification stream stays open for the whole session, no timeout
            Feed::Live(endpoint) => FeedSource::Live(EventStreamSource::new(
                Client::new(),
                endpoint,
                config.fragment_base_url.clone(),
            )),
            Feed::Static(fragments) => FeedSource::Static(StaticListSource::new(
                config.fragment_base_url.clone(),
                fragments,
            )),
        };
        let fetcher = HttpFetcher::with_timeout(Duration::from_secs(config.timeout))?;

        Ok(Self::new(
            source,
            fetcher,
            sink,
            DrainController::from_config(config),
        ))
    }
}
