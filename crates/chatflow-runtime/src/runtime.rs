//! The dispatch loop.
//!
//! Updates arrive on one bounded queue, pushed through an [`UpdateSender`] or
//! pulled from [`UpdateSource`]s. A router spreads them over `workers` lanes
//! by hashing their chat (or the sender, for updates without one), so one
//! chat's updates are handled in arrival order while different chats run side
//! by side. Each lane hands its
//! updates to the [`Dispatcher`] one at a time.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chatflow_runtime::FlowRuntime;
//!
//! let runtime = FlowRuntime::builder()
//!     .config_file("chatflow.toml")
//!     .transport(HttpTransport::new(token))
//!     .source(LongPoll::new(token))
//!     .setup(|dispatcher| {
//!         dispatcher.add_handler(0, ActionHandler::new(&start, show_menu));
//!     })
//!     .build()?;
//!
//! runtime.run().await?;
//! ```
//!
//! # Shutdown
//!
//! On Ctrl+C, SIGTERM or [`CancellationToken::cancel`] the runtime stops
//! polling sources and closes the queue. Updates already queued are still
//! dispatched, and [`run`](FlowRuntime::run) returns once every lane is idle.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chatflow_core::{BoxedTransport, Transport, Update};
use chatflow_framework::{CallbackRegistry, Dispatcher};

use crate::config::{ChatflowConfig, ConfigLoader, DispatcherSettings, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging::{self, LoggingGuard};
use crate::source::{BoxedUpdateSource, UpdateSender, UpdateSource};

/// Picks the lane for `update` out of `lanes`.
///
/// Every update of a chat shares one lane whoever sent it. Chatless updates
/// (chosen inline results) are spread by sender.
pub fn lane_for(update: &Update, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    match update.chat {
        Some(chat) => (0u8, chat).hash(&mut hasher),
        None => (1u8, update.sender).hash(&mut hasher),
    }
    (hasher.finish() % lanes.max(1) as u64) as usize
}

// =============================================================================
// Stats
// =============================================================================

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Updates taken off the inbound queue.
    pub received: u64,
    /// Updates the dispatcher finished with.
    pub processed: u64,
    /// Processed updates that matched at least one handler.
    pub handled: u64,
    /// Updates whose dispatch panicked.
    pub panicked: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    processed: AtomicU64,
    handled: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// FlowRuntime
// =============================================================================

/// Runs a [`Dispatcher`] over a stream of updates.
pub struct FlowRuntime {
    settings: DispatcherSettings,
    dispatcher: Arc<Dispatcher>,
    inbound_tx: mpsc::Sender<Update>,
    inbound_rx: mpsc::Receiver<Update>,
    sources: Vec<BoxedUpdateSource>,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
    logging: Option<LoggingGuard>,
}

impl FlowRuntime {
    /// Creates a runtime for an already configured dispatcher.
    pub fn new(settings: DispatcherSettings, dispatcher: Dispatcher) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(settings.queue_capacity.max(1));
        Self {
            settings,
            dispatcher: Arc::new(dispatcher),
            inbound_tx,
            inbound_rx,
            sources: Vec::new(),
            shutdown: CancellationToken::new(),
            counters: Arc::new(Counters::default()),
            logging: None,
        }
    }

    /// Creates a builder that loads configuration and logging for you.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// A handle for pushing updates, usable before and during the run.
    pub fn sender(&self) -> UpdateSender {
        UpdateSender::new(self.inbound_tx.clone())
    }

    /// The token that stops the run when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn add_source(&mut self, source: impl UpdateSource) {
        self.sources.push(Arc::new(source));
    }

    /// Runs until Ctrl+C, SIGTERM or the shutdown token fires.
    pub async fn run(self) -> RuntimeResult<RuntimeStats> {
        info!("Chatflow runtime is running. Press Ctrl+C to stop.");
        self.run_until(shutdown_signal()).await
    }

    /// Runs until `shutdown` resolves, the shutdown token fires or no
    /// [`UpdateSender`] or source is left to feed the queue.
    pub async fn run_until<F>(self, shutdown: F) -> RuntimeResult<RuntimeStats>
    where
        F: Future<Output = ()>,
    {
        let Self {
            settings,
            dispatcher,
            inbound_tx,
            mut inbound_rx,
            sources,
            shutdown: token,
            counters,
            logging: _logging,
        } = self;

        let workers = settings.workers.max(1);
        let mut tasks = JoinSet::new();

        let mut lanes = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
            lanes.push(tx);
            tasks.spawn(run_lane(
                index,
                Arc::clone(&dispatcher),
                rx,
                Arc::clone(&counters),
            ));
        }

        for source in sources {
            tasks.spawn(run_source(
                source,
                inbound_tx.clone(),
                token.clone(),
                settings,
            ));
        }
        drop(inbound_tx);

        if let Some(period) = settings.sweep_interval() {
            tasks.spawn(run_sweeper(Arc::clone(&dispatcher), period, token.clone()));
        }

        info!(workers, "Dispatch loop started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = token.cancelled() => break,
                next = inbound_rx.recv() => match next {
                    Some(update) => route(&lanes, update, &counters).await,
                    None => {
                        info!("Every update sender and source is gone");
                        break;
                    }
                },
            }
        }

        token.cancel();
        inbound_rx.close();
        let mut drained = 0usize;
        while let Some(update) = inbound_rx.recv().await {
            route(&lanes, update, &counters).await;
            drained += 1;
        }
        debug!(drained, "Inbound queue drained");
        drop(lanes);

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Runtime task failed");
                failure.get_or_insert(err);
            }
        }

        let stats = counters.snapshot();
        info!(
            received = stats.received,
            processed = stats.processed,
            handled = stats.handled,
            "Dispatch loop stopped"
        );

        match failure {
            Some(err) => Err(RuntimeError::Task(err)),
            None => Ok(stats),
        }
    }
}

impl std::fmt::Debug for FlowRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRuntime")
            .field("settings", &self.settings)
            .field("sources", &self.sources.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

// ─── tasks ───

async fn route(lanes: &[mpsc::Sender<Update>], update: Update, counters: &Counters) {
    counters.received.fetch_add(1, Ordering::Relaxed);
    let lane = lane_for(&update, lanes.len());
    if lanes[lane].send(update).await.is_err() {
        error!(lane, "Lane is gone, dropping update");
    }
}

async fn run_lane(
    index: usize,
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::Receiver<Update>,
    counters: Arc<Counters>,
) {
    while let Some(update) = rx.recv().await {
        let update_id = update.id;
        let dispatcher = Arc::clone(&dispatcher);
        // A panicking handler must not take the lane down with it.
        let outcome = tokio::spawn(async move { dispatcher.process_update(update).await }).await;

        counters.processed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(true) => {
                counters.handled.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {}
            Err(err) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                error!(lane = index, update_id, error = %err, "Dispatch panicked");
            }
        }
    }
    debug!(lane = index, "Lane stopped");
}

async fn run_source(
    source: BoxedUpdateSource,
    inbound: mpsc::Sender<Update>,
    token: CancellationToken,
    settings: DispatcherSettings,
) {
    debug!(source = source.name(), "Polling started");
    loop {
        let polled = tokio::select! {
            _ = token.cancelled() => break,
            polled = source.poll() => polled,
        };

        match polled {
            Ok(updates) => {
                for update in updates {
                    if inbound.send(update).await.is_err() {
                        warn!(source = source.name(), "Runtime closed, dropping polled updates");
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(source = source.name(), error = %err, "Polling failed");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(settings.poll_retry()) => {}
                }
            }
        }
    }
    debug!(source = source.name(), "Polling stopped");
}

async fn run_sweeper(
    dispatcher: Arc<Dispatcher>,
    period: std::time::Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let expired = dispatcher.sweep_expired();
                if expired > 0 {
                    debug!(expired, "Swept expired conversations");
                }
            }
        }
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal as unix_signal};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(err) => warn!(error = %err, "Cannot listen for SIGTERM"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => {
            error!(error = %err, "Cannot listen for Ctrl+C, waiting for the shutdown token");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

type Setup = Box<dyn FnOnce(&mut Dispatcher) + Send>;

/// Builds a [`FlowRuntime`] from configuration.
///
/// `build` loads the configuration (unless one was given), installs logging,
/// creates the callback registry and dispatcher from it and then runs every
/// `setup` closure to register handlers.
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    config: Option<ChatflowConfig>,
    transport: Option<BoxedTransport>,
    sources: Vec<BoxedUpdateSource>,
    setup: Vec<Setup>,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            config: None,
            transport: None,
            sources: Vec::new(),
            setup: Vec::new(),
            init_logging: true,
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    pub fn merge(mut self, config: ChatflowConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Uses `config` as is instead of loading one.
    pub fn config(mut self, config: ChatflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leaves the global subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn source(mut self, source: impl UpdateSource) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Registers handlers once the dispatcher exists.
    pub fn setup(mut self, f: impl FnOnce(&mut Dispatcher) + Send + 'static) -> Self {
        self.setup.push(Box::new(f));
        self
    }

    pub fn build(self) -> RuntimeResult<FlowRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.loader.load()?,
        };
        let transport = self.transport.ok_or(RuntimeError::MissingTransport)?;

        let logging = self
            .init_logging
            .then(|| logging::init_from_config(&config.logging));

        let registry = Arc::new(CallbackRegistry::new(
            config.registry.to_registry_config(),
        ));
        let mut dispatcher = Dispatcher::new(registry, transport)
            .with_max_reroute_depth(config.dispatcher.max_reroute_depth);
        for setup in self.setup {
            setup(&mut dispatcher);
        }

        info!(
            log_level = %config.logging.level,
            handlers = dispatcher.handler_count(),
            workers = config.dispatcher.workers,
            "Runtime initialized from configuration"
        );

        let mut runtime = FlowRuntime::new(config.dispatcher, dispatcher);
        runtime.sources = self.sources;
        runtime.logging = logging;
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use chatflow_core::{ChatId, OutboundMessage, SentMessage, TransportResult};
    use chatflow_framework::{BoxError, CommandHandler, Filter, FlowContext, MessageHandler};

    struct Discard;

    #[async_trait]
    impl Transport for Discard {
        async fn send(&self, message: OutboundMessage) -> TransportResult<SentMessage> {
            Ok(SentMessage {
                message_id: 1,
                chat: message.chat,
            })
        }
    }

    fn settings(workers: usize) -> DispatcherSettings {
        DispatcherSettings {
            workers,
            queue_capacity: 16,
            sweep_interval_secs: 0,
            poll_retry_ms: 10,
            ..Default::default()
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(CallbackRegistry::default()), Arc::new(Discard))
    }

    type Seen = Arc<Mutex<HashMap<ChatId, Vec<String>>>>;

    fn recording(seen: &Seen) -> MessageHandler {
        let seen = Arc::clone(seen);
        MessageHandler::new(Filter::text(), move |ctx: Arc<FlowContext>| {
            let seen = Arc::clone(&seen);
            async move {
                tokio::task::yield_now().await;
                if let (Some(chat), Some(text)) = (ctx.chat(), ctx.text()) {
                    seen.lock().entry(chat).or_default().push(text.to_string());
                }
            }
        })
    }

    #[test]
    fn test_lane_for_is_stable_and_in_range() {
        let update = Update::message(1, 3, 30, "hi");
        let lane = lane_for(&update, 4);
        assert!(lane < 4);
        assert_eq!(lane_for(&update, 4), lane);
        assert_eq!(lane_for(&update, 1), 0);
        assert_eq!(lane_for(&update, 0), 0);
    }

    #[test]
    fn test_lane_for_ignores_sender_within_a_chat() {
        for user in 1..50 {
            assert_eq!(
                lane_for(&Update::message(user as u64, user, 100, "a"), 8),
                lane_for(&Update::message(0, 0, 100, "b"), 8),
            );
        }
        let chosen = Update::chosen_result(1, 7, "0", "q");
        assert_eq!(lane_for(&chosen, 8), lane_for(&chosen, 8));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_users_in_one_chat_keep_arrival_order() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let mut dispatcher = dispatcher();
        let log = Arc::clone(&seen);
        dispatcher.add_handler(
            0,
            MessageHandler::new(Filter::text(), move |ctx: Arc<FlowContext>| {
                let log = Arc::clone(&log);
                async move {
                    let text = ctx.text().unwrap_or_default().to_string();
                    if text == "first" {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    log.lock().push(text);
                }
            }),
        );

        let runtime = FlowRuntime::new(settings(4), dispatcher);
        let sender = runtime.sender();
        let token = runtime.shutdown_token();
        let run = tokio::spawn(runtime.run_until(std::future::pending()));

        sender.send(Update::message(1, 1, 100, "first")).await.unwrap();
        sender.send(Update::message(2, 2, 100, "second")).await.unwrap();
        token.cancel();

        let stats = run.await.unwrap().unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(*seen.lock(), vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_chat_order_is_kept() {
        let seen: Seen = Arc::default();
        let mut dispatcher = dispatcher();
        dispatcher.add_handler(0, recording(&seen));

        let runtime = FlowRuntime::new(settings(3), dispatcher);
        let sender = runtime.sender();
        let token = runtime.shutdown_token();
        let run = tokio::spawn(runtime.run_until(std::future::pending()));

        let mut id = 0;
        for n in 0..20 {
            for chat in 1..=4 {
                id += 1;
                sender
                    .send(Update::message(id, chat, chat, format!("msg {n}")))
                    .await
                    .unwrap();
            }
        }
        token.cancel();

        let stats = run.await.unwrap().unwrap();
        assert_eq!(stats.received, 80);
        assert_eq!(stats.processed, 80);
        assert_eq!(stats.handled, 80);

        let expected: Vec<String> = (0..20).map(|n| format!("msg {n}")).collect();
        let seen = seen.lock();
        for chat in 1..=4 {
            assert_eq!(seen[&chat], expected, "chat {chat} out of order");
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_sender_and_drains_queue() {
        let runtime = FlowRuntime::new(settings(2), dispatcher());
        let sender = runtime.sender();

        for id in 1..=5 {
            sender.send(Update::message(id, 1, 1, "queued")).await.unwrap();
        }

        let stats = runtime.run_until(async {}).await.unwrap();
        assert_eq!(stats.received, 5);
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.handled, 0);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(Update::message(6, 1, 1, "late")).await,
            Err(RuntimeError::Closed)
        ));
    }

    struct Scripted {
        batches: Mutex<Vec<Result<Vec<Update>, BoxError>>>,
    }

    #[async_trait]
    impl UpdateSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn poll(&self) -> Result<Vec<Update>, BoxError> {
            let next = self.batches.lock().pop();
            match next {
                Some(batch) => batch,
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn test_source_is_polled_past_errors() {
        let done = Arc::new(Notify::new());
        let pinged = Arc::new(AtomicU64::new(0));

        let mut dispatcher = dispatcher();
        {
            let done = Arc::clone(&done);
            let pinged = Arc::clone(&pinged);
            dispatcher.add_handler(
                0,
                CommandHandler::new(["ping"], move |_ctx: Arc<FlowContext>| {
                    let done = Arc::clone(&done);
                    let pinged = Arc::clone(&pinged);
                    async move {
                        if pinged.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                            done.notify_one();
                        }
                    }
                }),
            );
        }

        let mut runtime = FlowRuntime::new(settings(2), dispatcher);
        // Popped from the back: one batch, an error, then two more updates.
        runtime.add_source(Scripted {
            batches: Mutex::new(vec![
                Ok(vec![
                    Update::message(2, 5, 50, "/ping"),
                    Update::message(3, 6, 60, "/ping"),
                ]),
                Err("connection reset".into()),
                Ok(vec![Update::message(1, 5, 50, "/ping")]),
            ]),
        });

        let stats = runtime
            .run_until(async move {
                tokio::time::timeout(Duration::from_secs(5), done.notified())
                    .await
                    .expect("source updates were not dispatched");
            })
            .await
            .unwrap();

        assert_eq!(pinged.load(Ordering::SeqCst), 3);
        assert_eq!(stats.handled, 3);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_lane() {
        let mut dispatcher = dispatcher();
        dispatcher.add_handler(
            0,
            CommandHandler::new(["boom"], |ctx: Arc<FlowContext>| async move {
                if ctx.args().is_empty() {
                    panic!("handler exploded");
                }
            }),
        );

        let runtime = FlowRuntime::new(settings(1), dispatcher);
        let sender = runtime.sender();
        sender.send(Update::message(1, 1, 1, "/boom")).await.unwrap();
        sender.send(Update::message(2, 1, 1, "/boom")).await.unwrap();

        let stats = runtime.run_until(async {}).await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.panicked, 2);
    }

    #[test]
    fn test_builder_requires_transport() {
        let result = FlowRuntime::builder()
            .config(ChatflowConfig::default())
            .without_logging()
            .build();
        assert!(matches!(result, Err(RuntimeError::MissingTransport)));
    }

    #[test]
    fn test_builder_applies_config_and_setup() {
        let mut config = ChatflowConfig::default();
        config.dispatcher.workers = 2;
        config.registry.counter_start = 41;

        let runtime = FlowRuntime::builder()
            .config(config)
            .without_logging()
            .transport(Discard)
            .setup(|dispatcher| {
                dispatcher.add_handler(
                    0,
                    CommandHandler::new(["start"], |_ctx: Arc<FlowContext>| async {}),
                );
            })
            .build()
            .unwrap();

        assert_eq!(runtime.settings().workers, 2);
        assert_eq!(runtime.dispatcher().handler_count(), 1);
        assert_eq!(runtime.dispatcher().registry().counter(), 41);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = ChatflowConfig::default();
        config.dispatcher.workers = 0;

        let result = FlowRuntime::builder()
            .config(config)
            .without_logging()
            .transport(Discard)
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }
}
