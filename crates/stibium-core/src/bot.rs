//! The bot handle.
//!
//! A [`Bot`] owns everything a running bot needs: the handler registry, the
//! scheduler, the untrusted executor, the platform collaborator and the
//! inbound event channel. It is a cheap [`Clone`] handle, so handlers receive
//! it by reference and may keep a clone to register further handlers from
//! inside their own actions.
//!
//! # Lifecycle
//!
//! ```rust,ignore
//! let bot = Bot::new(platform, BotOptions::new("stibium").prefix("%").owner("100"));
//! bot.register(CommandHandler::new("echo", echo)).await?;
//! bot.login(&credentials).await?;
//! bot.listen().await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::foundation::{
    BotError, BotResult, ConfigurationError, ConfigurationResult, Event, EventKind, Message,
    MessageId, PlatformResult, SendOptions, Thread,
};
use crate::framework::executor::{DEFAULT_DEADLINE, Executor, Notices};
use crate::framework::scheduler::{DEFAULT_IDLE_TICK, Scheduler};
use crate::framework::{BoxedHandler, Dispatcher, Handler, HandlerId, HandlerRegistry, Registered};
use crate::integration::{BoxedPlatform, Credentials, EventSink, Session};

// ============================================================================
// Bot Options
// ============================================================================

/// Construction options for a [`Bot`].
#[derive(Debug, Clone)]
pub struct BotOptions {
    /// Bot name, used in logs.
    pub name: String,
    /// Command prefix.
    pub prefix: String,
    /// User id of the operator who receives failure reports.
    pub owner: Option<String>,
    /// Default deadline for handler code.
    pub deadline: Duration,
    /// Pause between setting the typing indicator and running an action.
    pub engagement_delay: Duration,
    /// Scheduler polling interval when nothing is queued.
    pub idle_tick: Duration,
    /// Capacity of the inbound event channel.
    pub channel_capacity: usize,
    /// User-facing notices.
    pub notices: Notices,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            name: "stibium".to_string(),
            prefix: "!".to_string(),
            owner: None,
            deadline: DEFAULT_DEADLINE,
            engagement_delay: Duration::from_millis(300),
            idle_tick: DEFAULT_IDLE_TICK,
            channel_capacity: 256,
            notices: Notices::default(),
        }
    }
}

impl BotOptions {
    /// Creates default options with the given bot name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the command prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the owner's user id.
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets the default deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sets the engagement delay.
    pub fn engagement_delay(mut self, delay: Duration) -> Self {
        self.engagement_delay = delay;
        self
    }

    /// Sets the scheduler idle tick.
    pub fn idle_tick(mut self, tick: Duration) -> Self {
        self.idle_tick = tick;
        self
    }

    /// Sets the inbound channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Sets the user-facing notices.
    pub fn notices(mut self, notices: Notices) -> Self {
        self.notices = notices;
        self
    }
}

// ============================================================================
// Bot
// ============================================================================

struct BotInner {
    options: BotOptions,
    owner: Option<Thread>,
    platform: BoxedPlatform,
    registry: HandlerRegistry,
    scheduler: Scheduler,
    executor: Executor,
    usernames: RwLock<HashMap<String, String>>,
    forwarded: Mutex<HashSet<EventKind>>,
    session: RwLock<Option<Session>>,
    sink: EventSink,
    receiver: Mutex<Option<mpsc::Receiver<Event>>>,
    shutdown: CancellationToken,
}

/// Handle to a bot instance.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    /// Creates a bot talking to `platform`.
    pub fn new(platform: BoxedPlatform, options: BotOptions) -> Self {
        let owner = options.owner.as_deref().map(Thread::user);
        if owner.is_none() {
            warn!(bot = %options.name, "Owner not set, error reporting to the owner is disabled");
        }

        let executor = Executor::new(Arc::clone(&platform), owner.clone())
            .with_deadline(options.deadline)
            .with_notices(options.notices.clone());
        let (sink, receiver) = mpsc::channel(options.channel_capacity.max(1));

        debug!(bot = %options.name, prefix = %options.prefix, "Bot created");
        Self {
            inner: Arc::new(BotInner {
                scheduler: Scheduler::new(options.idle_tick),
                options,
                owner,
                platform,
                registry: HandlerRegistry::new(),
                executor,
                usernames: RwLock::new(HashMap::new()),
                forwarded: Mutex::new(HashSet::new()),
                session: RwLock::new(None),
                sink,
                receiver: Mutex::new(Some(receiver)),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Returns the bot name.
    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    /// Returns the command prefix.
    pub fn prefix(&self) -> &str {
        &self.inner.options.prefix
    }

    /// Returns the owner's private thread.
    pub fn owner(&self) -> Option<&Thread> {
        self.inner.owner.as_ref()
    }

    /// Returns the construction options.
    pub fn options(&self) -> &BotOptions {
        &self.inner.options
    }

    /// Returns the platform collaborator.
    pub fn platform(&self) -> &BoxedPlatform {
        &self.inner.platform
    }

    /// Returns the handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Returns the scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Returns the untrusted executor.
    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    /// Returns the user-facing notices.
    pub fn notices(&self) -> &Notices {
        self.inner.executor.notices()
    }

    /// Returns the current session.
    pub fn session(&self) -> Option<Session> {
        self.inner.session.read().clone()
    }

    /// Returns `true` once [`login`](Self::login) has succeeded.
    pub fn is_logged_in(&self) -> bool {
        self.inner.session.read().is_some()
    }

    /// Returns a sender feeding the dispatcher directly.
    pub fn sink(&self) -> EventSink {
        self.inner.sink.clone()
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Registers a handler and returns a handle to it.
    ///
    /// Runs the handler's `setup` first; scheduled kinds are handed to the
    /// scheduler, reactive kinds are appended to the registry.
    pub async fn register<H: Handler>(&self, handler: H) -> ConfigurationResult<Registered<H>> {
        let handler = Arc::new(handler);
        let (id, kind) = self.register_boxed(handler.clone()).await?;
        Ok(Registered { id, kind, handler })
    }

    /// Registers several handlers in order and returns the first one.
    ///
    /// Stops at the first failing registration.
    pub async fn register_all<I>(
        &self,
        handlers: I,
    ) -> ConfigurationResult<Option<Registered<dyn Handler>>>
    where
        I: IntoIterator<Item = BoxedHandler>,
    {
        let mut first = None;
        for handler in handlers {
            let (id, kind) = self.register_boxed(Arc::clone(&handler)).await?;
            if first.is_none() {
                first = Some(Registered { id, kind, handler });
            }
        }
        Ok(first)
    }

    /// Removes a registered handler and drops its pending scheduled work.
    ///
    /// A recurrent handler caught mid-firing finishes that firing and is not
    /// rescheduled. Returns `false` if the handler was already gone.
    pub fn unregister<H: ?Sized>(&self, registered: &Registered<H>) -> bool {
        let removed = if registered.kind.is_scheduled() {
            self.inner.scheduler.cancel(registered.id)
        } else {
            let removed = self.inner.registry.remove(&registered.kind, registered.id);
            self.inner.scheduler.discard(registered.id);
            removed
        };
        debug!(id = %registered.id, kind = %registered.kind, removed, "Handler unregistered");
        removed
    }

    async fn register_boxed(
        &self,
        handler: BoxedHandler,
    ) -> ConfigurationResult<(HandlerId, EventKind)> {
        let name = handler.name();
        let kind = handler
            .event_kind()
            .ok_or_else(|| ConfigurationError::MissingEventKind {
                handler: name.clone(),
            })?;
        let timeout = handler.timeout();
        if kind == EventKind::Timeout && timeout.is_none() {
            return Err(ConfigurationError::MissingTimeout { handler: name });
        }

        let executor = &self.inner.executor;
        executor
            .supervise(handler.setup(self), executor.deadline())
            .await
            .map_err(|fault| ConfigurationError::setup(&name, fault.to_string()))?;

        let id = self.inner.registry.next_id();
        match (&kind, timeout) {
            (EventKind::Timeout, delay) => {
                self.inner
                    .scheduler
                    .schedule_timeout(id, handler, delay.unwrap_or_default());
            }
            (EventKind::Recurrent, _) => {
                self.inner.scheduler.schedule_recurrent(id, handler);
            }
            (_, lifetime) => {
                self.inner
                    .registry
                    .insert(kind.clone(), id, Arc::clone(&handler));
                if let Some(lifetime) = lifetime {
                    self.inner
                        .scheduler
                        .schedule_expiry(id, kind.clone(), handler, lifetime);
                }
                if self.is_logged_in() {
                    self.forward(&kind).await;
                }
            }
        }

        info!(handler = %name, kind = %kind, id = %id, "Handler registered");
        Ok((id, kind))
    }

    async fn forward(&self, kind: &EventKind) {
        if !self.inner.forwarded.lock().insert(kind.clone()) {
            return;
        }
        match self
            .inner
            .platform
            .forward_events(kind.clone(), self.inner.sink.clone())
            .await
        {
            Ok(()) => debug!(kind = %kind, "Event forwarding requested"),
            Err(e) => {
                self.inner.forwarded.lock().remove(kind);
                error!(kind = %kind, error = %e, "Failed to request event forwarding");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Starts a platform session and requests forwarding for every kind that
    /// already has handlers.
    pub async fn login(&self, credentials: &Credentials) -> BotResult<Session> {
        let session = self.inner.platform.start_session(credentials).await?;
        info!(bot = %self.name(), user = %session.user_id, "Logged in");
        *self.inner.session.write() = Some(session.clone());

        for kind in self.inner.registry.kinds() {
            self.forward(&kind).await;
        }
        Ok(session)
    }

    /// Runs the dispatch and scheduler loops until shutdown.
    ///
    /// Returns `Err(BotError::Cancelled)` if an operator interrupt reached a
    /// call site that does not absorb it.
    pub async fn listen(&self) -> BotResult<()> {
        if !self.is_logged_in() {
            return Err(BotError::NotLoggedIn);
        }
        let Some(receiver) = self.inner.receiver.lock().take() else {
            return Err(BotError::AlreadyListening);
        };

        info!(bot = %self.name(), "Listening for events");
        let dispatcher = Dispatcher::new(self.clone());
        let shutdown = &self.inner.shutdown;

        let result = tokio::select! {
            result = dispatcher.run(receiver, shutdown.child_token()) => result,
            result = self.inner.scheduler.run(self, shutdown.child_token()) => result,
        };

        match &result {
            Ok(()) => info!(bot = %self.name(), "Stopped listening"),
            Err(_) => warn!(bot = %self.name(), "Stopped listening after an operator interrupt"),
        }
        result.map_err(BotError::from)
    }

    /// Stops [`listen`](Self::listen).
    pub fn shutdown(&self) {
        info!(bot = %self.name(), "Shutdown requested");
        self.inner.shutdown.cancel();
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Delivers an operator interrupt.
    ///
    /// While an interrupt-catching execution (a reactive action) is in flight,
    /// only those executions are stopped and `true` is returned. Otherwise
    /// every in-flight execution is cancelled, [`listen`](Self::listen) ends
    /// with [`BotError::Cancelled`], and `false` is returned.
    pub fn interrupt(&self) -> bool {
        self.inner.executor.interrupt()
    }

    // ------------------------------------------------------------------------
    // Platform Operations
    // ------------------------------------------------------------------------

    /// Sends a text message.
    pub async fn send(&self, thread: &Thread, text: &str) -> PlatformResult<MessageId> {
        self.send_with(thread, text, &SendOptions::default()).await
    }

    /// Sends a text message with mentions or reply linkage.
    pub async fn send_with(
        &self,
        thread: &Thread,
        text: &str,
        options: &SendOptions,
    ) -> PlatformResult<MessageId> {
        debug!(thread = %thread, mentions = options.mentions.len(), "Sending message");
        self.inner.platform.send_message(thread, text, options).await
    }

    /// Replies to a message in its own thread.
    pub async fn reply(&self, message: &Message, text: &str) -> PlatformResult<MessageId> {
        let options = SendOptions::new().reply_to(message.id.clone());
        self.send_with(&message.thread, text, &options).await
    }

    /// Returns a user's display name, asking the platform only once per id.
    pub async fn get_user_name(&self, user_id: &str) -> PlatformResult<String> {
        let cached = self.inner.usernames.read().get(user_id).cloned();
        if let Some(name) = cached {
            return Ok(name);
        }

        let name = self.inner.platform.fetch_user_display_name(user_id).await?;
        self.inner
            .usernames
            .write()
            .insert(user_id.to_string(), name.clone());
        Ok(name)
    }

    /// Fetches a message by id.
    pub async fn fetch_message(
        &self,
        thread: &Thread,
        message_id: &MessageId,
    ) -> PlatformResult<Option<Message>> {
        self.inner
            .platform
            .fetch_message_by_id(thread, message_id)
            .await
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("name", &self.inner.options.name)
            .field("prefix", &self.inner.options.prefix)
            .field("owner", &self.inner.owner)
            .field("logged_in", &self.is_logged_in())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::HandlerResult;
    use crate::testing::{MockPlatform, PlatformCall};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OnKind(Option<EventKind>);

    impl Handler for OnKind {
        fn event_kind(&self) -> Option<EventKind> {
            self.0.clone()
        }
    }

    struct BadSetup;

    #[async_trait]
    impl Handler for BadSetup {
        fn event_kind(&self) -> Option<EventKind> {
            Some(EventKind::Message)
        }

        async fn setup(&self, _bot: &Bot) -> HandlerResult<()> {
            anyhow::bail!("cannot compile pattern")
        }
    }

    struct Expiring {
        lifetime: Duration,
        expired: AtomicUsize,
    }

    #[async_trait]
    impl Handler for Expiring {
        fn event_kind(&self) -> Option<EventKind> {
            Some(EventKind::ReactionAdded)
        }

        fn timeout(&self) -> Option<Duration> {
            Some(self.lifetime)
        }

        async fn on_timeout(&self, _bot: &Bot) -> HandlerResult<()> {
            self.expired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup() -> (Bot, Arc<MockPlatform>) {
        let platform = Arc::new(MockPlatform::new().with_user("U1", "Alice"));
        let bot = Bot::new(platform.clone(), BotOptions::new("test").prefix("%"));
        (bot, platform)
    }

    #[tokio::test]
    async fn test_register_without_kind_fails() {
        let (bot, _) = setup();
        let err = bot.register(OnKind(None)).await.unwrap_err();

        assert!(matches!(err, ConfigurationError::MissingEventKind { .. }));
        assert!(bot.registry().is_empty());
    }

    #[tokio::test]
    async fn test_register_setup_failure_is_configuration_error() {
        let (bot, _) = setup();
        let err = bot.register(BadSetup).await.unwrap_err();

        match err {
            ConfigurationError::Setup { handler, reason } => {
                assert_eq!(handler, "BadSetup");
                assert_eq!(reason, "cannot compile pattern");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(bot.registry().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_kind_requires_delay() {
        let (bot, _) = setup();
        let err = bot.register(OnKind(Some(EventKind::Timeout))).await.unwrap_err();

        assert!(matches!(err, ConfigurationError::MissingTimeout { .. }));
        assert_eq!(bot.scheduler().pending(), 0);
    }

    #[tokio::test]
    async fn test_forwarding_requested_once_per_kind() {
        let (bot, platform) = setup();
        bot.register(OnKind(Some(EventKind::Message))).await.unwrap();
        bot.register(OnKind(Some(EventKind::Message))).await.unwrap();
        assert!(platform.forwarded_kinds().is_empty());

        bot.login(&Credentials::new("bot", "secret")).await.unwrap();
        bot.register(OnKind(Some(EventKind::Message))).await.unwrap();
        bot.register(OnKind(Some(EventKind::ReactionAdded))).await.unwrap();

        assert_eq!(
            platform.forwarded_kinds(),
            [EventKind::Message, EventKind::ReactionAdded]
        );
    }

    #[tokio::test]
    async fn test_scheduled_kinds_are_not_forwarded() {
        let (bot, platform) = setup();
        bot.login(&Credentials::new("bot", "secret")).await.unwrap();
        bot.register(OnKind(Some(EventKind::Recurrent))).await.unwrap();

        assert!(platform.forwarded_kinds().is_empty());
        assert!(bot.registry().is_empty());
        assert_eq!(bot.scheduler().pending(), 1);
    }

    #[tokio::test]
    async fn test_register_all_returns_first() {
        let (bot, _) = setup();
        let handlers: Vec<BoxedHandler> = vec![
            Arc::new(OnKind(Some(EventKind::Message))),
            Arc::new(OnKind(Some(EventKind::ReactionAdded))),
        ];

        let first = bot.register_all(handlers).await.unwrap().unwrap();

        assert_eq!(first.kind(), &EventKind::Message);
        assert_eq!(bot.registry().len(&EventKind::ReactionAdded), 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let (bot, _) = setup();
        let registered = bot.register(OnKind(Some(EventKind::Message))).await.unwrap();

        assert!(bot.unregister(&registered));
        assert!(!bot.unregister(&registered));
        assert!(bot.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiring_handler_is_removed() {
        let (bot, _) = setup();
        let registered = bot
            .register(Expiring {
                lifetime: Duration::from_secs(120),
                expired: AtomicUsize::new(0),
            })
            .await
            .unwrap();
        let shutdown = CancellationToken::new();
        let loop_bot = bot.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { loop_bot.scheduler().run(&loop_bot, token).await });

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(bot.registry().len(&EventKind::ReactionAdded), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(bot.registry().is_empty());
        assert_eq!(registered.expired.load(Ordering::SeqCst), 1);
        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_lifetime_never_expires() {
        let (bot, _) = setup();
        let registered = bot
            .register(Expiring {
                lifetime: Duration::MAX,
                expired: AtomicUsize::new(0),
            })
            .await
            .unwrap();
        assert_eq!(bot.scheduler().pending(), 1);
        let shutdown = CancellationToken::new();
        let loop_bot = bot.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { loop_bot.scheduler().run(&loop_bot, token).await });

        tokio::time::sleep(Duration::from_secs(365 * 86_400)).await;
        assert_eq!(bot.registry().len(&EventKind::ReactionAdded), 1);
        assert_eq!(registered.expired.load(Ordering::SeqCst), 0);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_user_name_is_cached() {
        let (bot, platform) = setup();

        assert_eq!(bot.get_user_name("U1").await.unwrap(), "Alice");
        assert_eq!(bot.get_user_name("U1").await.unwrap(), "Alice");
        assert_eq!(
            platform
                .calls()
                .iter()
                .filter(|call| matches!(call, PlatformCall::FetchUserDisplayName(_)))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_reply_links_message() {
        let (bot, platform) = setup();
        let message = Message::new("m1", "U1", Thread::group("T1"));

        bot.reply(&message, "pong").await.unwrap();

        assert!(platform.calls().contains(&PlatformCall::SendMessage {
            thread: Thread::group("T1"),
            text: "pong".into(),
            options: SendOptions::new().reply_to("m1"),
        }));
    }

    #[tokio::test]
    async fn test_listen_requires_login() {
        let (bot, _) = setup();
        assert!(matches!(bot.listen().await, Err(BotError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_login_failure_is_platform_error() {
        let platform = Arc::new(MockPlatform::new().reject_login());
        let bot = Bot::new(platform, BotOptions::default());

        let err = bot.login(&Credentials::new("bot", "wrong")).await.unwrap_err();
        assert!(matches!(err, BotError::Platform(_)));
        assert!(!bot.is_logged_in());
    }

    #[tokio::test]
    async fn test_listen_until_shutdown() {
        let (bot, _) = setup();
        bot.login(&Credentials::new("bot", "secret")).await.unwrap();

        let listener = tokio::spawn({
            let bot = bot.clone();
            async move { bot.listen().await }
        });
        while bot.inner.receiver.lock().is_some() {
            tokio::task::yield_now().await;
        }
        assert!(matches!(bot.listen().await, Err(BotError::AlreadyListening)));

        bot.shutdown();
        assert!(listener.await.unwrap().is_ok());
    }
}
