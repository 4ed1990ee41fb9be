//! End-to-end tests driving the ready-made handlers through a running bot.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use stibium_core::testing::{MockPlatform, PlatformCall};
use stibium_core::{
    Bot, BotOptions, Credentials, Event, EventKind, Message, Reaction, SendOptions, Thread,
    TypingStatus,
};
use stibium_framework::{Command, CommandHandler, ReactionHandler, RecurrentHandler, TimeoutHandler};
use tokio::time::Instant;

async fn online(platform: &Arc<MockPlatform>) -> Bot {
    let bot = Bot::new(
        platform.clone(),
        BotOptions::new("test").prefix("%").owner("owner"),
    );
    bot.login(&Credentials::new("bot", "secret")).await.unwrap();
    let listener = bot.clone();
    tokio::spawn(async move { listener.listen().await });
    bot
}

fn message(text: &str) -> Event {
    Event::message(Message::new("m1", "U1", Thread::group("T1")).with_text(text))
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_echo_end_to_end() {
    let platform = Arc::new(MockPlatform::new());
    let bot = online(&platform).await;
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);
    bot.register(CommandHandler::new("echo", move |cmd: Command, bot: Bot| {
        log.lock().push(cmd.args.clone());
        async move {
            bot.reply(&cmd.message, &cmd.args).await?;
            Ok(())
        }
    }))
    .await
    .unwrap();

    assert!(platform.deliver(message("%echo hello world")).await);
    settle().await;

    assert_eq!(*received.lock(), ["hello world"]);

    let t1 = Thread::group("T1");
    let calls: Vec<_> = platform
        .calls()
        .into_iter()
        .filter(|call| {
            !matches!(
                call,
                PlatformCall::StartSession { .. } | PlatformCall::ForwardEvents(_)
            )
        })
        .collect();
    assert_eq!(
        calls,
        [
            PlatformCall::MarkDelivered {
                thread: t1.clone(),
                message_id: "m1".into(),
            },
            PlatformCall::MarkRead(t1.clone()),
            PlatformCall::SetTyping(t1.clone(), TypingStatus::Typing),
            PlatformCall::SendMessage {
                thread: t1.clone(),
                text: "hello world".into(),
                options: SendOptions::new().reply_to("m1"),
            },
            PlatformCall::SetTyping(t1, TypingStatus::Stopped),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_same_command_twice_runs_both_in_order() {
    let platform = Arc::new(MockPlatform::new());
    let bot = online(&platform).await;
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in ["first", "second"] {
        let order = Arc::clone(&order);
        bot.register(CommandHandler::new("ping", move |_, _| {
            order.lock().push(tag);
            async { Ok(()) }
        }))
        .await
        .unwrap();
    }

    platform.deliver(message("%ping")).await;
    settle().await;

    assert_eq!(*order.lock(), ["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_command_stays_registered() {
    let platform = Arc::new(MockPlatform::new());
    let bot = online(&platform).await;
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    bot.register(CommandHandler::new("boom", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err(anyhow::anyhow!("exploded")) }
    }))
    .await
    .unwrap();

    platform.deliver(message("%boom")).await;
    settle().await;
    platform.deliver(message("%boom")).await;
    settle().await;

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(bot.registry().len(&EventKind::Message), 1);

    let notices = platform.sent_to(&Thread::group("T1"));
    assert_eq!(notices.len(), 2);
    assert!(notices[0].ends_with("\nexploded"));
    assert_eq!(platform.sent_to(&Thread::user("owner")).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_sends_notice_first() {
    let platform = Arc::new(MockPlatform::new());
    let bot = online(&platform).await;
    bot.register(
        CommandHandler::new("slow", |cmd: Command, bot: Bot| async move {
            bot.reply(&cmd.message, "done").await?;
            Ok(())
        })
        .wait(true),
    )
    .await
    .unwrap();

    platform.deliver(message("%slow")).await;
    settle().await;

    assert_eq!(
        platform.sent_to(&Thread::group("T1")),
        ["Please wait...", "done"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_handler_fires_once() {
    let platform = Arc::new(MockPlatform::new());
    let bot = online(&platform).await;
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    bot.register(TimeoutHandler::new(Duration::from_secs(5), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }))
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recurrent_handler_every_unit() {
    let platform = Arc::new(MockPlatform::new());
    let bot = online(&platform).await;
    let start = Instant::now();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&fired);
    bot.register(RecurrentHandler::every(Duration::from_secs(1), move |at, _| {
        log.lock().push(at);
        async { Ok(()) }
    }))
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let fired = fired.lock().clone();
    assert_eq!(fired.len(), 10);
    for pair in fired.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(1));
    }
    assert_eq!(fired[0] - start, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_command_registers_self_destruct_timer() {
    let platform = Arc::new(MockPlatform::new());
    let bot = online(&platform).await;
    bot.register(CommandHandler::new("bomb", |cmd: Command, bot: Bot| async move {
        bot.reply(&cmd.message, "Ticking...").await?;
        let thread = cmd.message.thread.clone();
        bot.register(TimeoutHandler::new(Duration::from_secs(10), move |bot: Bot| {
            let thread = thread.clone();
            async move {
                bot.send(&thread, "Boom").await?;
                Ok(())
            }
        }))
        .await?;
        Ok(())
    }))
    .await
    .unwrap();

    platform.deliver(message("%bomb")).await;
    settle().await;
    assert_eq!(platform.sent_to(&Thread::group("T1")), ["Ticking..."]);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(platform.sent_to(&Thread::group("T1")), ["Ticking...", "Boom"]);
}

#[tokio::test(start_paused = true)]
async fn test_expiring_reaction_handler() {
    let platform = Arc::new(MockPlatform::new());
    let bot = online(&platform).await;
    let votes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&votes);
    bot.register(
        ReactionHandler::new("poll", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .with_timeout(Duration::from_secs(120))
        .on_expire(|bot: Bot| async move {
            bot.send(&Thread::group("T1"), "Poll closed").await?;
            Ok(())
        }),
    )
    .await
    .unwrap();

    let vote = || Event::reaction(Reaction::new("poll", "👍", "U1", Thread::group("T1")));
    platform.deliver(vote()).await;
    settle().await;
    assert_eq!(votes.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    platform.deliver(vote()).await;
    settle().await;

    assert_eq!(votes.load(Ordering::SeqCst), 1);
    assert!(bot.registry().is_empty());
    assert_eq!(platform.sent_to(&Thread::group("T1")), ["Poll closed"]);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_stops_command_but_not_listen() {
    let platform = Arc::new(MockPlatform::new());
    let bot = Bot::new(
        platform.clone(),
        BotOptions::new("test").prefix("%").owner("owner"),
    );
    bot.login(&Credentials::new("bot", "secret")).await.unwrap();
    let listener = tokio::spawn({
        let bot = bot.clone();
        async move { bot.listen().await }
    });

    let finished = Arc::new(AtomicUsize::new(0));
    let done = Arc::clone(&finished);
    bot.register(CommandHandler::new("long", move |_, _| {
        let done = Arc::clone(&done);
        async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
    .await
    .unwrap();
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    bot.register(RecurrentHandler::every(Duration::from_secs(1), move |_, _| {
        let counter = Arc::clone(&counter);
        async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
    .await
    .unwrap();

    platform.deliver(message("%long")).await;
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(bot.interrupt());
    settle().await;
    assert!(!listener.is_finished());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!listener.is_finished());
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert!(ticks.load(Ordering::SeqCst) >= 2);

    bot.shutdown();
    assert!(listener.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_handler_with_unbounded_delay() {
    let platform = Arc::new(MockPlatform::new());
    let bot = online(&platform).await;
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    bot.register(TimeoutHandler::new(Duration::MAX, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }))
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_secs(86_400)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(bot.scheduler().pending(), 1);
}
