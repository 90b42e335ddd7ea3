//! A small to-do list bot driven end to end through the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use chatflow_core::{
    ChatId, OutboundMessage, RenderedButton, SentMessage, Transport, TransportResult, Update,
    UserId, codec,
};
use chatflow_framework::{
    Action, ActionHandler, Button, CallbackRegistry, CommandHandler, Conversation,
    ConversationState, Dispatcher, Filter, FlowContext, FlowError, Markup, MessageHandler,
    Outcome, Payload, RegistryError, SendError, StateId,
};

const USER: UserId = 7;
const CHAT: ChatId = 70;

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
struct ChatLog {
    sent: Mutex<Vec<OutboundMessage>>,
    next_id: AtomicI64,
}

impl ChatLog {
    fn last(&self, chat: ChatId) -> OutboundMessage {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|m| m.chat == chat)
            .cloned()
            .expect("no message sent to chat")
    }

    fn button(&self, chat: ChatId, caption: &str) -> RenderedButton {
        self.last(chat)
            .keyboard
            .expect("last message has no keyboard")
            .buttons()
            .find(|b| codec::strip(&b.text) == caption)
            .cloned()
            .unwrap_or_else(|| panic!("no button labelled {caption:?}"))
    }
}

#[async_trait]
impl Transport for ChatLog {
    async fn send(&self, message: OutboundMessage) -> TransportResult<SentMessage> {
        let chat = message.chat;
        self.sent.lock().push(message);
        Ok(SentMessage {
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            chat,
        })
    }
}

// ============================================================================
// Bot
// ============================================================================

#[derive(Debug, Clone)]
struct Item {
    text: String,
    done: bool,
}

#[derive(Debug, Default)]
struct TodoList(Vec<Item>);

struct Actions {
    start: Arc<Action>,
    add: Arc<Action>,
    done: Arc<Action>,
    toggle: Arc<Action>,
}

async fn render_list(
    ctx: &FlowContext,
    actions: &Actions,
    header: &str,
) -> Result<(), SendError> {
    let items = ctx
        .chat_data()
        .map(|data| data.with(|list: &mut TodoList| list.0.clone()))
        .unwrap_or_default();

    let mut text = header.to_string();
    let mut markup = Markup::inline(Vec::new());
    for (index, item) in items.iter().enumerate() {
        let mark = if item.done { "✅" } else { "⬜" };
        text.push_str(&format!("\n{mark} {}", item.text));
        markup = markup.row([Button::with_caption(
            &actions.toggle,
            format!("Toggle {}", item.text),
            Some(Payload::new(index)),
        )?]);
    }
    markup = markup.row([Button::new(&actions.add)?]);

    ctx.reply(text, Some(markup)).await?;
    Ok(())
}

struct Bot {
    dispatcher: Dispatcher,
    log: Arc<ChatLog>,
    actions: Arc<Actions>,
    todo: Arc<Conversation>,
    errors: Arc<Mutex<Vec<Arc<FlowError>>>>,
}

impl Bot {
    fn new() -> Self {
        let actions = Arc::new(Actions {
            start: Action::builder("start").caption("Back").command("start").build(),
            add: Action::builder("add")
                .caption("Add ➕")
                .commands(["add", "todo"])
                .build(),
            done: Action::builder("done")
                .payload_type::<String>()
                .buttons(false)
                .inline_buttons(false)
                .build(),
            toggle: Action::builder("toggle").payload_type::<usize>().build(),
        });

        let log = Arc::new(ChatLog::default());
        let mut dispatcher =
            Dispatcher::new(Arc::new(CallbackRegistry::default()), log.clone());

        let done = Arc::clone(&actions.done);
        let listing = Arc::clone(&actions);
        let todo = dispatcher.add_conversation(
            0,
            Conversation::builder("todo")
                .entry_point(ActionHandler::new(&actions.add, |ctx: Arc<FlowContext>| async move {
                    ctx.reply("What should I add?", None).await?;
                    Ok::<_, SendError>(Outcome::to("AWAITING_TEXT"))
                }))
                .state(
                    "AWAITING_TEXT",
                    vec![Arc::new(MessageHandler::new(
                        Filter::text(),
                        move |ctx: Arc<FlowContext>| {
                            let done = Arc::clone(&done);
                            async move {
                                let text = ctx.text().unwrap_or_default().trim().to_string();
                                if let Some(data) = ctx.chat_data() {
                                    data.with(|list: &mut TodoList| {
                                        list.0.push(Item {
                                            text: text.clone(),
                                            done: false,
                                        })
                                    });
                                }
                                done.reroute(Some(Payload::new(text)))
                            }
                        },
                    ))],
                )
                .fallback(ActionHandler::new(&actions.done, move |ctx: Arc<FlowContext>| {
                    let actions = Arc::clone(&listing);
                    async move {
                        let item = ctx.payload_as::<String>().cloned().unwrap_or_default();
                        render_list(&ctx, &actions, &format!("Added: {item}")).await?;
                        Ok::<_, SendError>(Outcome::End)
                    }
                }))
                .fallback(CommandHandler::new(["cancel"], |_ctx: Arc<FlowContext>| async {
                    Outcome::End
                }))
                .build(),
        );

        let listing = Arc::clone(&actions);
        dispatcher.add_handler(
            1,
            ActionHandler::new(&actions.start, move |ctx: Arc<FlowContext>| {
                let actions = Arc::clone(&listing);
                async move { render_list(&ctx, &actions, "Your to-do list").await }
            }),
        );

        let start = Arc::clone(&actions.start);
        dispatcher.add_handler(
            1,
            ActionHandler::new(&actions.toggle, move |ctx: Arc<FlowContext>| {
                let start = Arc::clone(&start);
                async move {
                    let index = ctx.payload_as::<usize>().copied();
                    if let (Some(index), Some(data)) = (index, ctx.chat_data()) {
                        data.with(|list: &mut TodoList| {
                            if let Some(item) = list.0.get_mut(index) {
                                item.done = !item.done;
                            }
                        });
                    }
                    start.reroute(None)
                }
            }),
        );

        dispatcher.add_handler(
            2,
            CommandHandler::new(["bump"], |ctx: Arc<FlowContext>| async move {
                if let Some(data) = ctx.chat_data() {
                    let seen = data.get::<u32>().unwrap_or_default();
                    tokio::task::yield_now().await;
                    data.set(seen + 1);
                }
            }),
        );
        dispatcher.add_handler(
            2,
            CommandHandler::new(["count"], |ctx: Arc<FlowContext>| async move {
                let count = ctx
                    .chat_data()
                    .and_then(|data| data.get::<u32>())
                    .unwrap_or_default();
                ctx.reply(count.to_string(), None).await?;
                Ok::<_, SendError>(())
            }),
        );

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        dispatcher.add_error_handler(move |_update: Arc<Update>, error: Arc<FlowError>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(error);
            }
        });

        Self {
            dispatcher,
            log,
            actions,
            todo,
            errors,
        }
    }

    async fn send(&self, update: Update) -> bool {
        self.dispatcher.process_update(update).await
    }

    fn state(&self, user: UserId, chat: ChatId) -> ConversationState {
        self.todo
            .current_state(&Update::message(0, user, chat, "").key())
    }
}

fn awaiting_text() -> ConversationState {
    ConversationState::In(StateId::from("AWAITING_TEXT"))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_add_item_end_to_end() {
    let bot = Bot::new();

    assert!(bot.send(Update::message(1, USER, CHAT, "/start")).await);
    assert_eq!(bot.log.last(CHAT).text, "Your to-do list");
    assert_eq!(bot.state(USER, CHAT), ConversationState::Entry);

    let add = bot.log.button(CHAT, "Add ➕");
    let data = add.callback_data.expect("inline button carries callback data");
    assert!(bot.send(Update::callback_query(2, USER, CHAT, data)).await);
    assert_eq!(bot.log.last(CHAT).text, "What should I add?");
    assert_eq!(bot.state(USER, CHAT), awaiting_text());

    assert!(bot.send(Update::message(3, USER, CHAT, "buy milk")).await);
    let list = bot.log.last(CHAT);
    assert_eq!(list.text, "Added: buy milk\n⬜ buy milk");
    assert_eq!(bot.state(USER, CHAT), ConversationState::Entry);
    assert!(bot.errors.lock().is_empty());
}

#[tokio::test]
async fn test_reply_keyboard_press_starts_conversation() {
    let bot = Bot::new();
    let markup = Markup::reply(vec![vec![Button::new(&bot.actions.add).unwrap().into()]]);
    bot.dispatcher
        .outbox()
        .send(CHAT, "menu", Some(markup))
        .await
        .unwrap();

    let key = bot.log.button(CHAT, "Add ➕");
    assert!(key.callback_data.is_none());
    assert!(codec::extract(&key.text).is_some());

    assert!(bot.send(Update::message(1, USER, CHAT, key.text)).await);
    assert_eq!(bot.state(USER, CHAT), awaiting_text());
}

#[tokio::test]
async fn test_text_outside_state_is_ignored() {
    let bot = Bot::new();
    assert!(!bot.send(Update::message(1, USER, CHAT, "buy milk")).await);

    bot.send(Update::message(2, USER, CHAT, "/add")).await;
    assert_eq!(bot.state(USER, CHAT), awaiting_text());

    // Entry points are not eligible mid-conversation.
    assert!(!bot.send(Update::message(3, USER, CHAT, "/todo")).await);
    assert_eq!(bot.state(USER, CHAT), awaiting_text());

    bot.send(Update::message(4, USER, CHAT, "/cancel")).await;
    assert_eq!(bot.state(USER, CHAT), ConversationState::Entry);
}

#[tokio::test]
async fn test_toggle_reroutes_to_list() {
    let bot = Bot::new();
    bot.send(Update::message(1, USER, CHAT, "/add")).await;
    bot.send(Update::message(2, USER, CHAT, "buy milk")).await;

    let toggle = bot.log.button(CHAT, "Toggle buy milk");
    bot.send(Update::callback_query(3, USER, CHAT, toggle.callback_data.unwrap()))
        .await;

    assert_eq!(bot.log.last(CHAT).text, "Your to-do list\n✅ buy milk");
    assert!(bot.errors.lock().is_empty());
}

#[tokio::test]
async fn test_button_from_other_chat_is_rejected() {
    const OTHER: ChatId = 71;
    let bot = Bot::new();
    bot.send(Update::message(1, USER, CHAT, "/add")).await;
    bot.send(Update::message(2, USER, CHAT, "buy milk")).await;
    let toggle = bot.log.button(CHAT, "Toggle buy milk");
    let messages = bot.log.sent.lock().len();

    let data = toggle.callback_data.unwrap();
    assert!(bot.send(Update::callback_query(3, USER, OTHER, data)).await);

    assert_eq!(bot.log.sent.lock().len(), messages);
    let errors = bot.errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0].as_ref(),
        FlowError::Registry(RegistryError::ChatMismatch { requested: OTHER, .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chats_run_concurrently_and_keep_their_own_lists() {
    let bot = Arc::new(Bot::new());

    let tasks: Vec<_> = (0..8i64)
        .map(|chat| {
            let bot = Arc::clone(&bot);
            tokio::spawn(async move {
                for i in 0..5u64 {
                    let id = chat as u64 * 100 + i * 2;
                    bot.send(Update::message(id, USER, chat, "/add")).await;
                    bot.send(Update::message(id + 1, USER, chat, format!("item {chat}-{i}")))
                        .await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    for chat in 0..8i64 {
        let list = bot.log.last(chat).text;
        let expected: Vec<String> = (0..5).map(|i| format!("⬜ item {chat}-{i}")).collect();
        assert_eq!(list.lines().skip(1).collect::<Vec<_>>(), expected);
        assert_eq!(bot.state(USER, chat), ConversationState::Entry);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_updates_of_one_conversation_are_serialized() {
    let bot = Arc::new(Bot::new());

    let tasks: Vec<_> = (0..50u64)
        .map(|id| {
            let bot = Arc::clone(&bot);
            tokio::spawn(async move { bot.send(Update::message(id, USER, CHAT, "/bump")).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap());
    }

    bot.send(Update::message(100, USER, CHAT, "/count")).await;
    assert_eq!(bot.log.last(CHAT).text, "50");
}
