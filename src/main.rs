mod config;
mod controller;
mod quiz;
mod storage;

use std::sync::Arc;

use controller::{Page, QuizController, SubmitOutcome};
use dotenv::dotenv;
use quiz::opentdb::{OpenTdb, QuestionSource};
use quiz::scores::ScoreRecord;
use quiz::{group_name, Question};
use rand::rngs::StdRng;
use rand::SeedableRng;
use storage::{FileStore, MemoryStore, Scoped};
use teloxide::{
    dispatching::{
        dialogue::{self, serializer::Json, ErasedStorage, SqliteStorage, Storage},
        UpdateHandler,
    },
    prelude::*,
    types::{
        ChatAction, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
        KeyboardRemove, MessageId, ParseMode, ReplyMarkup,
    },
    utils::{command::BotCommands, html},
    RequestError,
};

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type PageStorage = std::sync::Arc<ErasedStorage<State>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    Playing {
        page: Page,
        screen: Screen,
    },
}

/// Chat messages that currently show the round.
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Screen {
    questions: Vec<MessageId>,
    submit: Option<MessageId>,
}

// Buttons of an earlier round must not act on this one
impl Screen {
    fn shows_question(&self, index: usize, message: MessageId) -> bool {
        self.questions.get(index) == Some(&message)
    }

    fn shows_submit(&self, message: MessageId) -> bool {
        self.submit == Some(message)
    }
}

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
enum Command {
    #[command(description = "start a new round.")]
    Start,
    #[command(description = "show the leaderboard.")]
    Scores,
    #[command(description = "let someone else play.")]
    NewPlayer,
    #[command(description = "display this text.")]
    Help,
}

#[derive(Clone)]
struct Services {
    source: Arc<dyn QuestionSource>,
    sessions: Arc<MemoryStore>,
    durable: Arc<FileStore>,
}

impl Services {
    fn session(&self, chat_id: ChatId) -> Scoped<'_> {
        Scoped::new(self.sessions.as_ref(), chat_id.0)
    }

    fn controller<'a>(&'a self, session: &'a Scoped<'a>) -> QuizController<'a, StdRng> {
        QuizController::new(
            self.source.as_ref(),
            session,
            self.durable.as_ref(),
            StdRng::from_entropy(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // A missing .env is fine, the environment may already be set up
    dotenv().ok();

    pretty_env_logger::init();
    log::info!("Starting trivia bot...");

    let config = config::Config::from_env();
    let bot = Bot::from_env();

    log::info!("Opening dialogue storage at {}", config.dialogue_db);
    let storage: PageStorage = SqliteStorage::open(&config.dialogue_db, Json)
        .await?
        .erase();

    log::info!("Keeping scores in {}", config.scores_path.display());
    let services = Services {
        source: Arc::new(OpenTdb::new(config.api_url.clone())),
        sessions: Arc::new(MemoryStore::new()),
        durable: Arc::new(FileStore::new(config.scores_path.clone())),
    };

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![storage, services])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(start))
        .branch(case![Command::Help].endpoint(help))
        .branch(
            case![State::Playing { page, screen }]
                .branch(case![Command::Scores].endpoint(show_scores))
                .branch(case![Command::NewPlayer].endpoint(new_player)),
        );

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(case![State::Start].endpoint(start))
        .branch(
            case![State::Playing { page, screen }]
                .branch(
                    dptree::filter(|msg: Message| msg.text() == Some(NEW_PLAYER_BUTTON))
                        .endpoint(new_player),
                )
                .branch(dptree::endpoint(receive_name)),
        );

    let callback_query_handler = Update::filter_callback_query()
        .branch(case![State::Playing { page, screen }].endpoint(receive_answer))
        .branch(dptree::endpoint(stale_answer));

    dialogue::enter::<Update, ErasedStorage<State>, State, _>()
        .branch(message_handler)
        .branch(callback_query_handler)
}

const GREETING_TEXT: &str = "Hi! I'm a trivia bot. Every round has ten questions: \
tap an answer under each of them and press Submit. Scores go to the leaderboard!";
const NEW_PLAYER_BUTTON: &str = "New player";
const SUBMIT_DATA: &str = "submit";
const UNAVAILABLE_TEXT: &str = "Questions are unavailable right now. Send /start to try again.";
const LEADERBOARD_ROWS_PER_MESSAGE: usize = 50;
const PLAYER_COLUMN_WIDTH: usize = 24;

async fn start(bot: Bot, dialogue: QuizDialogue, msg: Message, services: Services) -> HandlerResult {
    if let Ok(Some(State::Playing { screen, .. })) = dialogue.get().await {
        clear_screen(&bot, msg.chat.id, &screen).await;
    }
    bot.send_message(msg.chat.id, GREETING_TEXT).await?;

    let session = services.session(msg.chat.id);
    let mut page = Page::default();
    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;
    services.controller(&session).start(&mut page).await;

    render_leaderboard(&bot, msg.chat.id, &page).await?;
    let screen = render_round(&bot, msg.chat.id, &page).await?;

    dialogue.update(State::Playing { page, screen }).await?;
    Ok(())
}

async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

async fn show_scores(
    bot: Bot,
    dialogue: QuizDialogue,
    (mut page, screen): (Page, Screen),
    msg: Message,
    services: Services,
) -> HandlerResult {
    let session = services.session(msg.chat.id);
    services.controller(&session).render_leaderboard(&mut page);
    render_leaderboard(&bot, msg.chat.id, &page).await?;

    dialogue.update(State::Playing { page, screen }).await?;
    Ok(())
}

async fn new_player(
    bot: Bot,
    dialogue: QuizDialogue,
    (mut page, screen): (Page, Screen),
    msg: Message,
    services: Services,
) -> HandlerResult {
    let session = services.session(msg.chat.id);
    services.controller(&session).new_player(&mut page)?;

    bot.send_message(msg.chat.id, "Who's playing now? Send me your name.")
        .reply_markup(KeyboardRemove::new())
        .await?;
    if let Some(submit) = screen.submit {
        // The old prompt still greets the previous player
        let _ = bot
            .edit_message_text(msg.chat.id, submit, submit_prompt(&page))
            .reply_markup(submit_keyboard())
            .await;
    }

    dialogue.update(State::Playing { page, screen }).await?;
    Ok(())
}

async fn receive_name(
    bot: Bot,
    dialogue: QuizDialogue,
    (mut page, screen): (Page, Screen),
    msg: Message,
    services: Services,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Please send your name as text")
            .await?;
        return Ok(());
    };
    page.username_input = text.to_string();

    let session = services.session(msg.chat.id);
    let reply = match quiz::player::active(&session) {
        Some(player) => format!(
            "You're playing as {}. Tap \"{}\" to switch players.",
            player, NEW_PLAYER_BUTTON
        ),
        None if text.trim().is_empty() => "Your name can't be blank.".to_string(),
        None => format!(
            "Nice to meet you, {}! Pick your answers and press Submit.",
            text.trim()
        ),
    };
    bot.send_message(msg.chat.id, reply).await?;

    dialogue.update(State::Playing { page, screen }).await?;
    Ok(())
}

async fn receive_answer(
    bot: Bot,
    dialogue: QuizDialogue,
    (mut page, screen): (Page, Screen),
    q: CallbackQuery,
    services: Services,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();

    if q.data.as_deref() == Some(SUBMIT_DATA) {
        let current = q
            .message
            .as_ref()
            .is_some_and(|message| screen.shows_submit(message.id));
        if !current {
            return stale_answer(bot, q).await;
        }

        let total = page.questions.len();
        let session = services.session(chat_id);
        let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
        let outcome = services.controller(&session).submit(&mut page).await?;

        let record = match outcome {
            SubmitOutcome::Ignored => {
                bot.answer_callback_query(q.id)
                    .text("Send me your name first")
                    .await?;
                return Ok(());
            }
            SubmitOutcome::Recorded(record) => record,
        };
        bot.answer_callback_query(q.id).await?;
        log::debug!("Chat {} finished a round as {}", chat_id.0, record.player);

        clear_screen(&bot, chat_id, &screen).await;
        bot.send_message(
            chat_id,
            format!(
                "{}, you got {} out of {}!",
                record.player, record.score, total
            ),
        )
        .await?;
        render_leaderboard(&bot, chat_id, &page).await?;
        let screen = render_round(&bot, chat_id, &page).await?;

        dialogue.update(State::Playing { page, screen }).await?;
        return Ok(());
    }

    let choice = q.data.as_deref().and_then(parse_choice);
    if let (Some((group, option)), Some(message)) = (choice, q.message.as_ref()) {
        let index = page.group_index(group);
        let current = index.is_some_and(|index| screen.shows_question(index, message.id));
        // Telegram rejects an edit that changes nothing
        let changed = page.checked.get(group) != Some(&option);
        if current && changed && page.check(group, option) {
            if let Some(question) = index.and_then(|index| page.questions.get(index)) {
                bot.edit_message_reply_markup(chat_id, message.id)
                    .reply_markup(question_keyboard(group, question, Some(option)))
                    .await?;
            }
        }
    }
    bot.answer_callback_query(q.id).await?;

    dialogue.update(State::Playing { page, screen }).await?;
    Ok(())
}

async fn stale_answer(bot: Bot, q: CallbackQuery) -> HandlerResult {
    bot.answer_callback_query(q.id)
        .text("This round is over. Send /start to play.")
        .await?;
    Ok(())
}

async fn render_leaderboard(bot: &Bot, chat_id: ChatId, page: &Page) -> Result<(), RequestError> {
    let markup: ReplyMarkup = if page.new_player_visible {
        KeyboardMarkup::new(vec![vec![KeyboardButton::new(NEW_PLAYER_BUTTON)]]).into()
    } else {
        KeyboardRemove::new().into()
    };

    let messages = leaderboard_messages(&page.leaderboard);
    let last = messages.len() - 1;
    for (n, text) in messages.into_iter().enumerate() {
        let request = bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
        if n == last {
            request.reply_markup(markup.clone()).await?;
        } else {
            request.await?;
        }
    }
    Ok(())
}

async fn render_round(bot: &Bot, chat_id: ChatId, page: &Page) -> Result<Screen, RequestError> {
    let mut screen = Screen::default();
    if page.questions.is_empty() {
        bot.send_message(chat_id, UNAVAILABLE_TEXT).await?;
        return Ok(screen);
    }

    for (index, question) in page.questions.iter().enumerate() {
        let group = group_name(index);
        let checked = page.checked.get(&group).copied();
        let sent = bot
            .send_message(chat_id, question_text(index, question))
            .parse_mode(ParseMode::Html)
            .reply_markup(question_keyboard(&group, question, checked))
            .await?;
        screen.questions.push(sent.id);
    }

    let sent = bot
        .send_message(chat_id, submit_prompt(page))
        .reply_markup(submit_keyboard())
        .await?;
    screen.submit = Some(sent.id);
    Ok(screen)
}

async fn clear_screen(bot: &Bot, chat_id: ChatId, screen: &Screen) {
    for id in screen.questions.iter().chain(screen.submit.iter()) {
        // Telegram refuses to delete old messages, those just stay
        let _ = bot.delete_message(chat_id, *id).await;
    }
}

fn question_text(index: usize, question: &Question) -> String {
    format!(
        "<b>Question {}</b> · <i>{} · {}</i>\n{}",
        index + 1,
        html::escape(&question.category),
        html::escape(&question.difficulty),
        html::escape(&question.text)
    )
}

fn question_keyboard(group: &str, question: &Question, checked: Option<usize>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(question.answers.iter().enumerate().map(|(option, answer)| {
        let mark = if checked == Some(option) { "🔘" } else { "⚪" };
        vec![InlineKeyboardButton::callback(
            format!("{} {}", mark, answer.text),
            format!("{}:{}", group, option),
        )]
    }))
}

fn submit_prompt(page: &Page) -> &'static str {
    if page.new_player_visible {
        "Done? Press Submit."
    } else {
        "Send me your name, then press Submit."
    }
}

fn submit_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Submit",
        SUBMIT_DATA,
    )]])
}

fn parse_choice(data: &str) -> Option<(&str, usize)> {
    let (group, option) = data.split_once(':')?;
    Some((group, option.parse().ok()?))
}

fn leaderboard_messages(scores: &[ScoreRecord]) -> Vec<String> {
    if scores.is_empty() {
        return vec!["🏆 No scores yet. Be the first!".to_string()];
    }

    scores
        .chunks(LEADERBOARD_ROWS_PER_MESSAGE)
        .enumerate()
        .map(|(n, chunk)| {
            let mut table = format!("{:<width$} {:>5}", "Player", "Score", width = PLAYER_COLUMN_WIDTH);
            for record in chunk {
                let player: String = record.player.chars().take(PLAYER_COLUMN_WIDTH).collect();
                table.push_str(&format!(
                    "\n{:<width$} {:>5}",
                    player,
                    record.score,
                    width = PLAYER_COLUMN_WIDTH
                ));
            }
            let header = if n == 0 { "🏆 <b>Leaderboard</b>\n" } else { "" };
            format!("{}<pre>{}</pre>", header, html::escape(&table))
        })
        .collect()
}
