use std::error::Error;
use std::io::Read;
use std::path::PathBuf;

use anyhow::anyhow;
use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

mod analysis;
mod config;
mod handlers;
mod llm;
mod render;
mod session;
mod state;
mod utils;

use config::{ANALYSIS_FAILED_MESSAGE, CONFIG};
use handlers::commands::{self, CALLBACK_PREFIX};
use handlers::input::InputDraft;
use llm::media::{ImageBlob, ImagePreview, LocalBlobReader};
use llm::{Analyzer, GeminiService};
use session::{run_analysis, Phase, SessionMachine};
use state::AppState;
use utils::logging::{init_logging, Console};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "解构 DECODE 命令：")]
enum Command {
    #[command(description = "开始使用")]
    Start,
    #[command(description = "显示帮助")]
    Help,
    #[command(description = "深度解读当前输入")]
    Decode(String),
    #[command(description = "移除已添加的图片")]
    Clearimage,
    #[command(description = "清空输入并重新开始")]
    Reset,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[derive(Debug, Default, PartialEq, Eq)]
struct AnalyzeArgs {
    text: String,
    image: Option<PathBuf>,
    video_link: String,
}

/// `--image -` reads the image bytes from stdin.
const STDIN_IMAGE: &str = "-";

fn analyze_usage() -> &'static str {
    "Usage: cargo run -- analyze [--text <text>] [--image <path>|-] [--video-link <url>]"
}

fn parse_analyze_args(args: &[String]) -> anyhow::Result<Option<AnalyzeArgs>> {
    if args.get(1).map(|value| value.as_str()) != Some("analyze") {
        return Ok(None);
    }

    let mut parsed = AnalyzeArgs::default();
    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--text" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --text"))?;
                parsed.text = value.clone();
            }
            "--image" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --image"))?;
                parsed.image = Some(PathBuf::from(value));
            }
            "--video-link" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --video-link"))?;
                parsed.video_link = value.clone();
            }
            "--help" | "-h" => {
                return Err(anyhow!(analyze_usage()));
            }
            other => {
                return Err(anyhow!(
                    "Unknown analyze argument: {other}\n{}",
                    analyze_usage()
                ));
            }
        }
        index += 1;
    }

    Ok(Some(parsed))
}

/// One-shot analysis from the terminal through the same state machine the
/// bot uses.
async fn run_cli_analysis(args: AnalyzeArgs) -> anyhow::Result<()> {
    let mut draft = InputDraft::default();
    draft.set_text(&args.text);
    draft.set_video_link(&args.video_link);
    if let Some(path) = args.image {
        let preview = if path.as_os_str() == STDIN_IMAGE {
            let bytes = tokio::task::spawn_blocking(|| {
                let mut bytes = Vec::new();
                std::io::stdin().lock().read_to_end(&mut bytes).map(|_| bytes)
            })
            .await??;
            ImagePreview::new(
                ImageBlob::Memory {
                    bytes,
                    mime_type: None,
                },
                "stdin",
            )
        } else {
            let label = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            ImagePreview::new(ImageBlob::File { path }, label)
        };
        draft.attach_image(preview);
    }
    if !draft.can_submit() {
        return Err(anyhow!("Nothing to analyze\n{}", analyze_usage()));
    }

    if CONFIG.gemini_api_key.trim().is_empty() {
        warn!("GEMINI_API_KEY is empty; the request will most likely be rejected");
    }

    let analyzer = Analyzer::<GeminiService>::from_config();
    let mut machine = SessionMachine::new();
    let input = machine.submit(draft.take_input())?;
    info!("Analyzing with {}", analyzer.model());

    let outcome = run_analysis(&analyzer, &LocalBlobReader, &input).await;
    match machine.resolve(outcome)? {
        Phase::Result => {
            if let Some((result, input)) = machine.result().zip(machine.input()) {
                println!("{}", render::render_plain(result, input));
            }
            Ok(())
        }
        _ => Err(anyhow!(machine
            .error_message()
            .unwrap_or(ANALYSIS_FAILED_MESSAGE)
            .to_string())),
    }
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if let Some(analyze_args) = parse_analyze_args(&args)? {
        let _guards = init_logging(Console::Stderr);
        run_cli_analysis(analyze_args).await?;
        return Ok(());
    }

    let _guards = init_logging(Console::Stdout);

    if CONFIG.bot_token.trim().is_empty() {
        return Err("BOT_TOKEN is required unless running analyze".into());
    }

    let bot = Bot::new(CONFIG.bot_token.clone());
    info!("Starting DECODE bot with model {}", CONFIG.gemini_model);

    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {err}");
    }

    let state = AppState::new(Analyzer::<GeminiService>::from_config());

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(dptree::filter(is_content_message).endpoint(handle_content_message))
        .endpoint(ignore_message);

    let callback_handler = Update::filter_callback_query()
        .filter(|query: CallbackQuery| {
            query
                .data
                .as_deref()
                .is_some_and(|data| data.starts_with(CALLBACK_PREFIX))
        })
        .endpoint(handle_callback_query);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn is_content_message(message: Message) -> bool {
    if let Some(text) = message.text().or_else(|| message.caption()) {
        if text.trim_start().starts_with('/') {
            return false;
        }
    }
    message.text().is_some()
        || message.caption().is_some()
        || message.photo().is_some()
        || message.document().is_some()
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    fn optional_arg(arg: String) -> Option<String> {
        if arg.trim().is_empty() {
            None
        } else {
            Some(arg)
        }
    }

    match command {
        Command::Start => commands::start_handler(bot, message).await?,
        Command::Help => commands::help_handler(bot, message).await?,
        Command::Decode(arg) => {
            let arg = optional_arg(arg);
            tokio::spawn(async move {
                if let Err(err) = commands::decode_handler(bot, state, message, arg).await {
                    error!("decode handler failed: {err}");
                }
            });
        }
        Command::Clearimage => commands::clear_image_handler(bot, state, message).await?,
        Command::Reset => commands::reset_handler(bot, state, message).await?,
    }
    Ok(())
}

async fn handle_callback_query(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = commands::callback_handler(bot, state, query).await {
            error!("decode callback failed: {err}");
        }
    });
    Ok(())
}

async fn handle_content_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    commands::content_handler(bot, state, message).await?;
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
