//! palaver CLI: chat server and thin client.
//!
//! ```text
//! palaver serve [--port 5000] [--host 127.0.0.1] [--model llama3.2] ...
//! palaver chat "hello" [--image] [--audio] [--offline] [--server http://localhost:5000]
//! palaver speak "hello" [--offline] [--server ...]
//! palaver status [--server ...]
//! ```
//!
//! Every `serve` flag can also be set through its `PALAVER_*` environment
//! variable; a `.env` file in the working directory is loaded first.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use palaver_lib::palaver_core::history::DEFAULT_HISTORY_CAPACITY;
use palaver_lib::palaver_core::types::{
    ChatConfig, ChatRequest, CloudTtsConfig, DEFAULT_SPEECH_RATE_WPM, DEFAULT_TIMEOUT_SECS,
    OfflineTtsConfig, ServerConfig, SpeakRequest,
};

/// palaver: chat server with image and speech output
#[derive(Parser)]
#[command(name = "palaver", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the palaver server
    Serve(ServeArgs),
    /// Send a chat message to the running server
    Chat {
        /// Message text
        message: String,
        /// Also render an image of the prompt
        #[arg(long)]
        image: bool,
        /// Also speak the reply
        #[arg(long)]
        audio: bool,
        /// Speak on the server's audio device instead of saving an MP3
        #[arg(long)]
        offline: bool,
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,
    },
    /// Speak text through the running server
    Speak {
        /// Text to speak
        text: String,
        /// Speak on the server's audio device instead of saving an MP3
        #[arg(long)]
        offline: bool,
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,
    },
    /// Get server status
    Status {
        #[arg(long, default_value = "http://localhost:5000")]
        server: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Listen host
    #[arg(long, env = "PALAVER_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Listen port
    #[arg(long, env = "PALAVER_PORT", default_value = "5000")]
    port: u16,
    /// Directory served under /static; generated files go here
    #[arg(long, env = "PALAVER_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,
    /// Ollama server URL
    #[arg(long, env = "PALAVER_OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,
    /// Ollama model name
    #[arg(long, env = "PALAVER_MODEL", default_value = "llama3.2")]
    model: String,
    /// Cloud TTS base URL
    #[arg(long, env = "PALAVER_TTS_URL", default_value = "https://translate.google.com")]
    tts_url: String,
    /// Cloud TTS language
    #[arg(long, env = "PALAVER_TTS_LANG", default_value = "en")]
    tts_lang: String,
    /// Local Kokoro server URL for offline speech
    #[arg(long, env = "PALAVER_KOKORO_URL", default_value = "http://localhost:3001")]
    kokoro_url: String,
    /// Offline speech voice
    #[arg(long, env = "PALAVER_VOICE", default_value = "af_heart")]
    voice: String,
    /// Offline speaking rate in words per minute
    #[arg(long, env = "PALAVER_RATE", default_value_t = DEFAULT_SPEECH_RATE_WPM)]
    rate: u32,
    /// TrueType font for image text
    #[arg(long, env = "PALAVER_FONT")]
    font: Option<PathBuf>,
    /// Number of chat turns kept in memory
    #[arg(long, env = "PALAVER_HISTORY_CAPACITY", default_value_t = DEFAULT_HISTORY_CAPACITY)]
    history_capacity: usize,
    /// Timeout for chat and cloud TTS requests, in seconds
    #[arg(long, env = "PALAVER_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            static_dir: args.static_dir,
            history_capacity: args.history_capacity,
            font_path: args.font,
            chat: ChatConfig {
                ollama_url: args.ollama_url,
                model: args.model,
                timeout_secs: args.timeout_secs,
            },
            cloud_tts: CloudTtsConfig {
                base_url: args.tts_url,
                lang: args.tts_lang,
                timeout_secs: args.timeout_secs,
            },
            offline_tts: OfflineTtsConfig {
                kokoro_url: args.kokoro_url,
                voice: args.voice,
                rate_wpm: args.rate,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = ServerConfig::from(args);
            tracing::info!(
                model = %config.chat.model,
                static_dir = %config.static_dir.display(),
                "starting palaver"
            );
            palaver_lib::server::serve(config).await?;
        }

        Command::Chat {
            message,
            image,
            audio,
            offline,
            server,
        } => {
            let body = ChatRequest {
                message,
                image_mode: image,
                audio_mode: audio,
                offline_tts: offline,
            };
            post_json(&server, "api/chat", &serde_json::to_value(body)?).await?;
        }

        Command::Speak {
            text,
            offline,
            server,
        } => {
            let body = SpeakRequest {
                text,
                offline_tts: offline,
            };
            post_json(&server, "api/speak", &serde_json::to_value(body)?).await?;
        }

        Command::Status { server } => {
            let resp = reqwest::Client::new()
                .get(format!("{}/api/status", server.trim_end_matches('/')))
                .send()
                .await?;
            println!("{}", resp.text().await?);
        }
    }

    Ok(())
}

async fn post_json(server: &str, endpoint: &str, body: &serde_json::Value) -> anyhow::Result<()> {
    let resp = reqwest::Client::new()
        .post(format!("{}/{endpoint}", server.trim_end_matches('/')))
        .json(body)
        .send()
        .await?;
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        anyhow::bail!("server returned {status}: {text}");
    }
    println!("{text}");
    Ok(())
}
