use clap::{Parser, Subcommand};
use imagestudio::{
    logger::{self, LogLevel, LoggerConfig},
    ApiKey, GenerationController, GenerationRequest, GenerationResult, ImagePayload, Provider,
    Quality, StudioConfig, StudioError, TestOutcome,
};
use std::{env, path::PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Parser)]
#[command(
    name = "imagestudio",
    version,
    about = "Generate images with OpenAI, Gemini Imagen or Z.AI CogView using your own API key"
)]
struct Cli {
    /// Debug-level logging
    #[arg(long, global = true)]
    verbose: bool,
    /// Emit log lines as JSON
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit one prompt
    Generate(GenerateArgs),
    /// Read prompts from stdin, one per line, sharing one cooldown
    Session(SessionArgs),
    /// Check that a key authenticates, without generating anything
    TestKey(KeyArgs),
    /// List supported providers
    Providers,
}

#[derive(Debug, Parser)]
struct KeyArgs {
    #[arg(long, short)]
    provider: Provider,
    /// Falls back to the provider's *_API_KEY environment variable
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[command(flatten)]
    key: KeyArgs,
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "standard")]
    quality: Quality,
    #[arg(long)]
    seed: Option<u32>,
    /// Where to write inline image data
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[command(flatten)]
    key: KeyArgs,
    #[arg(long, default_value = "standard")]
    quality: Quality,
    /// Directory for inline images
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

impl KeyArgs {
    fn resolve_key(&self) -> ApiKey {
        let key = self
            .api_key
            .clone()
            .or_else(|| env::var(self.provider.key_env_var()).ok())
            .unwrap_or_default();
        ApiKey::new(key)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    logger::init_with_config(
        LoggerConfig::new()
            .with_level(level)
            .with_json_output(cli.json_logs),
    )?;
    logger::log_startup_info("imagestudio", env!("CARGO_PKG_VERSION"));
    if dotenv_loaded {
        log::debug!("✅ .env file loaded");
    }

    let config = StudioConfig::from_env()?;
    if cli.verbose {
        logger::log_config_info(&config);
    }

    match cli.command {
        Command::Providers => {
            for provider in Provider::all() {
                let endpoint = config.endpoint(provider);
                println!(
                    "{:<8} {:<22} {:<26} {}",
                    provider.to_string(),
                    provider.display_name(),
                    provider.model(),
                    endpoint.base_url
                );
            }
            Ok(())
        }
        Command::TestKey(args) => {
            let controller = GenerationController::new(config)?;
            let outcome = controller
                .test_api_key(&args.resolve_key(), args.provider)
                .await;
            match outcome {
                TestOutcome::Valid => println!("✅ {} key is valid", args.provider.display_name()),
                TestOutcome::NotApplicable => {
                    println!("ℹ️  {} needs no key", args.provider.display_name())
                }
                TestOutcome::Invalid(message) => {
                    println!("❌ {}", message);
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Command::Generate(args) => {
            let controller = GenerationController::new(config)?;
            let mut request =
                GenerationRequest::new(args.key.provider, args.prompt, args.key.resolve_key())
                    .with_quality(args.quality);
            if let Some(seed) = args.seed {
                request = request.with_seed(seed);
            }

            let result = controller.submit(request).await;
            let out = args.out;
            if !report(&result, args.key.provider, |payload| {
                out.clone()
                    .unwrap_or_else(|| PathBuf::from(default_file_name(args.key.provider, payload)))
            })? {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Session(args) => run_session(config, args).await,
    }
}

async fn run_session(
    config: StudioConfig,
    args: SessionArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = GenerationController::new(config)?;
    let api_key = args.key.resolve_key();
    let provider = args.key.provider;

    log::info!(
        "🖼️  Session with {}: one prompt per line, ':status' for the cooldown, ':quit' to exit",
        provider.display_name()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let prompt = line.trim();
        match prompt {
            "" => continue,
            ":quit" | ":q" => break,
            ":status" => {
                let state = controller.throttle();
                if state.can_request {
                    println!("ready");
                } else {
                    println!("cooling down: {}s remaining", state.cooldown_remaining_secs);
                }
                continue;
            }
            _ => {}
        }

        let request = GenerationRequest::new(provider, prompt, api_key.clone())
            .with_quality(args.quality);
        let result = controller.submit(request).await;
        let out_dir = args.out_dir.clone();
        report_and_continue(&result, provider, |payload| {
            out_dir.join(default_file_name(provider, payload))
        });
    }
    Ok(())
}

/// Like [`report`], but a failed save is printed instead of ending the session.
fn report_and_continue(
    result: &GenerationResult,
    provider: Provider,
    out_path: impl FnOnce(&ImagePayload) -> PathBuf,
) -> bool {
    match report(result, provider, out_path) {
        Ok(ok) => ok,
        Err(e) => {
            log::error!("❌ Could not save the {} image: {}", provider.display_name(), e);
            println!("❌ Could not save the image: {}", e);
            false
        }
    }
}

/// Prints the result, writing inline images to disk. Returns false on error.
fn report(
    result: &GenerationResult,
    provider: Provider,
    out_path: impl FnOnce(&ImagePayload) -> PathBuf,
) -> Result<bool, StudioError> {
    match result {
        GenerationResult::Image(ImagePayload::Url(url)) => {
            println!("🖼️  {}", url);
            Ok(true)
        }
        GenerationResult::Image(payload) => {
            let path = out_path(payload);
            if let Some(bytes) = payload.decode()? {
                std::fs::write(&path, &bytes)?;
                println!("💾 {} image saved to {}", provider.display_name(), path.display());
            }
            Ok(true)
        }
        GenerationResult::Error(error) => {
            println!("❌ {}", error.message);
            Ok(false)
        }
    }
}

fn default_file_name(provider: Provider, payload: &ImagePayload) -> String {
    format!(
        "generated_{}_{}.{}",
        provider,
        chrono::Utc::now().timestamp(),
        payload.file_extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagestudio::ErrorKind;

    fn inline(data: &str) -> GenerationResult {
        GenerationResult::Image(ImagePayload::Inline {
            mime_type: "image/png".to_string(),
            data: data.to_string(),
        })
    }

    #[test]
    fn test_session_survives_bad_image() {
        let dir = env::temp_dir().join(format!("imagestudio-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let garbled = inline("not base64 at all!");
        assert!(!report_and_continue(&garbled, Provider::GeminiImagen, |payload| {
            dir.join(default_file_name(Provider::GeminiImagen, payload))
        }));

        let missing_dir = dir.join("missing").join("out.png");
        assert!(!report_and_continue(&inline("iVBORw0KGgo="), Provider::GeminiImagen, |_| {
            missing_dir.clone()
        }));

        let target = dir.join("ok.png");
        assert!(report_and_continue(&inline("iVBORw0KGgo="), Provider::GeminiImagen, |_| {
            target.clone()
        }));
        assert_eq!(std::fs::read(&target).unwrap(), b"\x89PNG\r\n\x1a\n".to_vec());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_errors_report_false() {
        let result = GenerationResult::error(ErrorKind::AuthFailed, "bad key");
        assert!(!report_and_continue(&result, Provider::OpenAi, |_| PathBuf::from("unused.png")));
    }
}
