use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use eyre::{Result, WrapErr, bail};
use log::{debug, info};

mod cli;

use cli::Cli;
use ytsum::config::{Config, Overrides, Settings};
use ytsum::pipeline::Pipeline;
use ytsum::web::{AppState, create_router};

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytsum.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytsum")
        .join("logs")
}

fn tool_version(name: &str) -> Option<String> {
    Command::new(name)
        .arg("--version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .lines()
                .next()
                .unwrap_or("")
                .to_string()
        })
}

fn build_after_help() -> String {
    let yt_dlp_line = match tool_version("yt-dlp") {
        Some(v) => format!("  \x1b[32m✅\x1b[0m yt-dlp     {v}"),
        None => "  \x1b[31m❌\x1b[0m yt-dlp     (not found — needed to fetch subtitles)".to_string(),
    };

    let log_path = log_dir().join("ytsum.log");

    format!(
        "\nREQUIRED TOOLS:\n{yt_dlp_line}\n\nThe summarization API key is read from ${}.\nLogs are written to: {}",
        ytsum::config::API_KEY_ENV,
        log_path.display()
    )
}

fn load_config(cli: &Cli) -> Result<Config> {
    match cli.config {
        Some(ref path) => Config::load_from(path).wrap_err_with(|| format!("failed to load config {}", path.display())),
        // Missing or broken default config is not fatal
        None => Ok(Config::load().unwrap_or_default()),
    }
}

async fn summarize_once(pipeline: &Pipeline<ytsum::youtube::YtDlp, ytsum::summarize::ChatClient>, url: &str) -> Result<()> {
    let request = ytsum::VideoRequest { url: url.to_string() };
    match pipeline.run(&request).await {
        Ok(summary) => {
            println!("{}", summary.text);
            Ok(())
        }
        Err(failure) if failure.error.is_validation() => bail!("{}", failure.error),
        Err(failure) => Err(eyre::Report::new(failure)),
    }
}

async fn serve(pipeline: Pipeline<ytsum::youtube::YtDlp, ytsum::summarize::ChatClient>, bind: &str) -> Result<()> {
    let app = create_router(Arc::new(AppState::new(pipeline)));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .wrap_err_with(|| format!("failed to bind {bind}"))?;
    info!("Serving web form on http://{bind}");
    eprintln!("Serving web form on http://{bind}");

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    let config = load_config(&cli)?;
    let overrides = Overrides {
        bind: cli.bind.clone(),
        model: cli.model.clone(),
    };
    let settings = Settings::from_env(config, overrides);

    if cli.verbose {
        let config_path = cli.config.clone().unwrap_or_else(ytsum::config::config_path);
        if config_path.exists() {
            eprintln!("Config: {}", config_path.display());
        }
        eprintln!(
            "Model: {} via {}\nAPI key: {}",
            settings.model,
            settings.api_base,
            if settings.api_key.is_some() { "set" } else { "missing" }
        );
    }
    debug!("Resolved settings: model={} bind={} yt-dlp={}", settings.model, settings.bind, settings.yt_dlp);

    let pipeline = Pipeline::from_settings(&settings)?;

    match cli.url {
        Some(ref url) => summarize_once(&pipeline, url).await,
        None => serve(pipeline, &settings.bind).await,
    }
}
