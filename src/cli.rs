use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ytsum",
    about = "Summarize YouTube videos from their subtitles",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// YouTube video URL to summarize once and print (serves the web form if omitted)
    pub url: Option<String>,

    /// Address for the web form, e.g. 127.0.0.1:8501
    #[arg(short, long)]
    pub bind: Option<String>,

    /// LLM model for summarization
    #[arg(short, long)]
    pub model: Option<String>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Show pipeline progress and settings on stderr
    #[arg(short, long)]
    pub verbose: bool,
}
