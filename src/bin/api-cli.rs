use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use loopback_api_sdk::{ApiClient, ClientError, TranscribeOptions, DEFAULT_URL};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "api-cli")]
#[command(about = "Command-line client for the local transcription API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server status and the active model
    Status,
    /// List known models and their state
    Models,
    /// Make a downloaded model active
    Select {
        /// Model id, e.g. whisper-base
        model: String,
    },
    /// Transcribe an audio file
    Transcribe {
        file: PathBuf,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(short, long)]
        language: Option<String>,

        /// Translate to English instead of transcribing
        #[arg(long)]
        translate: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.url);

    let result = match cli.command {
        Commands::Status => print(client.status().await),
        Commands::Models => print(client.models().await),
        Commands::Select { model } => print(client.select_model(&model).await),
        Commands::Transcribe {
            file,
            model,
            language,
            translate,
        } => {
            let options = TranscribeOptions {
                model,
                language,
                translate,
            };
            print(client.transcribe_file(&file, &options).await)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print<T: Serialize>(result: Result<T, ClientError>) -> Result<(), ClientError> {
    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}
