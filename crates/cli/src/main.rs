//! clipdock upload client.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clipdock_cli::sequencer::{self, SequencerConfig};
use clipdock_cli::ApiClient;
use clipdock_core::session::SessionId;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// clipdock - chunked media upload client
#[derive(Parser, Debug)]
#[command(name = "clipdock")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server base URL
    #[arg(
        short,
        long,
        env = "CLIPDOCK_SERVER",
        default_value = "http://127.0.0.1:8080"
    )]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a recording
    Upload {
        /// File to upload
        file: PathBuf,
        /// Metadata fields to attach (key=value), repeatable
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
        /// Resume an interrupted transfer by session id
        #[arg(long, value_name = "SESSION_ID")]
        resume: Option<String>,
        /// Chunk size in bytes
        #[arg(long, default_value_t = clipdock_core::DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
    },
    /// Show the state of an upload session
    Status {
        /// Session id
        session_id: String,
    },
    /// Abort an upload session, freeing server storage
    Abort {
        /// Session id
        session_id: String,
    },
}

fn parse_fields(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|field| {
            field
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("invalid field '{field}', expected KEY=VALUE"))
        })
        .collect()
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40.green/dim}] {pos:>3}% {msg}")
            .expect("valid progress template")
            .progress_chars("## "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    let api = ApiClient::new(&args.server)?;

    match args.command {
        Command::Upload {
            file,
            fields,
            resume,
            chunk_size,
        } => {
            let metadata = parse_fields(&fields)?;
            let config = SequencerConfig {
                chunk_size,
                ..Default::default()
            };
            let cancel = CancellationToken::new();

            let bar = progress_bar();
            bar.set_message(
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            let bar_for_progress = bar.clone();
            let mut progress = move |percent: u8| {
                bar_for_progress.set_position(u64::from(percent));
            };

            let result = match resume {
                Some(ref id) => {
                    let session_id =
                        SessionId::parse(id).context("invalid --resume session id")?;
                    sequencer::resume_upload(
                        &api,
                        session_id,
                        &file,
                        &config,
                        &cancel,
                        &mut progress,
                    )
                    .await
                }
                None => {
                    sequencer::upload_file(&api, &file, &metadata, &config, &cancel, &mut progress)
                        .await
                }
            };

            match result {
                Ok(completion) => {
                    bar.finish_with_message("done");
                    println!("uploaded {} ({} bytes)", completion.file_name, completion.file_size);
                    println!("artifact: {}", completion.artifact_key);
                    println!("session:  {}", completion.session_id);
                    Ok(())
                }
                Err(e) => {
                    bar.abandon_with_message("failed");
                    if let Some(session_id) = e.session_id {
                        eprintln!("resume with: clipdock upload {} --resume {}", file.display(), session_id);
                    }
                    bail!("{e}");
                }
            }
        }
        Command::Status { session_id } => {
            let session_id = SessionId::parse(&session_id).context("invalid session id")?;
            let status = api.session_status(session_id).await?;
            println!("session:   {}", status.session_id);
            println!("state:     {}", status.state);
            println!("file:      {} ({} bytes)", status.file_name, status.file_size);
            println!(
                "progress:  {}% ({}/{} chunks)",
                status.progress, status.received_count, status.total_chunks
            );
            if let Some(code) = status.error_code {
                println!("error:     {code}");
            }
            println!("last seen: {}", status.last_activity_at);
            Ok(())
        }
        Command::Abort { session_id } => {
            let session_id = SessionId::parse(&session_id).context("invalid session id")?;
            api.abort_session(session_id).await?;
            println!("aborted {session_id}");
            Ok(())
        }
    }
}
