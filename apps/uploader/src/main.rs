use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{ResultBoard, UploadClient, UploadFile};
use shared::{domain::LineKind, render::ResultLine};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Upload images to the image upload server")]
struct Args {
    #[arg(long, env = "UPLOADER_SERVER_URL", default_value = "http://127.0.0.1:5000")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload one image.
    Single { path: PathBuf },
    /// Upload several images in one request.
    Batch { paths: Vec<PathBuf> },
    /// Publish the spooled images to the configured repository.
    Push,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let client = UploadClient::new(&args.server_url)
        .with_context(|| format!("invalid --server-url {}", args.server_url))?;
    info!(server_url = %client.server_url(), "using upload server");

    match args.command {
        Command::Single { path } => {
            let file = UploadFile::from_path(&path).await?;
            let board = ResultBoard::new();
            let submission = board.begin();
            let outcome = client.upload_single(file).await?;
            board.complete(submission, &outcome);
            Ok(report(&board.lines()))
        }
        Command::Batch { paths } => {
            let mut files = Vec::with_capacity(paths.len());
            for path in &paths {
                files.push(UploadFile::from_path(path).await?);
            }
            let board = ResultBoard::new();
            let submission = board.begin();
            let outcome = client.upload_batch(files).await?;
            board.complete(submission, &outcome);
            Ok(report(&board.lines()))
        }
        Command::Push => {
            let reply = client.trigger_push().await?;
            println!("{}", reply.message);
            Ok(if reply.status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn report(lines: &[ResultLine]) -> ExitCode {
    for line in lines {
        println!("{}", format_line(line));
    }
    if has_error(lines) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn format_line(line: &ResultLine) -> String {
    let label = match line.kind {
        LineKind::Success => "ok",
        LineKind::Error => "error",
    };
    format!("[{label}] {}", line.text)
}

fn has_error(lines: &[ResultLine]) -> bool {
    lines.iter().any(|line| line.kind == LineKind::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_their_kind() {
        assert_eq!(
            format_line(&ResultLine::success("Uploaded: a.png")),
            "[ok] Uploaded: a.png"
        );
        assert_eq!(format_line(&ResultLine::error("Error: b.txt")), "[error] Error: b.txt");
    }

    #[test]
    fn any_error_line_fails_the_run() {
        assert!(!has_error(&[]));
        assert!(!has_error(&[ResultLine::success("Uploaded: a.png")]));
        assert!(has_error(&[
            ResultLine::success("Uploaded: a.png"),
            ResultLine::error("Error: b.txt"),
        ]));
    }

    #[test]
    fn cli_parses_batch_paths_and_default_server() {
        let args = Args::try_parse_from(["uploader", "batch", "a.png", "b.jpg"]).expect("args");
        assert!(args.server_url.starts_with("http"));
        match args.command {
            Command::Batch { paths } => {
                assert_eq!(paths, vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")])
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
