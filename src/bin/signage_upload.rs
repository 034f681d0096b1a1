//! Signage upload CLI
//!
//! Uploads one media file to the signage backend and, optionally, points an
//! ad record at the new file.

use bytesize::ByteSize;
use clap::{value_parser, Arg, ArgAction, Command};
use signage_uploader::{
    init_logging, CancellationToken, LogLevel, ProgressSnapshot, UploadOptions, Uploader,
    UploaderConfig,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("signage-upload")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Upload ad media to the signage backend")
        .arg(
            Arg::new("file")
                .help("File to upload")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .help("Backend base URL (overrides config and SIGNAGE_API_URL)"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .help("Bearer token for backend calls"),
        )
        .arg(
            Arg::new("record-id")
                .long("record-id")
                .help("Ad record to point at the uploaded file"),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .help("Parts uploaded at the same time")
                .value_parser(value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("checksum")
                .long("checksum")
                .help("Compute the SHA-256 of the file before uploading")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose output")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => UploaderConfig::from_file(path)?,
        None => UploaderConfig::default(),
    }
    .with_env()?;

    if let Some(url) = matches.get_one::<String>("api-url") {
        config.api_url = url.clone();
    }
    if let Some(token) = matches.get_one::<String>("token") {
        config.api_token = Some(token.clone());
    }
    if matches.get_flag("verbose") {
        config.log_level = LogLevel::Debug;
    }

    init_logging(config.log_level);

    let file = matches
        .get_one::<String>("file")
        .ok_or("no file given")?
        .clone();
    let concurrency = matches
        .get_one::<usize>("concurrency")
        .copied()
        .unwrap_or(1);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling upload...");
                cancel.cancel();
            }
        });
    }

    let mut options = UploadOptions::new()
        .concurrency(concurrency)
        .compute_checksum(matches.get_flag("checksum"))
        .cancel_token(cancel)
        .on_progress(print_progress);
    if let Some(record_id) = matches.get_one::<String>("record-id") {
        options = options.record_id(record_id.clone());
    }

    let uploader = Uploader::from_config(config)?;
    let result = uploader.upload_file(&file, options).await?;

    println!("Uploaded {} as {}", file, result.file_identifier);
    println!("  Strategy: {}", result.strategy);
    println!("  Size: {}", result.size_display());
    if let Some(parts) = result.parts {
        println!("  Parts: {}", parts);
    }
    println!(
        "  Duration: {}",
        format_eta(Some(Duration::from_millis(result.duration_ms)))
    );
    if let Some(ref checksum) = result.checksum_sha256 {
        println!("  SHA-256: {}", checksum);
    }
    if result.record_updated {
        println!("  Record updated");
    }

    Ok(())
}

fn print_progress(snapshot: &ProgressSnapshot) {
    println!(
        "{:>3}%  {} / {}  {}/s  {} remaining",
        snapshot.percent,
        ByteSize::b(snapshot.bytes_acked),
        ByteSize::b(snapshot.total_bytes),
        ByteSize::b(snapshot.throughput_bps as u64),
        format_eta(snapshot.eta())
    );
}

/// Roll a duration up into minutes and seconds
fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        None => "--".to_string(),
        Some(eta) => {
            let secs = eta.as_secs_f64().round() as u64;
            match (secs / 60, secs % 60) {
                (0, s) => format!("{}s", s),
                (m, s) => format!("{}m {}s", m, s),
            }
        }
    }
}
