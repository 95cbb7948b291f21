use clap::Parser;
use hianime::{CollectingSink, EpisodeReference, HianimeBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};

/// Resolve a HiAnime episode into playable streams and subtitles
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Episode data, e.g. "sub|/watch/one-piece-100?ep=2142"
    episode: EpisodeReference,

    /// Site base URL
    #[arg(long, env = "HIANIME_URL", default_value = hianime::BASE_URL)]
    base_url: String,

    /// Structured sources API base URL
    #[arg(long, env = "HIANIME_API", default_value = hianime::API_URL)]
    api_url: String,

    /// Logging verbosity (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let client = HianimeBuilder::new()
        .base_url(&cli.base_url)
        .api_url(&cli.api_url)
        .build()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let sink = CollectingSink::new();
    info!(episode = %cli.episode.to_data(), "resolving episode");
    let found = client
        .load_links_with_cancel(&cli.episode, &sink, &cancel)
        .await;

    if !found {
        warn!("no playable streams found");
    }

    for stream in sink.streams() {
        println!("{}\t{}", stream.label, stream.url);
        for (name, value) in &stream.headers {
            println!("\t{name}: {value}");
        }
    }
    for track in sink.subtitles() {
        println!(
            "subtitle\t{}\t{}",
            track.language.as_deref().unwrap_or("unknown"),
            track.url
        );
    }

    if found { Ok(()) } else { std::process::exit(1) }
}
