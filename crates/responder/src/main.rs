use canary_dns::{CannedAnswer, Server, DEFAULT_ANSWER_ADDRESS};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version)]
struct Args {
    #[arg(env, long, default_value_t = Ipv4Addr::UNSPECIFIED.into())]
    ip: IpAddr,
    #[arg(env, long, default_value_t = 53)]
    port: u16,
    #[arg(env, long, default_value_t = DEFAULT_ANSWER_ADDRESS)]
    answer_address: Ipv4Addr,
    /// Unbounded when unset.
    #[arg(env, long)]
    max_in_flight: Option<NonZeroUsize>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(&[("canary_dns", "info"), ("canary_responder", "info")]);

    let listen_address = SocketAddr::new(args.ip, args.port);
    let mut server = Server::bind(listen_address).await?;
    if let Some(max_in_flight) = args.max_in_flight {
        server = server.with_max_in_flight(max_in_flight);
    }
    let handler = CannedAnswer {
        address: args.answer_address,
    };

    tracing::info!(
        "🚀 Listening to DNS queries: {} (answering {})",
        server.local_addr()?,
        handler.address
    );

    tokio::select! {
        result = server.listen(handler) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}

fn init_tracing(filter: &[(&str, &str)]) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        filter
            .iter()
            .map(|(name, level)| format!("{}={}", name, level))
            .collect::<Vec<_>>()
            .join(",")
    });
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}
