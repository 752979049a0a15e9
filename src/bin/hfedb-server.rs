//! hfedb server binary
//!
//! Listens for VCP connections and dispatches commands against a shared
//! `Db`, running the active-expire sweep on a background tick.

use clap::Parser;
use hfedb::server::Config;
use hfedb::Server;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Port number
    #[arg(short, long, default_value_t = 6380)]
    port: u16,

    /// Active-expire sweep interval in seconds (C9's cron tick)
    #[arg(long, default_value_t = 1)]
    active_expire_interval: u64,

    /// Max fields the active-expire sweep may remove per tick
    #[arg(long, default_value_t = 20)]
    active_expire_quota: u64,

    /// Promote a hash from listpack to hashtable past this many entries
    #[arg(long, default_value_t = hfedb::HashConfig::default().hash_max_listpack_entries)]
    hash_max_listpack_entries: u32,

    /// Promote a hash from listpack to hashtable past this field/value length
    #[arg(long, default_value_t = hfedb::HashConfig::default().hash_max_listpack_value)]
    hash_max_listpack_value: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hfedb=info".parse()?))
        .init();

    let args = Args::parse();

    info!("Starting hfedb server on {}:{}", args.bind, args.port);

    let hash = hfedb::HashConfig::default()
        .with_max_listpack_entries(args.hash_max_listpack_entries)
        .with_max_listpack_value(args.hash_max_listpack_value);

    let config = Config::default()
        .with_bind(&args.bind)
        .with_port(args.port)
        .with_active_expire_interval(args.active_expire_interval)
        .with_active_expire_quota(args.active_expire_quota)
        .with_hash_config(hash);

    let server = Server::new(config);
    server.run().await?;

    Ok(())
}
