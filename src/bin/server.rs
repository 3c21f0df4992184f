use clap::Parser;
use redisync::codec::DEFAULT_MAX_FRAME_SIZE;
use redisync::config::{Config, Upstream, DEFAULT_DBFILENAME, DEFAULT_PORT};
use redisync::{server, Error};
use std::time::Duration;

#[derive(Parser, Debug)]
struct Args {
    /// The port to listen on
    #[arg(short, long, env = "REDISYNC_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory holding the snapshot file. Defaults to the working directory.
    #[arg(long)]
    dir: Option<String>,

    /// Snapshot file name, relative to `--dir`.
    #[arg(long, default_value = DEFAULT_DBFILENAME)]
    dbfilename: String,

    /// Run as a replica of the given primary, written as "<host> <port>".
    #[arg(long, env = "REDISYNC_REPLICAOF")]
    replicaof: Option<Upstream>,

    /// Largest frame accepted from a peer, in bytes.
    #[arg(long, env = "MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Periodically remove expired keys. Expired keys are only hidden when unset.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    expiry_sweep_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?.display().to_string(),
    };

    let config = Config {
        port: args.port,
        dir,
        dbfilename: args.dbfilename,
        replicaof: args.replicaof,
        max_frame_size: args.max_frame_size,
        expiry_sweep_interval: args.expiry_sweep_interval_ms.map(Duration::from_millis),
    };

    server::run(config).await
}
