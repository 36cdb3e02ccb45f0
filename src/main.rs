use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use photosync_lib::config::default_config_path;
use photosync_lib::remote::live::DEFAULT_API_BASE;
use photosync_lib::ui_dispatch::DEFAULT_QUEUE_CAPACITY;
use photosync_lib::{AppOptions, ClientMode};

#[derive(Parser)]
#[command(name = "photosync", version)]
#[command(about = "Keep a local folder in sync with selected photo albums", long_about = None)]
struct Args {
    /// Configuration document (defaults to the user config dir)
    #[arg(long, env = "PHOTOSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the local control server
    #[arg(long, default_value_t = 3000, env = "PHOTOSYNC_PORT")]
    port: u16,

    /// Address for the local control server
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Built web settings app
    #[arg(long, default_value = "./dist")]
    web_dir: PathBuf,

    /// Use the offline album library instead of the remote API
    #[arg(long, env = "PHOTOSYNC_SIMULATED")]
    simulated: bool,

    #[arg(long, default_value = DEFAULT_API_BASE, env = "PHOTOSYNC_API_BASE")]
    api_base: String,

    /// Seconds between sync cycles
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
}

fn main() -> anyhow::Result<()> {
    photosync_lib::logging::init();
    let args = Args::parse();

    let client_mode = if args.simulated {
        ClientMode::Simulated
    } else {
        ClientMode::Live {
            base_url: args.api_base,
        }
    };

    photosync_lib::run(AppOptions {
        config_path: args.config.unwrap_or_else(default_config_path),
        client_mode,
        bind: args.bind,
        port: args.port,
        web_dir: args.web_dir,
        interval: Duration::from_secs(args.interval),
        queue_capacity: args.queue_capacity,
    })
}
