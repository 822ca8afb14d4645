use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use qc_fc::{doctor as fc_doctor, AnySink, SinkConfig};
use qc_link::{control, doctor as link_doctor};
use qc_link::{ControlState, Initiator, LinkConfig, Responder, StopFlag, TimingConfig};
use qc_proto::ControlCommand;

#[derive(Debug, Parser)]
#[command(name = "qc", version, about = "Quadcopter remote control link")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration file.
    Doctor,
    /// Operator station: read keys and stream control frames to the craft.
    Client,
    /// Flight side: accept the operator link and drive the flight controller.
    Server,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    link: LinkConfig,
    timing: TimingConfig,
    sink: SinkConfig,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Client => client(&cfg).await?,
        Command::Server => server(&cfg).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    link_doctor::check_link(&cfg.link)?;
    link_doctor::check_timing(&cfg.timing)?;
    fc_doctor::check_sink(&cfg.sink)?;
    if cfg.timing.echo_timeout().is_none() {
        info!("doctor: echo_timeout_ms unset, a silent responder will stall the client");
    }
    info!("doctor: OK");
    Ok(())
}

async fn client(cfg: &Config) -> Result<()> {
    println!("Quadcopter remote control, v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", control::HELP);

    let control = ControlState::new(ControlCommand::NEUTRAL);
    let stop = StopFlag::new();

    // Plain thread: a blocked stdin read must not hold up runtime shutdown.
    {
        let control = control.clone();
        let stop = stop.clone();
        std::thread::Builder::new()
            .name("keyboard".into())
            .spawn(move || {
                if let Err(e) = control::run_keyboard(std::io::stdin().lock(), &control, &stop) {
                    warn!("input: keyboard read failed: {}", e);
                }
            })
            .context("spawn keyboard thread")?;
    }
    spawn_ctrl_c(stop.clone());

    info!("client: sending to {} every {:?}", cfg.link.connect_addr(), cfg.timing.send_period());
    let mut initiator = Initiator::new(&cfg.link, cfg.timing.clone(), control, stop);
    initiator.run().await;
    Ok(())
}

async fn server(cfg: &Config) -> Result<()> {
    info!("Quadcopter remote control server, v{}", env!("CARGO_PKG_VERSION"));

    let sink = AnySink::open(&cfg.sink)?;
    let stop = StopFlag::new();
    let mut responder = Responder::new(sink, cfg.timing.clone(), cfg.link.buffer_size, stop.clone());
    responder.idle().await.context("set actuator idle")?;

    let addr = cfg.link.bind_addr();
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("bind {}", addr))?;
    spawn_ctrl_c(stop);

    responder.run(listener).await
}

fn spawn_ctrl_c(stop: StopFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c: stopping at the next loop boundary");
            stop.raise();
        }
    });
}
