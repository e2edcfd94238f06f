use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use mjpeg_proxy::service::setup_tracing;
use mjpeg_proxy::sink::{Fanout, LatestFrame, Passthrough, SnapshotFile, Transformed};
use mjpeg_proxy::{AppResult, ProxyConfig, StopFlag, StreamClient};
use tokio::{runtime, signal};
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// camera host name or address, overrides stream.hostname
    #[arg(short = 'H', long)]
    pub host: Option<String>,
    /// camera port, overrides stream.port
    #[arg(short, long)]
    pub port: Option<u16>,
    /// request path, overrides stream.path
    #[arg(short = 'u', long)]
    pub path: Option<String>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    #[arg(long)]
    pub quality: Option<u8>,
    #[arg(long)]
    pub hardware_accel: bool,
    /// directory for rolling log files
    #[arg(long, default_value = "logs")]
    pub log_dir: String,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// print the effective configuration and exit
    PrintConfig,
}

impl CommandLine {
    fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    fn apply_overrides(&self, config: &mut ProxyConfig) {
        if let Some(host) = &self.host {
            config.stream.hostname = host.clone();
        }
        if let Some(port) = self.port {
            config.stream.port = port;
        }
        if let Some(path) = &self.path {
            config.stream.path = path.clone();
        }
        if let Some(width) = self.width {
            config.rescale.width = width;
        }
        if let Some(height) = self.height {
            config.rescale.height = height;
        }
        if let Some(quality) = self.quality {
            config.rescale.quality = quality;
        }
        if self.hardware_accel {
            config.rescale.hardware_accel = true;
        }
    }
}

fn main() -> AppResult<()> {
    dotenv().ok();
    let commandline: CommandLine = CommandLine::parse();

    // config file is optional when the stream is given on the command line
    let mut config = match &commandline.conf {
        Some(path) => ProxyConfig::set_up_config(PathBuf::from(path))?,
        None => ProxyConfig::default(),
    };
    commandline.apply_overrides(&mut config);

    if matches!(commandline.command, Some(Command::PrintConfig)) {
        println!("{:#?}", config);
        return Ok(());
    }
    config.validate()?;

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let _otel_guard = rt.block_on(setup_tracing(
        &commandline.log_dir,
        commandline.log_level(),
        config.telemetry.otlp,
    ))?;

    info!(
        "streaming http://{}:{}{}",
        config.stream.hostname, config.stream.port, config.stream.path
    );

    let latest = LatestFrame::new();
    let mut fanout = Fanout::new().with(latest.clone());
    if let Some(path) = &config.output.snapshot_path {
        info!("writing latest frame to {}", path);
        fanout = fanout.with(SnapshotFile::new(path));
    }

    let stop = StopFlag::new();
    let ctrl_c_stop = stop.clone();
    rt.spawn(async move {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", err);
            return;
        }
        info!("get shutdown signal");
        ctrl_c_stop.stop();
    });

    let result = if config.rescale.is_enabled() {
        let rescale = &config.rescale;
        info!(
            "rescale {}x{} quality {} hardware {}",
            rescale.width, rescale.height, rescale.quality, rescale.hardware_accel
        );
        warn!("no rescale backend is linked into this build, frames are published unchanged");
        run(&rt, &config, Transformed::new(Passthrough, fanout), stop)
    } else {
        run(&rt, &config, fanout, stop)
    };

    if let Some(snapshot) = latest.snapshot() {
        info!(
            "last frame #{} had {} bytes",
            snapshot.sequence,
            snapshot.data.len()
        );
    }
    result
}

fn run<S>(rt: &runtime::Runtime, config: &ProxyConfig, sink: S, stop: StopFlag) -> AppResult<()>
where
    S: mjpeg_proxy::FrameSink,
{
    let mut client = StreamClient::new(config, sink, stop)?;
    let result = rt.block_on(client.run());
    client.close();
    result
}
