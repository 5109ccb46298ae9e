mod config;
mod sky;
mod telescope;
mod transport;
mod web;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::sky::Site;
use crate::telescope::{
    wait_for_outcome, wait_until_connected, SessionError, SessionOptions, TelescopeSession,
};
use crate::transport::{CommandTransport, HttpTransport, SimulatedTransport};

const SIMULATED_LATENCY: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "scope-o-mat")]
#[command(about = "Remote telescope control bridge")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "scope-o-mat.yaml")]
    config: String,
    /// Telescope host, overrides the configuration
    #[arg(long)]
    host: Option<String>,
    /// Telescope port, overrides the configuration
    #[arg(long)]
    port: Option<u32>,
    /// Talk to a simulated controller instead of the network
    #[arg(long)]
    simulate: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP control API
    Serve,
    /// Print session status for a while
    Monitor {
        #[arg(long = "for", default_value = "10s")]
        duration: humantime::Duration,
    },
    /// Re-acquire control of the telescope
    TakeControl,
    /// Slew to equatorial coordinates (degrees)
    Goto {
        #[arg(long, allow_hyphen_values = true)]
        ra: f64,
        #[arg(long, allow_hyphen_values = true)]
        dec: f64,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Start imaging a target
    Observe {
        #[arg(long, allow_hyphen_values = true)]
        ra: f64,
        #[arg(long, allow_hyphen_values = true)]
        dec: f64,
        #[arg(long)]
        name: String,
        /// Exposure in seconds
        #[arg(long)]
        exposure: Option<f64>,
        #[arg(long)]
        gain: Option<f64>,
    },
    /// Stop the running observation
    Stop,
    /// Park the mount
    Park,
    /// Run the focus routine
    Focus,
    /// Open the arm for maintenance
    OpenArm,
    /// Auto-align, defaulting to the configured site
    AutoInit {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading {}: {}", cli.config, e);
            return ExitCode::FAILURE;
        }
    };
    let site = match config.site() {
        Ok(site) => site,
        Err(e) => {
            eprintln!("Error loading {}: {}", cli.config, e);
            return ExitCode::FAILURE;
        }
    };

    let session = match build_session(&config, site, cli.simulate) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error creating session: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Commands::Serve = cli.command {
        return match web::run_server(config, site, session).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Server error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let Some(host) = cli.host.clone().or_else(|| config.telescope.host.clone()) else {
        eprintln!("No telescope host: pass --host or set telescope.host");
        return ExitCode::FAILURE;
    };
    let port = cli.port.unwrap_or(u32::from(config.telescope.port));

    let mut events = session.subscribe();
    if let Err(e) = session.connect(&host, port) {
        eprintln!("Cannot connect: {}", e);
        return ExitCode::FAILURE;
    }
    let handshake_timeout = config.telescope.command_timeout + Duration::from_secs(1);
    match tokio::time::timeout(handshake_timeout, wait_until_connected(&mut events)).await {
        Ok(Ok(())) => println!("Connected to {}:{}", host, port),
        Ok(Err(e)) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
        Err(_) => {
            eprintln!("Timed out connecting to {}:{}", host, port);
            session.disconnect();
            return ExitCode::FAILURE;
        }
    }

    let code = match cli.command {
        Commands::Monitor { duration } => monitor(&session, &mut events, duration.into()).await,
        command => run_command(&session, &mut events, &config, site, command).await,
    };
    session.disconnect();
    code
}

fn build_session(
    config: &Config,
    site: Option<Site>,
    simulate: bool,
) -> Result<TelescopeSession, transport::TransportError> {
    let transport: Arc<dyn CommandTransport> = if simulate {
        log::info!("Using simulated telescope controller");
        Arc::new(SimulatedTransport::new(SIMULATED_LATENCY))
    } else {
        Arc::new(HttpTransport::new(config.telescope.command_timeout)?)
    };

    let site = site.unwrap_or_else(|| {
        log::warn!("No site configured; horizontal coordinates assume 0, 0");
        Site::default()
    });

    Ok(TelescopeSession::new(
        transport,
        Arc::new(site),
        SessionOptions {
            poll_interval: config.telescope.poll_interval,
        },
    ))
}

async fn run_command(
    session: &TelescopeSession,
    events: &mut tokio::sync::broadcast::Receiver<telescope::Notification>,
    config: &Config,
    site: Option<Site>,
    command: Commands,
) -> ExitCode {
    let submitted = match command {
        Commands::TakeControl => session.take_control(),
        Commands::Goto { ra, dec, name } => session.goto_coordinates(ra, dec, &name),
        Commands::Observe {
            ra,
            dec,
            name,
            exposure,
            gain,
        } => session.start_observation(
            ra,
            dec,
            &name,
            exposure.unwrap_or(config.observation.exposure_s),
            gain.unwrap_or(config.observation.gain),
        ),
        Commands::Stop => session.stop_observation(),
        Commands::Park => session.park(),
        Commands::Focus => session.focus(),
        Commands::OpenArm => session.open_arm(),
        Commands::AutoInit { lat, lon } => {
            match (lat.or(site.map(|s| s.latitude_deg)), lon.or(site.map(|s| s.longitude_deg))) {
                (Some(lat), Some(lon)) => session.auto_initialize(lat, lon),
                _ => Err(SessionError::InvalidArgument(
                    "pass --lat/--lon or configure a site".into(),
                )),
            }
        }
        Commands::Serve | Commands::Monitor { .. } => return ExitCode::FAILURE,
    };

    if let Err(e) = submitted {
        eprintln!("Not submitted: {}", e);
        return ExitCode::FAILURE;
    }

    let wait = config.telescope.command_timeout + Duration::from_secs(1);
    match tokio::time::timeout(wait, wait_for_outcome(events)).await {
        Ok(Ok(endpoint)) => {
            println!("{} acknowledged, status: {}", endpoint, session.status().label);
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
        Err(_) => {
            eprintln!("No reply from telescope");
            ExitCode::FAILURE
        }
    }
}

async fn monitor(
    session: &TelescopeSession,
    events: &mut tokio::sync::broadcast::Receiver<telescope::Notification>,
    duration: Duration,
) -> ExitCode {
    println!("Status: {} ({})", session.status().label, session.state());
    println!("{}", telescope::Notification::PoseUpdated(session.pose()));
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return ExitCode::SUCCESS,
            received = events.recv() => match received {
                Ok(notification) => println!("{}", notification),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return ExitCode::FAILURE,
            },
        }
    }
}
