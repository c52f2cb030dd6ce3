// greenlink binary
// Runs the controller's polling loop against simulated hardware: pumps the
// arbiter once a second and schedules the periodic API exchanges.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use greenlink::api::{ApiClient, EnvironmentReading};
use greenlink::config::ControllerConfig;
use greenlink::session::SessionState;
use greenlink::sim::{SimHttpDriver, SimModem, SimProfile, SimStation};
use greenlink::transport::{
    CellularTransport, NetworkArbiter, Transport, TransportPreference, WifiTransport,
};

#[derive(Parser, Debug)]
#[command(
    name = "greenlink",
    about = "Greenhouse controller connectivity loop (simulated hardware)"
)]
struct Args {
    /// TOML config file; built-in simulation defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured transport preference.
    #[arg(long, value_enum)]
    prefer: Option<PreferenceArg>,

    /// Hardware simulation profile: reliable | flaky.
    #[arg(long, default_value = "reliable")]
    profile: String,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PreferenceArg {
    WifiOnly,
    CellularOnly,
    WifiPreferred,
    CellularPreferred,
}

impl From<PreferenceArg> for TransportPreference {
    fn from(arg: PreferenceArg) -> Self {
        match arg {
            PreferenceArg::WifiOnly => Self::WifiOnly,
            PreferenceArg::CellularOnly => Self::CellularOnly,
            PreferenceArg::WifiPreferred => Self::WifiPreferred,
            PreferenceArg::CellularPreferred => Self::CellularPreferred,
        }
    }
}

/// Defaults good enough to run against the simulator without a config file.
fn sim_defaults() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.wifi.ssid = "greenhouse".to_string();
    config.wifi.password = "changeme".to_string();
    config.wifi.attempt_timeout_ms = 2_000;
    config.cellular.apn = "sim.apn".to_string();
    config
}

fn sample_reading(greenhouse_id: u32) -> EnvironmentReading {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    EnvironmentReading {
        greenhouse_id,
        taken_at: chrono::Utc::now(),
        temperature_c: rng.gen_range(18.0..32.0),
        humidity_pct: rng.gen_range(40.0..90.0),
        light_lux: rng.gen_range(0.0..12_000.0),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match ControllerConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                error!(%err, "could not load config");
                std::process::exit(1);
            }
        },
        None => sim_defaults(),
    };
    if let Some(prefer) = args.prefer {
        config.preference = prefer.into();
    }

    let session = SessionState::shared();
    let profile = SimProfile::from_str_lossy(&args.profile);

    let wifi = WifiTransport::new(
        SimStation::new(0),
        SimHttpDriver::new(profile.connect_fail_prob),
        config.wifi.clone(),
        config.http.clone(),
        &config.auth_token,
    );
    let cellular = CellularTransport::new(
        SimModem::new(profile),
        config.cellular.clone(),
        config.http.clone(),
        &config.auth_token,
    )
    .with_session(session.clone());

    let mut net = NetworkArbiter::new(config.preference, Some(wifi), Some(cellular))
        .with_session(session.clone());
    let api = ApiClient::new(&config.api_base_url, config.greenhouse_id);

    info!(greenhouse = config.greenhouse_id, "starting controller loop");
    if !net.connect().await {
        warn!("initial connect failed; the loop will keep retrying");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        net.poll().await;
        tick += 1;

        // Busy rejections here are routine: one exchange at a time.
        if tick % 30 == 0 {
            if let Some(request) = api.post_readings(&[sample_reading(config.greenhouse_id)]) {
                if !net.start_request(request).await {
                    warn!("readings post not started");
                }
            }
        }
        if tick % 45 == 0 && !net.start_request(api.fetch_commands(session.clone())).await {
            warn!("commands fetch not started");
        }
        if tick % 300 == 0 {
            let request = api.fetch_time(|when| info!(%when, "rtc sync"));
            if !net.start_request(request).await {
                warn!("time fetch not started");
            }
        }

        if tick % 10 == 0 {
            info!(status = %net.status_string(), "link status");
        }
    }

    net.disconnect().await;
}
