use clap::{Parser, Subcommand};
use kasa_cloud::client::CloudClient;
use kasa_cloud::config::{Config, CredentialStore};
use kasa_cloud::services::poll;
use kasa_cloud::setup::{self, SetupForm};
use kasa_cloud::switch::{self, CloudSwitch, SwitchEntity};
use kasa_cloud::transport::UreqTransport;
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "kasa-cloud", version, about = "Control TP-Link Kasa smart plugs through the Kasa cloud")]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check credentials against the cloud and save them with a fresh token
    Setup {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// List the switches bound to the account
    List {
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Turn a switch on (by device id or alias)
    On { device: String },
    /// Turn a switch off (by device id or alias)
    Off { device: String },
    /// Refresh every switch on an interval and log state changes
    Poll {
        /// Override KASA_POLL_INTERVAL_SECS
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

fn client_for(cfg: &Config, email: &str, password: &str) -> CloudClient {
    CloudClient::with_transport(
        email,
        password,
        cfg.endpoint.as_str(),
        Box::new(UreqTransport::new(cfg.http_timeout)),
    )
}

fn run(cli: Cli) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (endpoint={}, credentials_file={}, poll_interval={}s, http_timeout={}s)",
        cfg.endpoint,
        cfg.credentials_file.display(),
        cfg.poll_interval.as_secs(),
        cfg.http_timeout.as_secs()
    );
    let store = CredentialStore::new(&cfg.credentials_file);

    if let Command::Setup { email, password } = &cli.command {
        let form = SetupForm {
            email: email.clone().or_else(|| cfg.email.clone()),
            password: password.clone().or_else(|| cfg.password.clone()),
        };
        setup::run(&form, &store, |e, p| client_for(&cfg, e, p))
            .map_err(|e| format!("Setup failed ({}): {}", e.form_key(), e))?;
        return Ok(());
    }

    // 2) Resolve credentials, keeping the record in sync so renewed tokens can be saved
    let stored = store.load()?;
    let credentials = cfg.resolve_credentials(stored.clone())?;
    let record_matches = stored
        .as_ref()
        .is_some_and(|s| s.email == credentials.email && s.password == credentials.password);
    if !record_matches {
        store.save(&credentials)?;
    }

    // 3) Restore the session; a missing or stale token triggers one login
    let client = client_for(&cfg, &credentials.email, &credentials.password).with_token(credentials.token.clone());
    if credentials.token.is_some() {
        info!("Restored stored token for {}", client.username());
    }
    let devices = switch::list_devices_with_relogin(&client, &store)
        .map_err(|e| format!("Listing devices failed: {}", e))?;
    info!("Discovered {} device(s)", devices.len());
    let mut switches: Vec<CloudSwitch<'_>> = devices.into_iter().map(|d| CloudSwitch::new(d, &store)).collect();

    // 4) Dispatch
    match cli.command {
        Command::Setup { .. } => Ok(()),
        Command::List { json } => {
            for s in &switches {
                if json {
                    let line = serde_json::to_string(s.device().info())
                        .map_err(|e| format!("serializing {} failed: {}", s.unique_id(), e))?;
                    println!("{}", line);
                } else {
                    print_human(s);
                }
            }
            Ok(())
        }
        Command::On { device } => set_switch(&mut switches, &device, true),
        Command::Off { device } => set_switch(&mut switches, &device, false),
        Command::Poll { interval_secs } => {
            let interval = interval_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(cfg.poll_interval);
            info!(
                "Starting poll loop: switches={}, interval={}s",
                switches.len(),
                interval.as_secs()
            );
            poll::run_loop(&mut switches, interval)
        }
    }
}

fn find_switch<'s, 'a>(switches: &'s mut [CloudSwitch<'a>], needle: &str) -> Option<&'s mut CloudSwitch<'a>> {
    let pos = switches
        .iter()
        .position(|s| s.unique_id() == needle)
        .or_else(|| switches.iter().position(|s| s.name().eq_ignore_ascii_case(needle)))?;
    switches.get_mut(pos)
}

fn set_switch(switches: &mut [CloudSwitch<'_>], needle: &str, on: bool) -> Result<(), String> {
    let target = find_switch(switches, needle).ok_or_else(|| format!("No device with id or alias {}", needle))?;
    let result = if on { target.turn_on() } else { target.turn_off() };
    result.map_err(|e| format!("Switching {} failed: {}", target.name(), e))?;
    info!("{} turned {}", target.name(), if on { "on" } else { "off" });
    print_human(target);
    Ok(())
}

fn print_human(s: &CloudSwitch<'_>) {
    let info = s.device().info();
    println!(
        "{}\t{}\t{}\t{}\t{}",
        info.device_id,
        pad(&info.alias, 18),
        pad(&info.model, 12),
        pad(&info.software_version, 12),
        if s.is_on() { "on" } else { "off" },
    );
}

fn pad(value: &str, padding: usize) -> String {
    let pad = " ".repeat(padding.saturating_sub(value.len()));
    format!("{}{}", value, pad)
}

fn load_env(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    // Values already in the process environment win over the file.
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        dotenvy::from_path(&path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
        return Ok(Some(LoadedEnvFile { path, explicit: true }));
    }

    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(LoadedEnvFile { path, explicit: false })),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(format!("failed to load .env: {}", e)),
    }
}

fn main() {
    let cli = Cli::parse();

    let loaded_env = match load_env(cli.env_file.clone()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "kasa-cloud {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
