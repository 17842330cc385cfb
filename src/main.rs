//! Field punch - attendance punches for field sales staff
//!
//! Resolves the device location to a place name, gates punch submission on
//! entered shop/amount and a resolved location, and keeps the employee
//! sign-in overlay in sync with the persisted identity.
//!
//! Module structure:
//! - `domain/` - Core types (Coordinates, PlaceName, PunchEvent, Party)
//! - `io/` - External interfaces (location provider, geocoder, backend, store)
//! - `services/` - Business logic (ReverseGeocoder, LocationResolver, PunchSession, SessionGate)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use fieldpunch::domain::party::{shop_suggestions, stock_items, sundry_debtors, Party, DEFAULT_SUGGESTION_LIMIT};
use fieldpunch::infra::{Config, Metrics};
use fieldpunch::io::geo::GeoProvider;
use fieldpunch::io::{AccountingSource, BackendClient, FileStore, ReplayGeoProvider, WatchOptions};
use fieldpunch::services::{
    IdentityStore, LocationResolver, PunchSession, ReverseGeocoder, SessionGate, SignInFlow, ToggleOutcome,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Field punch - location-aware attendance client
#[derive(Parser, Debug)]
#[command(name = "fieldpunch", version, about)]
struct Args {
    /// Path to TOML configuration file [default: $CONFIG_FILE, else config/dev.toml]
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

const HELP: &str = "commands: signin <name> <phone> | signout | reauth | shop <name> | amount <n> | \
pick <query> | stock <query> | companies | toggle | submit | status | dismiss | help | quit";

struct App {
    identity: Arc<IdentityStore>,
    gate: Arc<SessionGate>,
    resolver: LocationResolver,
    session: PunchSession,
    sign_in: SignInFlow,
    backend: Arc<BackendClient>,
    company: Option<String>,
    parties: Vec<Party>,
}

impl App {
    /// Handle one command line. Returns false to quit.
    async fn handle(&mut self, line: &str) -> bool {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "" => {}
            "signin" => match rest.rsplit_once(char::is_whitespace) {
                Some((name, phone)) => match self.sign_in.sign_in(name, phone).await {
                    Ok(identity) => println!("signed in as {}", identity.employee_name),
                    Err(e) => println!("{e}"),
                },
                None => println!("usage: signin <name> <phone>"),
            },
            "signout" => match self.sign_in.sign_out() {
                Ok(()) => println!("signed out"),
                Err(e) => println!("{e}"),
            },
            "reauth" => self.identity.request_reauth(),
            "shop" => self.session.set_shop(rest),
            "amount" => self.session.set_amount(rest),
            "pick" => {
                let hits = shop_suggestions(&self.parties, rest, DEFAULT_SUGGESTION_LIMIT);
                match hits.first() {
                    Some(first) => {
                        self.session.pick_party(first);
                        for party in &hits {
                            println!("  {}", party.receivable());
                        }
                        println!("picked {}", first.name);
                    }
                    None => println!("no matching party"),
                }
            }
            "stock" => self.show_stock(rest).await,
            "companies" => match self.backend.company_names().await {
                Ok(names) => names.iter().for_each(|n| println!("  {n}")),
                Err(e) => println!("{e}"),
            },
            "toggle" => match self.session.toggle() {
                ToggleOutcome::PunchedIn { at } => println!("on duty since {}", at.format("%H:%M:%S")),
                ToggleOutcome::PunchedOut(event) => println!("off duty (punch {})", event.id),
                ToggleOutcome::SignInRequired => println!("sign in first"),
            },
            "submit" => match self.session.submit() {
                Ok(event) => println!("punch {} sent from {}", event.id, event.place_name),
                Err(e) => println!("{e}"),
            },
            "status" => self.print_status(),
            "dismiss" => self.session.dismiss_notice(),
            "help" => println!("{HELP}"),
            "quit" | "exit" => return false,
            other => println!("unknown command: {other}\n{HELP}"),
        }
        true
    }

    async fn show_stock(&self, query: &str) {
        let Some(company) = self.company.as_deref() else {
            println!("no company configured");
            return;
        };
        match self.backend.stocks(company).await {
            Ok(rows) => stock_items(&rows, query)
                .iter()
                .for_each(|item| println!("  {} ({})", item.name, item.quantity)),
            Err(e) => println!("{e}"),
        }
    }

    fn print_status(&self) {
        let location = self.session.location();
        println!("overlay:  {}", self.gate.overlay().as_str());
        println!(
            "employee: {}",
            self.identity.current().map(|i| i.employee_name).unwrap_or_else(|| "-".into())
        );
        println!("duty:     {}", self.session.status().as_str());
        println!("shop:     {}", self.session.shop());
        println!("amount:   {}", self.session.amount());
        println!("place:    {} ({})", location.place_name(), location.state.as_str());
        if let Some(coords) = location.coordinates {
            println!("coords:   {}", coords.to_fixed5());
        }
        if self.session.is_submitting() {
            println!("submitting...");
        }
        if let Some(notice) = self.session.notice() {
            println!("notice:   {}", notice.message);
        }
        if let Some(last) = self.session.last_punch() {
            println!("last:     {} {} at {} {} ({})", last.shop_name, last.amount, last.date, last.time, last.place);
        }
    }
}

fn init_logging(json: bool) {
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn location_provider(config: &Config) -> anyhow::Result<Arc<dyn GeoProvider>> {
    match config.replay_file() {
        Some(path) => Ok(Arc::new(ReplayGeoProvider::from_file(path)?)),
        None => {
            warn!("no_replay_file_configured");
            Ok(Arc::new(ReplayGeoProvider::new(Vec::new())))
        }
    }
}

/// Configured company, else the first one the backend lists
async fn select_company(backend: &BackendClient, config: &Config) -> Option<String> {
    if let Some(company) = config.company() {
        return Some(company.to_string());
    }
    match backend.company_names().await {
        Ok(names) => {
            let first = names.into_iter().next();
            info!(company = ?first, "company_selected");
            first
        }
        Err(e) => {
            warn!(error = %e, "company_list_failed");
            None
        }
    }
}

async fn load_parties(backend: &BackendClient, company: Option<&str>) -> Vec<Party> {
    let Some(company) = company else {
        return Vec::new();
    };
    match backend.parties(company).await {
        Ok(rows) => {
            let parties = sundry_debtors(&rows);
            info!(company = %company, rows = %rows.len(), parties = %parties.len(), "parties_loaded");
            parties
        }
        Err(e) => {
            warn!(company = %company, error = %e, "parties_load_failed");
            Vec::new()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "fieldpunch starting");

    let config = Config::load(args.config.as_deref());
    info!(
        config_file = %config.config_file(),
        geocode_base_url = %config.geocode_base_url(),
        backend_url = %config.backend_url(),
        replay_file = ?config.replay_file(),
        company = ?config.company(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let store = Arc::new(
        FileStore::open(config.store_file())
            .with_context(|| format!("failed to open store {}", config.store_file()))?,
    );
    let identity = Arc::new(IdentityStore::open(store.clone()));

    let gate = Arc::new(SessionGate::new(identity.clone()));
    let gate_task = tokio::spawn(gate.clone().run(shutdown_rx.clone()));

    let provider = location_provider(&config)?;
    let geocoder = Arc::new(
        ReverseGeocoder::from_config(&config, provider.clone(), metrics.clone())
            .context("failed to build reverse geocoder")?,
    );
    let resolver =
        LocationResolver::new(provider, geocoder, WatchOptions::from_config(&config), metrics.clone());
    resolver.mount();

    let backend = Arc::new(BackendClient::from_config(&config).context("failed to build backend client")?);
    let company = select_company(&backend, &config).await;
    let parties = load_parties(&backend, company.as_deref()).await;

    let session = PunchSession::new(
        identity.clone(),
        resolver.subscribe(),
        backend.clone(),
        store,
        metrics.clone(),
        company.clone(),
    );
    let sign_in = SignInFlow::new(backend.clone(), identity.clone());

    // Metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut metrics_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = metrics_shutdown.changed() => break,
                _ = interval.tick() => metrics_clone.report().log(),
            }
        }
    });

    // Handle shutdown on Ctrl+C
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        signal_tx.send_replace(true);
    });

    let mut app = App { identity, gate, resolver, session, sign_in, backend, company, parties };
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown = shutdown_rx;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !app.handle(&line).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin_read_failed");
                    break;
                }
            }
        }
    }

    shutdown_tx.send_replace(true);
    app.resolver.teardown();
    app.resolver.wait_stopped().await;
    app.session.wait_idle().await;
    if let Err(e) = gate_task.await {
        warn!(error = %e, "session_gate_join_failed");
    }
    metrics.report().log();

    info!("fieldpunch shutdown complete");
    Ok(())
}
