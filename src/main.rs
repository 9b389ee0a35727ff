use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use plumber::{
    action::{PortActions, TraceAction},
    config::{ConfigType, EnvConfig},
    logger::init_tracing,
    message::Message,
    ports::PortHub,
    token::parse_parts,
    watcher::{watch_path, WatchedType},
    Plumber,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "plumber",
    about = "A Plan 9 style plumber: routes messages to ports by rule",
    version = "0.2.0"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the plumber with an interactive send loop
    Run(RunArgs),

    /// Parse a plumbing file and report problems
    Check { file: PathBuf },

    /// List the destination ports of a plumbing file
    Ports { file: PathBuf },

    /// Plumb one text fragment against a plumbing file
    Send(SendArgs),

    /// Emit the JSON schema of the wire message
    Schema,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Plumbing file (falls back to $HOME/lib/plumbing)
    #[arg(long, short = 'p', default_value = "")]
    rules: String,

    /// Optional log level override (e.g. error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write logs to this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Reload the plumbing file when it changes on disk
    #[arg(long, default_value_t = false)]
    watch: bool,

    /// Disable the isfile/isdir filesystem probes
    #[arg(long, default_value_t = false)]
    no_fs: bool,

    /// .env file merged into the rules environment
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Plumbing file
    #[arg(long, short = 'p')]
    rules: PathBuf,

    /// The text to plumb
    data: String,

    #[arg(long, default_value = "")]
    src: String,

    #[arg(long, default_value = "")]
    dst: String,

    #[arg(long, default_value = "")]
    wdir: String,
}

fn fallback_rules() -> String {
    match std::env::var("HOME") {
        Ok(home) => format!("{home}/lib/plumbing"),
        Err(_) => String::new(),
    }
}

/// Reloads the plumber when the plumbing file changes.
struct RulesWatcher {
    path: PathBuf,
    plumber: Arc<Plumber>,
    hub: Arc<PortHub>,
    seed: HashMap<String, String>,
}

#[async_trait]
impl WatchedType for RulesWatcher {
    fn is_relevant(&self, path: &Path) -> bool {
        path.file_name() == self.path.file_name()
    }

    async fn on_modify(&self, path: &Path) -> Result<()> {
        let source = tokio::fs::read_to_string(path).await?;
        match self.plumber.load_rules(&source, Some(self.seed.clone())) {
            Ok(()) => {
                info!("reloaded plumbing rules from {}", path.display());
                publish_ports(&self.hub, &self.plumber);
            }
            Err(e) => warn!("reload rejected, keeping old rules: {e}"),
        }
        Ok(())
    }
}

// make every port from the rules visible on the hub
fn publish_ports(hub: &Arc<PortHub>, plumber: &Arc<Plumber>) {
    for name in plumber.ports() {
        hub.register(&name);
    }
}

// one logging subscriber per port, spawned once
fn watch_ports(hub: &Arc<PortHub>, plumber: &Arc<Plumber>, seen: &mut HashSet<String>) {
    for name in plumber.ports() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let hub = hub.clone();
        tokio::spawn(async move {
            let Some(mut rx) = hub.subscribe(&name) else {
                return;
            };
            while let Ok(msg) = rx.recv().await {
                info!(port = %name, data = %msg.data, "delivered");
            }
        });
    }
}

async fn run(args: RunArgs) -> Result<()> {
    init_tracing(&args.log_level, args.log_dir.clone())?;

    let hub = PortHub::new();
    let plumber = Arc::new(
        Plumber::new(Arc::new(PortActions::new(hub.clone()))).with_fs(!args.no_fs),
    );

    // rules can refer to $HOME and friends
    let seed = EnvConfig::new(args.env_file.clone()).as_map();
    plumber.load_rules_file(&args.rules, &fallback_rules(), Some(seed.clone()))?;
    publish_ports(&hub, &plumber);

    let mut seen = HashSet::new();
    watch_ports(&hub, &plumber, &mut seen);

    if args.watch {
        let path = if args.rules.is_empty() {
            PathBuf::from(fallback_rules())
        } else {
            PathBuf::from(&args.rules)
        };
        let watcher = Arc::new(RulesWatcher {
            path: path.clone(),
            plumber: plumber.clone(),
            hub: hub.clone(),
            seed: seed.clone(),
        });
        // the task keeps running detached for the life of the process
        let _ = watch_path(path, watcher).await?;
    }

    info!(ports = ?plumber.ports(), "plumber is up, enter text to plumb");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parts = parse_parts(&line);
        match parts.first().map(String::as_str) {
            Some(".reload") => {
                if let Err(e) = plumber.load_rules_file(
                    &args.rules,
                    &fallback_rules(),
                    Some(seed.clone()),
                ) {
                    error!("reload failed: {e}");
                } else {
                    publish_ports(&hub, &plumber);
                    watch_ports(&hub, &plumber, &mut seen);
                }
            }
            Some(".load") => match parts.get(1) {
                Some(file) => {
                    if let Err(e) = plumber.load_rules_file(file, "", Some(seed.clone())) {
                        error!("load failed: {e}");
                    } else {
                        publish_ports(&hub, &plumber);
                        watch_ports(&hub, &plumber, &mut seen);
                    }
                }
                None => error!(".load needs a file name"),
            },
            Some(".show") => {
                println!("{}", plumber.rules_text());
            }
            Some(_) => {
                info!("<== {line}");
                match plumber.eval(&line, "", "", "") {
                    Ok(true) => {}
                    Ok(false) => warn!("no rule matched"),
                    Err(e) => error!("evaluation failed: {e}"),
                }
            }
            None => {}
        }
    }
    Ok(())
}

fn check(file: &Path) -> Result<()> {
    let plumber = Plumber::new(Arc::new(TraceAction));
    plumber.load_rules_file(&file.to_string_lossy(), "", None)?;
    println!(
        "ok: {} port(s), env {:?}",
        plumber.ports().len(),
        plumber.env().keys().collect::<Vec<_>>()
    );
    Ok(())
}

fn ports(file: &Path) -> Result<()> {
    let plumber = Plumber::new(Arc::new(TraceAction));
    plumber.load_rules_file(&file.to_string_lossy(), "", None)?;
    for name in plumber.ports() {
        println!("{name}");
    }
    Ok(())
}

fn send(args: &SendArgs) -> Result<()> {
    let plumber = Plumber::new(Arc::new(TraceAction));
    plumber.load_rules_file(&args.rules.to_string_lossy(), "", None)?;
    let msg = Message::new(&args.src, &args.dst, &args.wdir, "", &args.data);
    match plumber.evaluate(&msg)? {
        Some((out, idx)) => println!("matched ruleset {idx}:\n{out}"),
        None => println!("no rule matched"),
    }
    Ok(())
}

fn schema() -> Result<()> {
    let schema = schemars::schema_for!(Message);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        other => {
            init_tracing("info", None).ok();
            match other {
                Commands::Run(_) => unreachable!(),
                Commands::Check { file } => check(&file),
                Commands::Ports { file } => ports(&file),
                Commands::Send(args) => send(&args),
                Commands::Schema => schema(),
            }
        }
    }
}
