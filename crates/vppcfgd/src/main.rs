//! vppcfgd
//!
//! Keeps the VPP startup configuration in sync with the `PLATFORM` table.

use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};

use vppcfgd::config::{ConfigMgr, OutputPaths, PluginOverrides, Template};
use vppcfgd::constants::{Constants, CONSTANTS_PATH};
use vppcfgd::directory::{Directory, SlotId};
use vppcfgd::logging::{self, LogFormat};
use vppcfgd::manager::{Manager, VppCfgHandler};
use vppcfgd::ports::{load_ports, IpLinkProbe, PortsEnv};
use vppcfgd::runner::Runner;
use vppcfgd::settings::{Settings, TABLE_DB_DIR, VPP_TEMPLATE_PATH};
use vppcfgd::shutdown::{install_signal_handler, ShutdownToken};
use vppcfgd::transport::FileTableSource;
use vppcfgd::Result;

#[derive(Parser)]
#[command(name = "vppcfgd")]
#[command(about = "VPP platform configuration daemon", version)]
struct Cli {
    /// Root directory of the file-backed tables
    #[arg(long, global = true, env = "VPPCFGD_DB_DIR", default_value = TABLE_DB_DIR)]
    db_dir: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the PLATFORM table and rewrite the VPP startup files (default)
    Run(RunArgs),

    /// Write the PLATFORM|vpp entry from VPP_DPDK_PORTS
    LoadPorts,
}

#[derive(clap::Args)]
struct RunArgs {
    /// VPP configuration template
    #[arg(long, default_value = VPP_TEMPLATE_PATH)]
    template: PathBuf,

    /// Platform constants file
    #[arg(long, default_value = CONSTANTS_PATH)]
    constants: PathBuf,

    /// Write the three startup files into this directory instead of their
    /// standard locations
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Poll timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_timeout_ms: u64,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            template: PathBuf::from(VPP_TEMPLATE_PATH),
            constants: PathBuf::from(CONSTANTS_PATH),
            output_dir: None,
            poll_timeout_ms: 1000,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let result = match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_daemon(settings_from(args, cli.db_dir)),
        Commands::LoadPorts => run_load_ports(cli.db_dir),
    };

    if let Err(e) = result {
        error!("critical: {}", e);
        process::exit(1);
    }
}

fn settings_from(args: RunArgs, db_dir: PathBuf) -> Settings {
    Settings {
        template: args.template,
        constants: args.constants,
        outputs: args
            .output_dir
            .map(OutputPaths::in_dir)
            .unwrap_or_default(),
        db_dir,
        poll_timeout: Duration::from_millis(args.poll_timeout_ms),
    }
}

fn run_daemon(settings: Settings) -> Result<()> {
    let constants = Constants::load(&settings.constants)?;
    info!("Constant groups: {}", constants.groups().join(", "));
    let template = Template::load(&settings.template)?;
    let overrides = PluginOverrides::from_env();
    info!("Plugin overrides: {:?}", overrides);

    let shutdown = ShutdownToken::new();
    install_signal_handler(&shutdown)?;

    let directory = Arc::new(Directory::new());
    let cfg_mgr = Arc::new(Mutex::new(ConfigMgr::new(
        template,
        settings.outputs.clone(),
        overrides,
    )));

    let source = FileTableSource::new(&settings.db_dir);
    let mut runner = Runner::new(Arc::clone(&cfg_mgr), Box::new(source), shutdown)
        .with_poll_timeout(settings.poll_timeout);

    for db in ["CONFIG_DB", "STATE_DB"] {
        let manager = Manager::new(
            "VppCfgMgr",
            Arc::clone(&directory),
            vec![],
            SlotId::new(db, "PLATFORM"),
            VppCfgHandler::new(Arc::clone(&cfg_mgr)),
        );
        runner.add_manager(manager)?;
    }

    info!("vppcfgd started, watching {}", settings.db_dir.display());
    runner.run()?;
    info!("vppcfgd exiting");
    Ok(())
}

fn run_load_ports(db_dir: PathBuf) -> Result<()> {
    let env = PortsEnv::from_env();
    load_ports(&env, &db_dir, &IpLinkProbe)?;
    Ok(())
}
