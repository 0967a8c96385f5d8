//! schematic-layout-mcp: connectivity-preserving schematic auto-layout over MCP.
//!
//! stdout carries protocol traffic, so every diagnostic goes to stderr.

use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use schematic_layout_mcp::config::{self, Config, LogLevel};
use schematic_layout_mcp::mcp::{McpServer, ServerSettings};

/// MCP server that lets AI assistants build schematics and rearrange them
/// without breaking a single net.
#[derive(Parser, Debug)]
#[command(name = "schematic-layout-mcp", author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ~/.schematic-layout-mcp/config.json if present)
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// More output: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    /// Flags win over the configured level.
    fn log_level(&self, configured: LogLevel) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => configured.into(),
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn init_tracing(level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// GPLv3 section 5d notice for interactive use.
fn print_notice() {
    eprintln!(
        "schematic-layout-mcp {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!();
}

fn settings_from(cfg: Config) -> ServerSettings {
    let allowed_paths = if cfg.allowed_paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        cfg.allowed_paths
    };
    ServerSettings {
        allowed_paths,
        layout: cfg.layout,
        backup_on_write: cfg.files.backup_on_write,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            let mut cause = e.source();
            while let Some(inner) = cause {
                eprintln!("  caused by: {inner}");
                cause = inner.source();
            }
            return ExitCode::FAILURE;
        }
    };

    init_tracing(args.log_level(cfg.logging.level));
    print_notice();

    let settings = settings_from(cfg);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        allowed_paths = ?settings.allowed_paths,
        backup_on_write = settings.backup_on_write,
        strategy = ?settings.layout.strategy,
        "starting server"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let mut server = McpServer::new(settings);
    match runtime.block_on(server.run()) {
        Ok(()) => {
            info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}
