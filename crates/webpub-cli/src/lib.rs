use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use webpub_config::{Config, ConfigError, LoadOptions};
use webpub_core::{
    AddRequest, ConnectionTarget, ExitCode, Outcome, Publication, PublishError, Publisher,
    RemoveOptions,
};

/// Entry point for CLI execution. Returns the desired exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut options = LoadOptions::default();
    if let Some(path) = cli.config {
        options = options.with_override_path(path);
    }
    let config = Config::load(options)?;
    if let Some(origin) = config.origin() {
        debug!(path = %origin.display(), "configuration loaded");
    }
    let publisher = Publisher::new(config)?;

    match cli.command {
        Command::Add(args) => handle_add(&publisher, args),
        Command::AddModule(args) => handle_add_module(&publisher, args),
        Command::Check => handle_check(&publisher),
        Command::Get { name } => handle_get(&publisher, &name),
        Command::HasModule => handle_has_module(&publisher),
        Command::List { json } => handle_list(&publisher, json),
        Command::Remove(args) => handle_remove(&publisher, args),
        Command::SetUrl(args) => handle_set_url(&publisher, args),
    }
}

/// Maps an error returned by [`run`] to the process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(err) = err.downcast_ref::<PublishError>() {
        return err.exit_code() as i32;
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return ExitCode::InvalidConfig as i32;
    }
    ExitCode::Io as i32
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn handle_add(publisher: &Publisher, args: AddArgs) -> Result<i32> {
    let AddArgs {
        infobase,
        name,
        url,
        file,
        server,
        force,
        dry_run,
    } = args;

    let outcome = publisher.add(AddRequest {
        infobase,
        name,
        url,
        file,
        server,
        force,
        dry_run,
    })?;

    if dry_run {
        emit_diff(&outcome);
    } else {
        println!(
            "published {} at {}",
            outcome.name.as_deref().unwrap_or_default(),
            outcome.url.as_deref().unwrap_or_default()
        );
    }
    Ok(0)
}

fn handle_add_module(publisher: &Publisher, args: DryRunArgs) -> Result<i32> {
    let outcome = publisher.add_module(args.dry_run)?;
    if args.dry_run {
        emit_diff(&outcome);
    } else if outcome.changed {
        println!("module enabled");
    } else {
        println!("module already enabled");
    }
    Ok(0)
}

fn handle_check(publisher: &Publisher) -> Result<i32> {
    let report = publisher.check();
    for item in &report.items {
        let status = if item.ok { "ok" } else { "FAIL" };
        println!("{status:<4} {}: {}", item.name, item.detail);
    }
    Ok(if report.is_ok() { 0 } else { 1 })
}

fn handle_get(publisher: &Publisher, name: &str) -> Result<i32> {
    let publication = publisher.get(name)?;
    emit(&serde_json::to_string_pretty(&publication)?);
    Ok(0)
}

fn handle_has_module(publisher: &Publisher) -> Result<i32> {
    println!("{}", publisher.has_module()?);
    Ok(0)
}

fn handle_list(publisher: &Publisher, json: bool) -> Result<i32> {
    let publications = publisher.list()?;
    if json {
        emit(&serde_json::to_string_pretty(&publications)?);
    } else {
        for publication in &publications {
            println!("{}", describe(publication));
        }
    }
    Ok(0)
}

fn handle_remove(publisher: &Publisher, args: RemoveArgs) -> Result<i32> {
    let options = RemoveOptions {
        purge_directory: args.purge_dir,
        force: args.force,
        dry_run: args.dry_run,
    };
    let outcome = publisher.remove(&args.name, options)?;
    if args.dry_run {
        emit_diff(&outcome);
    } else {
        println!("removed {}", args.name);
    }
    Ok(0)
}

fn handle_set_url(publisher: &Publisher, args: SetUrlArgs) -> Result<i32> {
    let outcome = publisher.set_url(&args.name, &args.url, args.dry_run)?;
    if args.dry_run {
        emit_diff(&outcome);
    } else if outcome.changed {
        println!(
            "{} moved to {}",
            args.name,
            outcome.url.as_deref().unwrap_or_default()
        );
    } else {
        println!("{} unchanged", args.name);
    }
    Ok(0)
}

fn describe(publication: &Publication) -> String {
    let target = match &publication.target {
        ConnectionTarget::Server {
            infobase,
            server: Some(server),
        } => format!("server {server}/{infobase}"),
        ConnectionTarget::Server { infobase, .. } => format!("server {infobase}"),
        ConnectionTarget::File { path } => format!("file {}", path.display()),
    };
    format!("{}\t{}\t{}", publication.name, publication.url, target)
}

fn emit_diff(outcome: &Outcome) {
    match &outcome.diff {
        Some(diff) => emit(diff),
        None => println!("no changes to server config"),
    }
}

fn emit(content: &str) {
    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
}

#[derive(Parser)]
#[command(
    name = "webpub1c",
    author,
    version,
    about = "Manage 1C:Enterprise web publications in Apache",
    propagate_version = true
)]
struct Cli {
    /// Configuration file overriding ./webpub1c.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish an infobase
    Add(AddArgs),
    /// Enable the 1C web-service module in the server config
    AddModule(DryRunArgs),
    /// Verify paths, server config and module setup
    Check,
    /// Show one publication as JSON
    Get { name: String },
    /// Report whether the web-service module is enabled
    HasModule,
    /// List publications
    List {
        #[arg(long)]
        json: bool,
    },
    /// Unpublish an infobase
    Remove(RemoveArgs),
    /// Change the URL of a publication
    SetUrl(SetUrlArgs),
}

#[derive(Args)]
struct AddArgs {
    /// Infobase name; the publication name is derived from it unless --name is given
    infobase: String,
    #[arg(long)]
    name: Option<String>,
    /// URL segment under the url base
    #[arg(long)]
    url: Option<String>,
    /// Publish a file infobase located at PATH
    #[arg(long, value_name = "PATH", conflicts_with = "server")]
    file: Option<PathBuf>,
    /// Server hosting the infobase, overriding descriptor.server_addr
    #[arg(long, value_name = "HOST")]
    server: Option<String>,
    /// Replace an existing publication and overwrite leftover files
    #[arg(long)]
    force: bool,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct DryRunArgs {
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct RemoveArgs {
    name: String,
    /// Also delete the publication directory
    #[arg(long)]
    purge_dir: bool,
    /// With --purge-dir, delete the directory even when it is not empty
    #[arg(long)]
    force: bool,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct SetUrlArgs {
    name: String,
    url: String,
    #[arg(long)]
    dry_run: bool,
}
