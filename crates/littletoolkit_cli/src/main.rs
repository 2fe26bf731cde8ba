//! LittleToolkit command-line host.
//!
//! # Responsibility
//! - Drive the core extension engine from a terminal: check descriptors,
//!   install them onto a host surface, list the plugin store.
//! - Map engine failures to a non-zero exit code.

use clap::{Parser, Subcommand};
use littletoolkit_core::{
    default_log_level, init_logging, init_stderr_logging, ExtensionDescriptor, ExtensionManager,
    HostConfig, InstallError, InstallOutcome, PluginCatalog, SurfaceItem,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

const REPORT_WAIT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "littletoolkit", version, about = "LittleToolkit extension host")]
struct Cli {
    /// Log level: trace|debug|info|warn|error.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files. Logs go to stderr when unset.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and validate a descriptor without evaluating its code.
    Check {
        file: PathBuf,
    },
    /// Install descriptors (files or directories) and optionally run actions.
    Run {
        /// JSON host configuration.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Trigger the named control after installing. Repeatable.
        #[arg(long = "invoke")]
        invoke: Vec<String>,

        paths: Vec<PathBuf>,
    },
    /// List the plugin store, or install one entry from it.
    Store {
        #[arg(long)]
        catalog: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Install and run the named entry.
        #[arg(long)]
        install: Option<String>,
    },
    /// Write a new descriptor skeleton.
    New {
        file: PathBuf,

        #[arg(long)]
        name: String,

        #[arg(long, default_value = "tools")]
        category: String,

        #[arg(long, default_value = "New extension")]
        description: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    let logging = match &cli.log_dir {
        Some(dir) => init_logging(&level, dir),
        None => init_stderr_logging(&level),
    };
    if let Err(err) = logging {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    log::debug!("event=cli_start module=cli status=ok command={:?}", cli.command);

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the command ran but something in it failed.
fn run(command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Check { file } => check(&file),
        Command::Run {
            config,
            invoke,
            paths,
        } => run_host(config.as_deref(), &paths, &invoke),
        Command::Store {
            catalog,
            config,
            install,
        } => store(&catalog, config.as_deref(), install.as_deref()),
        Command::New {
            file,
            name,
            category,
            description,
        } => new_descriptor(&file, &name, &category, &description),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HostConfig> {
    match path {
        Some(path) => Ok(HostConfig::from_json_file(path)?),
        None => Ok(HostConfig::default()),
    }
}

fn check(file: &Path) -> anyhow::Result<bool> {
    let raw = std::fs::read_to_string(file)
        .map_err(|err| anyhow::anyhow!("failed to read `{}`: {err}", file.display()))?;
    let descriptor = ExtensionDescriptor::parse(&raw);

    for (key, value) in &descriptor.metadata {
        println!("{key} = {value}");
    }
    println!("code_lines = {}", descriptor.code_line_count());

    match descriptor.validate() {
        Ok(()) => {
            println!("ok");
            Ok(true)
        }
        Err(err) => {
            println!("invalid: {err}");
            Ok(false)
        }
    }
}

fn run_host(config: Option<&Path>, paths: &[PathBuf], invoke: &[String]) -> anyhow::Result<bool> {
    let mut manager = ExtensionManager::new(load_config(config)?)?;
    let mut all_ok = true;

    for path in paths {
        if path.is_dir() {
            for (file, result) in manager.install_dir(path)? {
                all_ok &= print_install(&file, &result);
            }
        } else {
            let result = manager.install_path(path);
            all_ok &= print_install(path, &result);
        }
    }

    print_surface(&manager);
    let labels: Vec<String> = if invoke.is_empty() {
        manager
            .surface()
            .controls()
            .filter(|control| control.extension_id().is_some())
            .map(|control| control.label.clone())
            .collect()
    } else {
        invoke.to_vec()
    };
    all_ok &= trigger_all(&mut manager, &labels);
    Ok(all_ok)
}

fn store(catalog: &Path, config: Option<&Path>, install: Option<&str>) -> anyhow::Result<bool> {
    let catalog = PluginCatalog::from_json_file(catalog)?;

    let Some(name) = install else {
        for entry in catalog.entries() {
            println!("{} [{}] {}", entry.name, entry.category, entry.description);
        }
        return Ok(true);
    };

    let mut manager = ExtensionManager::new(load_config(config)?)?;
    let result = manager.install_from_catalog(&catalog, name);
    let ok = print_install(Path::new(name), &result);
    match result {
        // The descriptor's own name labels the control, not the listing name.
        Ok(InstallOutcome::Installed { name, .. }) => Ok(trigger_all(&mut manager, &[name])),
        _ => Ok(ok),
    }
}

fn new_descriptor(
    file: &Path,
    name: &str,
    category: &str,
    description: &str,
) -> anyhow::Result<bool> {
    if file.exists() {
        anyhow::bail!("refusing to overwrite `{}`", file.display());
    }

    let mut descriptor = ExtensionDescriptor::default();
    for (key, value) in [
        ("name", name),
        ("version", "0.1.0"),
        ("description", description),
        ("category", category),
    ] {
        descriptor.metadata.insert(key.to_string(), value.to_string());
    }
    descriptor.code = format!("def main():\n    print(\"{name} ran\")\n");

    std::fs::write(file, descriptor.render())
        .map_err(|err| anyhow::anyhow!("failed to write `{}`: {err}", file.display()))?;
    println!("wrote {}", file.display());
    Ok(true)
}

fn print_install(path: &Path, result: &Result<InstallOutcome, InstallError>) -> bool {
    match result {
        Ok(InstallOutcome::Installed { id, name }) => {
            println!("installed {name} ({id}) from {}", path.display());
            true
        }
        Ok(InstallOutcome::Skipped { name, reason }) => {
            println!("skipped {name}: {reason}");
            true
        }
        Err(err) => {
            println!("failed {}: {err}", path.display());
            false
        }
    }
}

fn print_surface(manager: &ExtensionManager) {
    println!("surface:");
    for item in manager.surface().items() {
        match item {
            SurfaceItem::Control(control) => println!("  [{}]", control.label),
            SurfaceItem::Stretch => println!("  ~"),
        }
    }
}

fn trigger_all(manager: &mut ExtensionManager, labels: &[String]) -> bool {
    let mut pending = 0usize;
    let mut all_ok = true;

    for label in labels {
        match manager.trigger(label) {
            Ok(_) => pending += 1,
            Err(err) => {
                println!("cannot run {label}: {err}");
                all_ok = false;
            }
        }
    }

    while pending > 0 {
        let Some(report) = manager.next_report(REPORT_WAIT) else {
            println!("gave up waiting for {pending} action(s)");
            return false;
        };
        pending -= 1;
        match report.outcome {
            Ok(output) => {
                for line in &output.printed {
                    println!("{}| {line}", report.label);
                }
                println!("{} -> {}", report.label, output.value);
            }
            Err(err) => {
                println!("{} failed: {err}", report.label);
                all_ok = false;
            }
        }
    }

    all_ok
}
