use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::path::PathBuf;

use krait::config::{Config, TrackerMode};
use krait::logging;
use krait::orchestrator::{CancelToken, track_module, track_module_isolated};
use krait::report::report_to_json;
use krait::tracker::{Submodules, TrackOptions};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target module name (may be relative when --package is given)
    #[arg(long = "name", short = 'n')]
    name: String,

    /// Parent package for a relative --name
    #[arg(long = "package", short = 'p')]
    package: Option<String>,

    /// Recurse over all sub-modules, or only the listed ones
    #[arg(long = "submodules", num_args = 0.., value_name = "MODULE")]
    submodules: Option<Vec<String>>,

    /// Include witness import stacks in the output
    #[arg(long = "track_import_stack")]
    track_import_stack: bool,

    /// Annotate each dependency as direct or transitive
    #[arg(long = "detect_transitive")]
    detect_transitive: bool,

    /// Annotate each dependency's optional status
    #[arg(long = "show_optional")]
    show_optional: bool,

    /// Recurse into third-party dependencies as well
    #[arg(long = "full_depth")]
    full_depth: bool,

    /// Verbosity: error, warning, info, debug, debug1..debug4
    #[arg(long = "log_level", default_value = "warning")]
    log_level: String,

    /// Indent for pretty-printed JSON output
    #[arg(long = "indent", short = 'i', value_name = "N")]
    indent: Option<usize>,

    /// Configuration file path
    #[arg(long = "config", short = 'c')]
    config: Option<PathBuf>,

    /// Fail outright when an isolated sub-job fails instead of emitting a
    /// typed error entry
    #[arg(long = "strict")]
    strict: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (level, detail) = logging::parse_level(&cli.log_level)
        .ok_or_else(|| anyhow::anyhow!("Invalid log level '{}'", cli.log_level))?;
    env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str())).init();
    logging::set_debug_detail(detail);

    let config = Config::load(cli.config.as_deref())?;
    debug!("Configuration: {:?}", config);

    let mut opts = TrackOptions::new(&cli.name);
    opts.package_name = cli.package.clone();
    opts.submodules = match cli.submodules {
        None => Submodules::Target,
        Some(list) if list.is_empty() => Submodules::All,
        Some(list) => Submodules::Listed(list),
    };
    opts.track_import_stack = cli.track_import_stack;
    opts.detect_transitive = cli.detect_transitive;
    opts.show_optional = cli.show_optional;
    opts.full_depth = cli.full_depth;

    let mode = TrackerMode::from_env();
    let report = if mode == TrackerMode::Tracking {
        info!("Tracking mode: isolating sub-jobs in subprocesses");
        let cancel = CancelToken::new();
        track_module_isolated(&config, &opts, cli.config.as_deref(), cli.strict, &cancel)?
    } else {
        track_module(&config, &opts)?
    };

    println!("{}", report_to_json(&report, cli.indent)?);
    Ok(())
}
