//! Paper-to-model generation CLI.
//!
//! `creator run` reads `<data-dir>/script.txt`, lets the agents generate and
//! refine `model.py` under `<output-dir>/<data name>/<timestamp>/`, and prints
//! the final artifact path on stdout.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};

use creator::create::{CreateRequest, run_create};
use creator::exit_codes;
use creator::io::cache::{CachedBackend, ResponseCache};
use creator::io::config::{CreatorConfig, load_config, write_config};
use creator::io::human::StdinHuman;
use creator::io::llm::OpenAiBackend;
use creator::io::sandbox::LocalSandbox;
use creator::logging;

#[derive(Parser)]
#[command(
    name = "creator",
    version,
    about = "Generate and refine PyTorch model code from a paper description"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a model file for one data directory.
    Run(RunArgs),
    /// Write the default configuration to PATH.
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Directory containing `script.txt` and its images.
    #[arg(long)]
    data_dir: PathBuf,
    /// Root directory for run outputs.
    #[arg(long)]
    output_dir: PathBuf,
    /// TOML config; missing file means defaults.
    #[arg(long, default_value = "creator.toml")]
    config: PathBuf,
    /// Override `max_iter`.
    #[arg(long)]
    max_iter: Option<u32>,
    /// Condense the description with the interpreter first.
    #[arg(long)]
    use_interpreter: bool,
    /// Let the operator refine the interpretation on stdin.
    #[arg(long)]
    human_input: bool,
    /// Do not echo the conversation to stdout.
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::FAILED);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    let mut cfg = load_config(&args.config)?;
    apply_overrides(&mut cfg, args);
    cfg.validate()?;

    let cache = cfg
        .llm
        .cache_seed
        .map(|seed| ResponseCache::new(Path::new(&cfg.llm.cache_dir), seed));
    let backend = CachedBackend::new(OpenAiBackend::from_config(&cfg.llm)?, cache);
    let sandbox = LocalSandbox::from_config(&cfg.sandbox);
    let human = StdinHuman;

    let outcome = run_create(
        &CreateRequest {
            data_dir: &args.data_dir,
            output_dir: &args.output_dir,
            config: &cfg,
            echo: !args.quiet,
        },
        &backend,
        &sandbox,
        Some(&human),
    )?;
    println!("{}", outcome.final_path.display());
    Ok(())
}

fn apply_overrides(cfg: &mut CreatorConfig, args: &RunArgs) {
    if let Some(max_iter) = args.max_iter {
        cfg.max_iter = max_iter;
    }
    cfg.use_interpreter |= args.use_interpreter;
    cfg.human_input_mode |= args.human_input;
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &CreatorConfig::default())
}
