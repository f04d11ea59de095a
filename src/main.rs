use std::{
    io::IsTerminal,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::{
    git2_ops::GitRepo,
    render::RenderOptions,
    tree::{build_forest, build_upstream_forest},
};

mod error;
mod git2_ops;
mod render;
mod stats;
mod tree;

#[derive(Parser)]
#[command(author, version, about, arg_required_else_help = true)]
struct Args {
    #[arg(long, short, global = true, help = "Enable verbose output")]
    verbose: bool,

    /// Repository to inspect. Defaults to the current directory.
    #[arg(short = 'C', long = "repo", global = true, value_name = "PATH")]
    repo: Option<PathBuf>,

    /// Print a summary of repository query timings to stderr.
    #[arg(long, global = true)]
    stats: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Branch tools.
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },
    /// Print a shell completion script.
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand)]
enum BranchCommands {
    /// Show local branches as a tree.
    Tree(TreeArgs),
}

#[derive(clap::Args)]
struct TreeArgs {
    /// Nest branches under their configured upstream instead of commit ancestry.
    #[arg(long)]
    upstream: bool,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Show the abbreviated tip commit of each branch.
    #[arg(long)]
    tips: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => {
                std::io::stdout().is_terminal()
                    && colored::control::SHOULD_COLORIZE.should_colorize()
            }
        }
    }
}

fn main() {
    if let Err(e) = inner_main() {
        tracing::error!(error = ?e);
        std::process::exit(1);
    }
    std::process::exit(0);
}

fn inner_main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let result = match args.command {
        Commands::Branch {
            command: BranchCommands::Tree(ref tree_args),
        } => branch_tree(args.repo.as_deref(), tree_args),
        Commands::Completions { shell } => {
            print_completions(shell);
            Ok(())
        }
    };

    if args.stats {
        stats::print_summary();
    }
    result
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn branch_tree(repo_path: Option<&Path>, args: &TreeArgs) -> Result<()> {
    let path = match repo_path {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("reading current directory")?,
    };
    let git_repo = GitRepo::open(&path)?;
    let branches = git_repo.list_branches()?;
    tracing::debug!(count = branches.len(), "Listed local branches");

    let forest = if args.upstream {
        build_upstream_forest(&branches, &git_repo.local_upstreams(&branches))
    } else {
        build_forest(&git_repo, &branches)
    }
    .with_current(git_repo.current_branch());

    if forest.all_failed() {
        let first = forest
            .failures()
            .next()
            .map(ToString::to_string)
            .unwrap_or_default();
        bail!(
            "none of the {} branches could be placed in the tree (first failure: {})",
            forest.len(),
            first
        );
    }

    match args.format {
        Format::Text => {
            let color = args.color.enabled();
            if color {
                colored::control::set_override(true);
            }
            render::render_cli(
                &forest,
                RenderOptions {
                    color,
                    show_tips: args.tips,
                },
            )
            .context("writing branch tree")?;
        }
        Format::Json => {
            let json = render::render_json(&forest).context("serializing branch tree")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn print_completions(shell: clap_complete::Shell) {
    let mut command = Args::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
}
