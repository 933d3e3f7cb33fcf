//! asl command line interface

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use asl::merge::{MergeOptions, Strategy};
use asl::{history, remote, Digest, Error, Repository};

#[derive(Parser)]
#[command(name = "asl")]
#[command(about = "content-addressed version control")]
#[command(version)]
struct Cli {
    /// run as if started in this directory
    #[arg(short = 'C', long, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize a new repository
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// record a snapshot of the working tree
    Save {
        /// files to include (all tracked files when empty)
        paths: Vec<String>,

        /// commit message
        #[arg(short, long)]
        message: String,
    },

    /// show commit history of the current branch
    Log {
        /// maximum number of commits to show (0 = unbounded)
        #[arg(short = 'n', long, default_value_t = 0)]
        limit: usize,
    },

    /// list branches, or create one
    Branch {
        /// branch to create; lists branches when omitted
        name: Option<String>,
    },

    /// switch to a branch
    Switch { name: String },

    /// move the current branch back to its parent commit
    Undo,

    /// replace the tip commit
    Amend {
        paths: Vec<String>,

        /// new message (reuses the old one when omitted)
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// restore files from a commit into the working tree
    Checkout {
        /// branch name or full hex digest
        target: String,
    },

    /// merge a branch into the current branch
    Merge {
        /// branch to merge
        branch: Option<String>,

        /// force a merge commit even when fast-forward applies
        #[arg(long)]
        no_ff: bool,

        /// fail unless fast-forward applies
        #[arg(long)]
        ff_only: bool,

        /// recursive, ours or theirs
        #[arg(long, default_value = "recursive")]
        strategy: String,

        /// abandon the in-progress merge
        #[arg(long)]
        abort: bool,

        /// finish the in-progress merge after resolving conflicts
        #[arg(long = "continue")]
        cont: bool,
    },

    /// mark a conflicted file as resolved
    Resolve { path: String },

    /// show changes between two commits
    Diff {
        old: String,
        new: String,
    },

    /// manage remotes
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// add a remote
    Add { name: String, url: String },

    /// remove a remote
    Remove { name: String },

    /// list remotes
    List,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(cli: Cli) -> asl::Result<()> {
    if let Commands::Init { path } = &cli.command {
        Repository::init(path)?;
        println!("initialized asl repository at {}", path.display());
        return Ok(());
    }

    let repo = Repository::discover(&cli.dir)?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Save { paths, message } => {
            let digest = repo.save(&paths, &message)?;
            println!("{}", digest);
        }

        Commands::Log { limit } => {
            let tip = repo.current_commit()?;
            for (digest, commit) in history::history(repo.store(), &tip, limit)? {
                println!("commit {}", digest);
                println!("Author: {} <{}>", commit.author, commit.email);
                println!("Date:   {}", commit.timestamp);
                println!();
                for line in commit.message.lines() {
                    println!("    {}", line);
                }
                println!();
            }
        }

        Commands::Branch { name: Some(name) } => {
            repo.create_branch(&name)?;
            println!("created branch {}", name);
        }

        Commands::Branch { name: None } => {
            let current = repo.current_branch().ok();
            for branch in repo.list_branches()? {
                let marker = if Some(&branch) == current.as_ref() { "*" } else { " " };
                println!("{} {}", marker, branch);
            }
        }

        Commands::Switch { name } => {
            repo.switch_branch(&name)?;
            println!("switched to branch {}", name);
        }

        Commands::Undo => {
            repo.undo()?;
            println!("moved branch back one commit");
        }

        Commands::Amend { paths, message } => {
            let digest = repo.amend(&paths, &message)?;
            println!("{}", digest);
        }

        Commands::Checkout { target } => {
            let commit = resolve_commitish(&repo, &target)?;
            repo.checkout(&commit)?;
            println!("checked out {}", commit.short());
        }

        Commands::Merge { abort: true, .. } => {
            repo.abort_merge()?;
            println!("merge aborted");
        }

        Commands::Merge { cont: true, .. } => {
            let digest = repo.continue_merge()?;
            println!("merge completed: {}", digest.short());
        }

        Commands::Merge { branch, no_ff, ff_only, strategy, .. } => {
            let branch = branch
                .ok_or_else(|| Error::InvalidConfig("merge requires a branch name".to_string()))?;
            let opts = MergeOptions {
                no_ff,
                ff_only,
                strategy: Strategy::parse(&strategy)?,
            };
            let outcome = repo.merge(&branch, &opts)?;
            println!("{}", outcome.message);
            for path in &outcome.conflicted {
                println!("  conflict: {}", path);
            }
        }

        Commands::Resolve { path } => {
            repo.resolve(&path)?;
            println!("marked {} as resolved", path);
        }

        Commands::Diff { old, new } => {
            let old = resolve_commitish(&repo, &old)?;
            let new = resolve_commitish(&repo, &new)?;
            for (path, kind) in repo.tree_diff(&old, &new)? {
                let label = match kind {
                    asl::ChangeKind::Added => "added",
                    asl::ChangeKind::Modified => "modified",
                    asl::ChangeKind::Deleted => "deleted",
                };
                println!("{:<9} {}", label, path);
            }
        }

        Commands::Remote { command } => match command {
            RemoteCommands::Add { name, url } => {
                remote::add_remote(&repo, &name, &url)?;
                println!("added remote {}", name);
            }
            RemoteCommands::Remove { name } => {
                remote::remove_remote(&repo, &name)?;
                println!("removed remote {}", name);
            }
            RemoteCommands::List => {
                for r in remote::list_remotes(&repo)? {
                    println!("{}\t{}", r.name, r.url);
                }
            }
        },
    }

    Ok(())
}

/// resolve a branch name or full hex digest to a commit
fn resolve_commitish(repo: &Repository, s: &str) -> asl::Result<Digest> {
    if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Digest::from_hex(s);
    }
    repo.get_ref(&format!("{}{}", asl::HEADS_PREFIX, s))
}
