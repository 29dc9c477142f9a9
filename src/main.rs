use anyhow::Result;
use clap::{Parser, Subcommand};
use grit::areas::repository::Repository;
use grit::artifacts::core::error::engine_error;
use grit::commands::porcelain::checkout::{CheckoutRequest, HunkDecision};
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "grit",
    version = "0.1.0",
    about = "A Git-compatible version control core",
    long_about = "A reimplementation of the core of a distributed version control \
    system, compatible with the standard on-disk format: content-addressed object \
    store, staging index, references, revision parsing, tree merging and diffing."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "init", about = "Initialize a new repository")]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<String>,
        #[arg(long, help = "Digest variant: sha1 (default) or sha256")]
        object_format: Option<String>,
    },
    #[command(name = "add", about = "Add files or directories to the index")]
    Add {
        #[arg(index = 1, required = true, help = "The files or directories to add")]
        paths: Vec<String>,
    },
    #[command(name = "commit", about = "Record the staged tree as a new commit")]
    Commit {
        #[arg(short, long, help = "The commit message")]
        message: String,
    },
    #[command(name = "status", about = "Show the working tree status")]
    Status,
    #[command(name = "diff", about = "Show changes between worktree, index and HEAD")]
    Diff {
        #[arg(long, help = "Compare the index against HEAD")]
        staged: bool,
        #[arg(long, help = "Synonym for --staged")]
        cached: bool,
        #[arg(index = 1, help = "Restrict the diff to these paths")]
        paths: Vec<String>,
    },
    #[command(name = "log", about = "Show commit history")]
    Log {
        #[arg(index = 1, help = "The revision to start from (defaults to HEAD)")]
        revision: Option<String>,
    },
    #[command(name = "checkout", about = "Switch branches or restore files")]
    Checkout {
        #[arg(help = "Branch, commit, or tree-ish to check out")]
        target: Option<String>,
        #[arg(short = 'b', help = "Create a new branch and switch to it")]
        new_branch: Option<String>,
        #[arg(short = 'p', long = "patch", help = "Interactively discard hunks")]
        patch: bool,
        #[arg(short = 'f', long = "force", help = "Throw away local modifications")]
        force: bool,
        #[arg(last = true, help = "Restrict the checkout to these paths")]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GRIT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        match engine_error(&err) {
            Some(kind) if kind.is_user_abort() => std::process::exit(0),
            _ => {
                eprintln!("fatal: {:#}", err);
                std::process::exit(1);
            }
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let open = |path: Option<&String>| -> Result<Repository> {
        let root = match path {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir()?,
        };
        Repository::new(root, Box::new(std::io::stdout()))
    };

    match &cli.command {
        Commands::Init {
            path,
            object_format,
        } => {
            let mut repository = open(path.as_ref())?;
            repository.init(object_format.as_deref()).await?
        }
        Commands::Add { paths } => {
            let mut repository = open(None)?;
            repository.add(paths).await?
        }
        Commands::Commit { message } => {
            let mut repository = open(None)?;
            repository.commit(message).await?
        }
        Commands::Status => {
            let mut repository = open(None)?;
            repository.status().await?
        }
        Commands::Diff {
            staged,
            cached,
            paths,
        } => {
            let mut repository = open(None)?;
            repository.diff(*staged || *cached, paths).await?
        }
        Commands::Log { revision } => {
            let mut repository = open(None)?;
            repository.log(revision.as_deref()).await?
        }
        Commands::Checkout {
            target,
            new_branch,
            patch,
            force,
            paths,
        } => {
            let mut repository = open(None)?;
            let request = CheckoutRequest {
                target: target.clone(),
                new_branch: new_branch.clone(),
                patch: *patch,
                force: *force,
                paths: paths.clone(),
            };

            if *patch {
                let mut prompt = prompt_hunk_decision;
                repository.checkout(request, Some(&mut prompt)).await?
            } else {
                repository.checkout(request, None).await?
            }
        }
    }

    Ok(())
}

/// The interactive hunk-selection collaborator
///
/// Shows the hunk and asks whether to discard it from the working tree.
/// End-of-input counts as quitting, which aborts the whole run silently.
fn prompt_hunk_decision(
    file: &grit::artifacts::patch::parse::FilePatch,
    hunk: &grit::artifacts::patch::parse::PatchHunk,
) -> Result<HunkDecision> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "diff --git a/{0} b/{0}", file.old_path.display())?;
    writeln!(out, "{}", hunk.header())?;
    for line in &hunk.lines {
        let sign = match line.kind {
            grit::artifacts::patch::parse::PatchLineKind::Context => ' ',
            grit::artifacts::patch::parse::PatchLineKind::Add => '+',
            grit::artifacts::patch::parse::PatchLineKind::Del => '-',
        };
        writeln!(out, "{}{}", sign, line.text)?;
    }

    loop {
        write!(out, "Discard this hunk from worktree [y,n,q]? ")?;
        out.flush()?;

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer)? == 0 {
            return Ok(HunkDecision::Quit);
        }

        match answer.trim() {
            "y" | "Y" => return Ok(HunkDecision::Discard),
            "n" | "N" => return Ok(HunkDecision::Keep),
            "q" | "Q" => return Ok(HunkDecision::Quit),
            _ => continue,
        }
    }
}
