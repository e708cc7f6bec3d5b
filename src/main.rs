use std::io;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vaultrag::assistant::{self, Assistant};
use vaultrag::config::Config;
use vaultrag::generation::OpenAiChat;
use vaultrag::gitwrap::{Committer, GitCommitter};
use vaultrag::retriever::RetrieveOptions;
use vaultrag::threads::{FileThreadStore, ThreadStore};
use vaultrag::vault::{self, Vault};

#[derive(Parser)]
#[command(name = "vaultrag", version, about = "Vault-aware RAG planning assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct VaultArg {
    /// Path to the vault
    #[arg(long = "vault", default_value = ".")]
    path: PathBuf,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Number of results
    #[arg(short, long)]
    k: Option<usize>,
    /// Only chunks carrying this tag
    #[arg(long)]
    tag: Option<String>,
    /// Only files matching this glob
    #[arg(long = "path")]
    path_glob: Option<String>,
    /// Candidates fetched before filtering (default 3k)
    #[arg(long)]
    oversample: Option<usize>,
}

impl FilterArgs {
    fn options(self) -> RetrieveOptions {
        RetrieveOptions {
            k: self.k,
            tag: self.tag,
            path_glob: self.path_glob,
            oversample: self.oversample,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the AI config inside a vault
    Init { vault_path: PathBuf },
    /// Build (or rebuild) the embedding index
    Index {
        vault_path: PathBuf,
        /// Keep watching for changes
        #[arg(long)]
        watch: bool,
    },
    /// One-off question with citations
    Ask {
        question: String,
        #[command(flatten)]
        vault: VaultArg,
        #[command(flatten)]
        filters: FilterArgs,
        /// Print hits as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Chat within a thread, streaming the response
    Chat {
        slug: String,
        message: String,
        #[command(flatten)]
        vault: VaultArg,
        #[command(flatten)]
        filters: FilterArgs,
        /// Append both turns to the thread
        #[arg(long)]
        write: bool,
    },
    /// Weekly planning checkpoint for a thread
    Plan {
        slug: String,
        #[arg(long)]
        weekly: bool,
        #[command(flatten)]
        vault: VaultArg,
        #[arg(long)]
        write: bool,
    },
    /// Capture a quick thought into today's daily note
    Capture {
        text: String,
        #[command(flatten)]
        vault: VaultArg,
        #[arg(long)]
        write: bool,
    },
    /// Thread operations
    Thread {
        #[command(subcommand)]
        action: ThreadCommand,
    },
    /// Create, move or delete notes (rebuilds the index)
    Note {
        #[command(subcommand)]
        action: NoteCommand,
    },
    /// Fill in missing title/created/tags frontmatter
    Enrich {
        #[command(flatten)]
        vault: VaultArg,
        /// Write changes instead of reporting them
        #[arg(long)]
        apply: bool,
    },
    /// Run sanity checks
    Doctor {
        #[command(flatten)]
        vault: VaultArg,
    },
}

#[derive(Subcommand)]
enum ThreadCommand {
    New {
        slug: String,
        #[arg(long)]
        seed: Option<String>,
        #[command(flatten)]
        vault: VaultArg,
    },
}

#[derive(Subcommand)]
enum NoteCommand {
    Create {
        path: String,
        /// Initial content
        #[arg(long, default_value = "")]
        content: String,
        #[command(flatten)]
        vault: VaultArg,
    },
    Move {
        from: String,
        to: String,
        #[command(flatten)]
        vault: VaultArg,
    },
    Delete {
        path: String,
        #[command(flatten)]
        vault: VaultArg,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Init { vault_path } => {
            let path = vault::init(&vault_path)?;
            println!("Initialized config at {}", path.display());
        }
        Command::Index { vault_path, watch } => {
            let manifest = Vault::open(&vault_path)?.build()?;
            println!("Indexed {} chunks.", manifest.total_chunks);
            if watch {
                println!("Watch mode not yet implemented.");
            }
        }
        Command::Ask {
            question,
            vault,
            filters,
            json,
        } => {
            let vault = Vault::open(&vault.path)?;
            let answer = assistant::ask(&vault, &question, &filters.options())?;
            if json {
                for hit in &answer.hits {
                    println!("{}", serde_json::to_string(hit)?);
                }
            } else {
                println!("Question: {question}");
                println!("Sources:\n{}", answer.citations);
            }
        }
        Command::Chat {
            slug,
            message,
            vault,
            filters,
            write,
        } => {
            let vault = Vault::open(&vault.path)?;
            let generator = OpenAiChat::from_config(vault.config())?;
            let threads = FileThreadStore::new(vault.root(), &vault.config().writeback);
            let committer = GitCommitter::new(vault.root(), &vault.config().git);
            let assistant = Assistant::new(&vault, &generator, &threads, &committer)?;

            print!("Assistant: ");
            let reply = assistant.chat(
                &slug,
                &message,
                &filters.options(),
                write,
                &mut io::stdout(),
            )?;
            println!("Sources:\n{}", reply.citations);
        }
        Command::Plan {
            slug,
            weekly,
            vault,
            write,
        } => {
            if !weekly {
                info!("only weekly checkpoints are supported; producing one");
            }
            let vault = Vault::open(&vault.path)?;
            let generator = OpenAiChat::from_config(vault.config())?;
            let threads = FileThreadStore::new(vault.root(), &vault.config().writeback);
            let committer = GitCommitter::new(vault.root(), &vault.config().git);
            let assistant = Assistant::new(&vault, &generator, &threads, &committer)?;
            assistant.plan(&slug, write, &mut io::stdout())?;
        }
        Command::Capture { text, vault, write } => {
            let cfg = Config::load(&vault.path)?;
            if !write {
                println!("Use --write to persist capture.");
                return Ok(());
            }
            let path = assistant::capture(&vault.path, &cfg.writeback, &text, Utc::now())?;
            GitCommitter::new(&vault.path, &cfg.git).commit(
                &[path.clone()],
                "capture",
                &cfg.writeback.default_target,
                0,
            )?;
            println!("Captured to {}", path.display());
        }
        Command::Thread {
            action: ThreadCommand::New { slug, seed, vault },
        } => {
            let cfg = Config::load(&vault.path)?;
            let threads = FileThreadStore::new(&vault.path, &cfg.writeback);
            let path = threads.create(&slug, seed.as_deref())?;
            println!("Thread created at {}", path.display());
        }
        Command::Note { action } => {
            let manifest = match action {
                NoteCommand::Create {
                    path,
                    content,
                    vault,
                } => Vault::open(&vault.path)?.create_note(&path, &content)?,
                NoteCommand::Move { from, to, vault } => {
                    Vault::open(&vault.path)?.move_note(&from, &to)?
                }
                NoteCommand::Delete { path, vault } => {
                    Vault::open(&vault.path)?.delete_note(&path)?
                }
            };
            println!("Reindexed {} chunks.", manifest.total_chunks);
        }
        Command::Enrich { vault, apply } => {
            let cfg = Config::load(&vault.path)?;
            let report = vault::enrich_frontmatter(&vault.path, &cfg, apply)?;
            for rel in &report.changed {
                println!("  {rel}");
            }
            if apply {
                println!("Updated {} notes.", report.changed.len());
            } else {
                println!(
                    "Dry run: would update {} notes. Use --apply to write.",
                    report.changed.len()
                );
            }
        }
        Command::Doctor { vault } => {
            println!("{}", vault::doctor(&vault.path));
        }
    }

    Ok(())
}
