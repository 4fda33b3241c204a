use clap::{Parser, Subcommand, ValueEnum};
use eyre::{Result, eyre};
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use todostore::{FileStorage, STORAGE_KEY, SqliteStorage, Storage, Store, view};

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "TodoStore CLI - A persistent task list")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the store directory (default: platform data directory)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Storage backend
    #[arg(short, long, value_enum, default_value_t = Backend::File)]
    backend: Backend,

    /// Storage key holding the task list
    #[arg(short, long, default_value = STORAGE_KEY)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// One JSON file per key
    File,
    /// SQLite key/value table
    Sqlite,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all tasks, oldest first
    List,

    /// Add a task
    Add {
        /// Task title (words are joined with spaces)
        #[arg(required = true)]
        title: Vec<String>,
    },

    /// Mark a task done, or not done again
    Toggle {
        /// Task id or unique id prefix
        id: String,
    },

    /// Remove a task
    Remove {
        /// Task id or unique id prefix
        id: String,
    },
}

fn main() -> Result<()> {
    // Setup tracing; stdout belongs to the rendered list
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();

    let store_path = cli
        .store_path
        .clone()
        .or_else(|| dirs::data_dir().map(|d| d.join("todostore")))
        .unwrap_or_else(|| PathBuf::from("."));

    match cli.backend {
        Backend::File => run(FileStorage::open(&store_path)?, &cli),
        Backend::Sqlite => {
            std::fs::create_dir_all(&store_path)?;
            run(SqliteStorage::open(store_path.join("todostore.db"))?, &cli)
        }
    }
}

fn run<S: Storage + 'static>(storage: S, cli: &Cli) -> Result<()> {
    let store = Rc::new(Store::with_key(storage, cli.key.clone()));
    store.load();
    let _subscription = view::mount(&store);

    match &cli.command {
        Commands::List => {
            view::render(&*store, &mut io::stdout().lock())?;
        }
        Commands::Add { title } => {
            if store.add_item(&title.join(" ")).is_none() {
                return Err(eyre!("Task title cannot be empty"));
            }
        }
        Commands::Toggle { id } => {
            let id = store.resolve_id(id)?;
            store.toggle_item(&id);
        }
        Commands::Remove { id } => {
            let id = store.resolve_id(id)?;
            store.remove_item(&id);
        }
    }

    Ok(())
}
