use std::{str::FromStr, sync::Arc};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use engagement::{
    hash_address, identity::DEFAULT_LOOKUP_URL, AddressLookup, DocumentStore,
    EngagementController, EngagementStore, EngagementView, HttpAddressLookup, HttpDocumentStore,
    IdentityResolver, ReconciliationPolicy, StaticAddressLookup, StoreConfig, ToggleOutcome,
};
use shared::domain::{Environment, PostKey};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Inspect engagement records and replay visits or votes against them.
#[derive(Parser, Debug)]
#[command(name = "tools")]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "sqlite://./data/engagement.db"
    )]
    database_url: String,
    #[arg(long, global = true, env = "BLOG_ENV", default_value = "dev", value_parser = Environment::from_str)]
    env: Environment,
    /// Talk to an engagement server instead of opening the database.
    #[arg(long, global = true, env = "ENGAGEMENT_SERVER_URL")]
    server_url: Option<String>,
    #[arg(long, global = true, env = "IP_LOOKUP_URL")]
    lookup_url: Option<String>,
    /// Act as the visitor with this address instead of looking one up.
    #[arg(long, global = true)]
    address: Option<String>,
    /// Change local vote state only after the store accepts the write.
    #[arg(long, global = true)]
    confirm_writes: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Show {
        post: String,
    },
    List,
    Visit {
        post: String,
        /// Load without counting a view.
        #[arg(long)]
        preview: bool,
    },
    Like {
        post: String,
    },
    Unlike {
        post: String,
    },
}

enum Backend {
    Local(Storage),
    Remote(Arc<HttpDocumentStore>),
}

impl Backend {
    async fn open(cli: &Cli) -> Result<Self> {
        match &cli.server_url {
            Some(server_url) => Ok(Backend::Remote(Arc::new(HttpDocumentStore::new(
                server_url,
            )?))),
            None => Ok(Backend::Local(Storage::new(&cli.database_url).await?)),
        }
    }

    fn document_store(&self) -> Arc<dyn DocumentStore> {
        match self {
            Backend::Local(storage) => Arc::new(storage.clone()),
            Backend::Remote(remote) => remote.clone(),
        }
    }

    async fn list_keys(&self, collection: &str) -> Result<Vec<String>> {
        match self {
            Backend::Local(storage) => storage.list_document_keys(collection).await,
            Backend::Remote(remote) => remote.list_keys(collection).await,
        }
    }
}

fn address_lookup(cli: &Cli) -> Result<Arc<dyn AddressLookup>> {
    if let Some(address) = &cli.address {
        return Ok(Arc::new(StaticAddressLookup(address.clone())));
    }
    let url = match (&cli.lookup_url, &cli.server_url) {
        (Some(url), _) => url.clone(),
        (None, Some(server_url)) => format!("{}/ip", server_url.trim_end_matches('/')),
        (None, None) => DEFAULT_LOOKUP_URL.to_string(),
    };
    Ok(Arc::new(HttpAddressLookup::new(&url)?))
}

fn print_view(post: &PostKey, view: &EngagementView) {
    let vote = if view.like_active {
        "liked"
    } else if view.unlike_active {
        "unliked"
    } else {
        "none"
    };
    println!(
        "{post}: reads={} likes={} unlikes={} vote={vote} actions={}",
        view.reads,
        view.likes,
        view.unlikes,
        if view.enabled { "enabled" } else { "disabled" }
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let backend = Backend::open(&cli).await?;
    let store = EngagementStore::new(backend.document_store(), StoreConfig::for_environment(cli.env));
    info!(collection = store.collection(), "tools: using collection");

    match &cli.command {
        Command::Show { post } => {
            let post = PostKey::new(post.as_str());
            let Some(record) = store.fetch(&post).await? else {
                println!("{post}: no record in {}", store.collection());
                return Ok(());
            };
            println!(
                "{post}: reads={} likes={} unlikes={} visitors={}",
                record.read_count,
                record.like_count(),
                record.unlike_count(),
                record.visited_by.len()
            );
            if let Some(address) = &cli.address {
                let visitor = hash_address(address);
                println!("vote of {visitor}: {:?}", record.vote_of(&visitor));
            }
            println!("{}", serde_json::to_string_pretty(&record.to_document())?);
        }
        Command::List => {
            for key in backend.list_keys(store.collection()).await? {
                println!("{key}");
            }
        }
        Command::Visit { post, preview } => {
            let post = PostKey::new(post.as_str());
            let mut controller = controller_for(&cli, store)?;
            controller.mount(post.clone(), !preview).await;
            print_view(&post, &controller.view());
        }
        Command::Like { post } | Command::Unlike { post } => {
            let post = PostKey::new(post.as_str());
            let mut controller = controller_for(&cli, store)?;
            controller.mount(post.clone(), true).await;

            let outcome = if matches!(cli.command, Command::Like { .. }) {
                controller.like().await
            } else {
                controller.unlike().await
            };
            print_view(&post, &controller.view());
            match outcome {
                ToggleOutcome::Committed(vote) => info!(post_key = %post, ?vote, "tools: vote stored"),
                ToggleOutcome::Inert => {
                    bail!("actions are disabled for {post}: visitor identity could not be resolved")
                }
                ToggleOutcome::Failed { error, .. } => return Err(error.into()),
            }
        }
    }

    Ok(())
}

fn controller_for(cli: &Cli, store: EngagementStore) -> Result<EngagementController> {
    let identity = IdentityResolver::new(address_lookup(cli)?);
    let policy = if cli.confirm_writes {
        ReconciliationPolicy::ConfirmThenCommit
    } else {
        ReconciliationPolicy::Optimistic
    };
    Ok(EngagementController::new(identity, store).with_policy(policy))
}
