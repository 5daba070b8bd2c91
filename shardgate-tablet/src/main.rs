use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{Level, info};

use protocol::message::Dialect;
use shardgate_tablet::adapter::{
    PostgresAdapter, PostgresOptions, SqliteAdapter, SqliteOptions, StorageAdapter,
};
use shardgate_tablet::server::{TabletApp, app};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineKind {
    Sqlite,
    Postgres,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DialectArg {
    Sqlite,
    Postgres,
}

#[derive(Parser, Debug)]
#[clap(
    name = "shardgate-tablet",
    about = "shardgate data plane - one storage adapter behind the RPC protocol",
    rename_all = "kebab-case",
    rename_all_env = "screaming-snake"
)]
pub struct Args {
    /// Port to listen on
    #[clap(short, long, default_value = "4101")]
    port: u16,

    /// Keyspace this tablet belongs to
    #[clap(long, default_value = "main")]
    keyspace: String,

    /// Shard range this tablet serves (e.g. "-80")
    #[clap(long, default_value = "-")]
    shard: String,

    /// Storage engine backing this tablet
    #[clap(long, value_enum, default_value = "sqlite")]
    engine: EngineKind,

    /// Engine URL: sqlite path / ":memory:", or a postgres:// URL
    #[clap(long, default_value = ":memory:")]
    url: String,

    /// Dialect of incoming SQL for the sqlite engine
    #[clap(long, value_enum, default_value = "sqlite")]
    dialect: DialectArg,

    /// Auth token for remote-replica sqlite deployments
    #[clap(long)]
    auth_token: Option<String>,

    /// Sync URL for remote-replica sqlite deployments
    #[clap(long)]
    sync_url: Option<String>,

    /// Data directory for embedded postgres engines
    #[clap(long)]
    data_dir: Option<PathBuf>,

    /// SQL file executed once after the engine comes up
    #[clap(long)]
    init_schema: Option<PathBuf>,

    /// Max engine pool connections (postgres)
    #[clap(long, default_value = "5")]
    max_connections: u32,

    /// Verbose engine logging
    #[clap(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();
    let addr = format!("0.0.0.0:{}", args.port);

    info!("shardgate-tablet starting on {}", addr);
    info!("serving {}/{}", args.keyspace, args.shard);

    let init_schema = match &args.init_schema {
        Some(path) => Some(tokio::fs::read_to_string(path).await?),
        None => None,
    };

    let adapter: Arc<dyn StorageAdapter> = match args.engine {
        EngineKind::Sqlite => {
            let dialect = match args.dialect {
                DialectArg::Sqlite => Dialect::Sqlite,
                DialectArg::Postgres => Dialect::Postgres,
            };
            info!("sqlite engine at {} (dialect {:?})", args.url, dialect);
            SqliteAdapter::new(SqliteOptions {
                url: args.url.clone(),
                auth_token: args.auth_token.clone(),
                sync_url: args.sync_url.clone(),
                dialect,
            })
        }
        EngineKind::Postgres => {
            info!("postgres engine at {}", args.url);
            PostgresAdapter::new(PostgresOptions {
                url: args.url.clone(),
                data_dir: args.data_dir.clone(),
                debug: args.debug,
                init_schema,
                max_connections: args.max_connections,
            })
        }
    };

    adapter.init().await?;

    // Surface adapter events in the log without blocking the adapter.
    let mut events = adapter.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("adapter event: {:?}", event);
        }
    });

    let tablet = TabletApp::new(adapter, args.keyspace, args.shard);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(tablet).into_make_service()).await?;

    Ok(())
}
