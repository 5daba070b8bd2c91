use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use common::telemetry::{get_subscriber, init_subscriber};
use shardgate::configuration::get_configuration;
use shardgate::executor::{RemoteTablet, Router};
use shardgate::startup::run;
use shardgate::vindex::MemoryLookupStore;
use shardgate::vschema::VSchema;
use shardgate_client::{ClientConfig, RpcClient};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber("shardgate".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let configuration = get_configuration().expect("Failed to read configuration.");
    let vschema =
        VSchema::from_file(Path::new(&configuration.vschema_path)).expect("Failed to load vschema");

    let mut router = Router::new(vschema, Arc::new(MemoryLookupStore::new()));
    for tablet in &configuration.tablets {
        let mut config = ClientConfig::new(tablet.address.clone());
        config.max_attempts = configuration.transport.max_attempts;
        config.backoff_ms = configuration.transport.backoff_ms;
        config.request_timeout_ms = configuration.transport.request_timeout_ms;
        config.bearer_token = tablet.bearer_token.clone();

        let rpc = RpcClient::new(config).expect("Failed to build tablet client");
        tracing::info!(
            "registering tablet {}/{} at {}",
            tablet.keyspace,
            tablet.shard,
            tablet.address
        );
        router.register_tablet(
            tablet.keyspace.clone(),
            tablet.shard.clone(),
            Arc::new(RemoteTablet::new(tablet.shard.clone(), rpc)),
        );
    }

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    tracing::info!("Starting gate on {}", address);
    let listener = TcpListener::bind(address).await?;
    run(listener, router).await
}
