//! End-to-end: RPC client → tablet server → sqlite adapter.

use std::sync::Arc;

use protocol::message::{Dialect, Envelope, MessageType, TransactionOptions};
use protocol::{ErrorCode, SqlValue};
use shardgate_client::{ClientConfig, GateClient};
use shardgate_tablet::adapter::{SqliteAdapter, SqliteOptions, StorageAdapter};
use shardgate_tablet::server::{TabletApp, app};

async fn spawn_tablet(dialect: Dialect) -> GateClient {
    let adapter = SqliteAdapter::new(SqliteOptions {
        url: ":memory:".to_string(),
        auth_token: None,
        sync_url: None,
        dialect,
    });
    adapter.init().await.unwrap();

    let adapter: Arc<dyn StorageAdapter> = adapter;
    let tablet = TabletApp::new(adapter, "commerce", "-80");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(tablet).into_make_service())
            .await
            .unwrap();
    });

    GateClient::new(ClientConfig::new(format!("http://{addr}"))).unwrap()
}

#[tokio::test]
async fn connect_query_and_execute() {
    let client = spawn_tablet(Dialect::Sqlite).await;
    client.connect().await.unwrap();

    client
        .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", vec![])
        .await
        .unwrap();
    let inserted = client
        .execute(
            "INSERT INTO t (name) VALUES (?)",
            vec![SqlValue::Text("alice".into())],
        )
        .await
        .unwrap();
    assert_eq!(inserted.affected, 1);
    assert_eq!(inserted.last_insert_id, Some(1));

    let result = client.query("SELECT id, name FROM t", vec![]).await.unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(
        result.rows[0].get("name"),
        Some(&SqlValue::Text("alice".into()))
    );
}

#[tokio::test]
async fn bytes_survive_the_wire() {
    let client = spawn_tablet(Dialect::Sqlite).await;
    client
        .execute("CREATE TABLE blobs (data BLOB)", vec![])
        .await
        .unwrap();

    let payload = vec![0u8, 1, 2, 255, 254];
    client
        .execute(
            "INSERT INTO blobs (data) VALUES (?)",
            vec![SqlValue::Bytes(payload.clone())],
        )
        .await
        .unwrap();

    let result = client.query("SELECT data FROM blobs", vec![]).await.unwrap();
    assert_eq!(result.rows[0].get("data"), Some(&SqlValue::Bytes(payload)));
}

#[tokio::test]
async fn transaction_over_the_wire_rolls_back() {
    let client = spawn_tablet(Dialect::Sqlite).await;
    client
        .execute(
            "CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER)",
            vec![],
        )
        .await
        .unwrap();
    client
        .execute("INSERT INTO accounts (id, balance) VALUES (1, 1000)", vec![])
        .await
        .unwrap();

    let tx = client
        .begin(None, TransactionOptions::default())
        .await
        .unwrap();
    assert_eq!(tx.shards(), ["-80"]);
    tx.execute("UPDATE accounts SET balance = 0 WHERE id = 1", vec![])
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let result = client
        .query("SELECT balance FROM accounts WHERE id = 1", vec![])
        .await
        .unwrap();
    assert_eq!(result.rows[0].get("balance"), Some(&SqlValue::Int(1000)));
}

#[tokio::test]
async fn postgres_dialect_translates_over_the_wire() {
    let client = spawn_tablet(Dialect::Postgres).await;
    client
        .execute(
            "CREATE TABLE users (id SERIAL PRIMARY KEY, name VARCHAR(64), active BOOLEAN)",
            vec![],
        )
        .await
        .unwrap();

    client
        .execute(
            "INSERT INTO users (name, active) VALUES ($2, $1) ON CONFLICT DO NOTHING",
            vec![SqlValue::Bool(true), SqlValue::Text("Alice".into())],
        )
        .await
        .unwrap();

    let result = client
        .query(
            "SELECT name, active FROM users WHERE name = $1",
            vec![SqlValue::Text("Alice".into())],
        )
        .await
        .unwrap();
    assert_eq!(result.rows[0].get("active"), Some(&SqlValue::Int(1)));
}

#[tokio::test]
async fn shard_scoped_requests_validate_the_shard() {
    let client = spawn_tablet(Dialect::Sqlite).await;

    let mut request = Envelope::request(MessageType::ShardQuery)
        .with_sql("SELECT 1", vec![])
        .with_shard("80-");
    request.keyspace = Some("commerce".to_string());

    let err = client.rpc().send(&request).await.unwrap_err();
    match err {
        shardgate_client::ClientError::Application(wire) => {
            assert_eq!(wire.code, ErrorCode::ShardUnavailable);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn adapter_errors_keep_their_classification_across_the_wire() {
    let client = spawn_tablet(Dialect::Sqlite).await;
    client
        .execute("CREATE TABLE t (email TEXT UNIQUE)", vec![])
        .await
        .unwrap();
    client
        .execute(
            "INSERT INTO t (email) VALUES (?)",
            vec![SqlValue::Text("a@b.c".into())],
        )
        .await
        .unwrap();

    let err = client
        .execute(
            "INSERT INTO t (email) VALUES (?)",
            vec![SqlValue::Text("a@b.c".into())],
        )
        .await
        .unwrap_err();
    match err {
        shardgate_client::ClientError::Application(wire) => {
            assert_eq!(wire.code, ErrorCode::UniqueViolation);
        }
        other => panic!("unexpected error: {other}"),
    }
}
