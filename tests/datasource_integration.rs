// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests against SQLite. Network dialects are exercised only up
//! to the point where no server is required.

use std::sync::Arc;
use std::time::Duration;

use datagate::{
    guard_error, is_no_rows, with_whitelist, ConnectionPoolConfig, Database, DatagateConfig,
    DatasourceConfig, DatasourceError, ErrorCategory, Guard, Lifecycle, Logger, OpContext,
    Operation, ProviderRegistry, SqliteProvider, Value,
};
use datagate_sql::{NoTruncate, Rule};

fn pool() -> ConnectionPoolConfig {
    ConnectionPoolConfig::for_parallelism(1).with_max_open_conns(4)
}

async fn guarded_sqlite() -> Database {
    Database::builder(DatasourceConfig::new("sqlite").with_sql_guard(true))
        .pool_config(pool())
        .logger(Logger::disabled())
        .styled_logs(false)
        .open()
        .await
        .unwrap()
}

async fn seed(db: &Database, ctx: &OpContext) {
    db.execute(ctx, "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .await
        .unwrap();
    db.execute(ctx, "INSERT INTO users (name) VALUES ('ada'), ('grace'), ('linus')")
        .await
        .unwrap();
}

async fn count_users(db: &Database, ctx: &OpContext) -> i64 {
    let row = db.fetch_one(ctx, "SELECT COUNT(*) AS n FROM users").await.unwrap();
    row.get("n").and_then(Value::as_i64).unwrap()
}

#[tokio::test]
async fn open_start_and_query_sqlite() {
    let db = guarded_sqlite().await;
    let ctx = OpContext::background();

    db.lifecycle_hook().start(&ctx).await.unwrap();
    assert!(db.server_version().await.unwrap().starts_with('3'));

    seed(&db, &ctx).await;
    let rows = db.fetch_all(&ctx, "SELECT name FROM users ORDER BY id").await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(|r| r.get("name").and_then(Value::as_str)).collect();
    assert_eq!(names, ["ada", "grace", "linus"]);
}

#[tokio::test]
async fn guard_blocks_dangerous_statements_before_execution() {
    let db = guarded_sqlite().await;
    let ctx = OpContext::background();
    seed(&db, &ctx).await;

    for (sql, rule) in [
        ("DROP TABLE users", "no_drop"),
        ("DELETE FROM users", "delete_requires_where"),
    ] {
        let err = db.execute(&ctx, sql).await.unwrap_err();
        assert_eq!(err.operation(), Operation::Query);
        assert_eq!(err.category(), ErrorCategory::Execution);
        assert_eq!(guard_error(&err).unwrap().violation().unwrap().rule, rule, "{sql}");
    }

    // Nothing reached the server.
    assert_eq!(count_users(&db, &ctx).await, 3);

    let deleted = db.execute(&ctx, "DELETE FROM users WHERE name = 'linus'").await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(count_users(&db, &ctx).await, 2);
}

#[tokio::test]
async fn whitelisted_context_bypasses_guard() {
    let db = guarded_sqlite().await;
    let ctx = OpContext::background();
    seed(&db, &ctx).await;

    let admin = with_whitelist(&ctx);
    assert_eq!(db.execute(&admin, "DELETE FROM users").await.unwrap(), 3);
    db.execute(&admin, "DROP TABLE users").await.unwrap();

    let err = db.fetch_all(&ctx, "SELECT * FROM users").await.unwrap_err();
    assert!(guard_error(&err).is_none());
    assert!(err.to_string().contains("no such table"), "{err}");
}

#[tokio::test]
async fn guard_is_off_unless_enabled() {
    let ctx = OpContext::background();

    let unguarded = Database::builder(DatasourceConfig::new("sqlite"))
        .pool_config(pool())
        .logger(Logger::disabled())
        .open()
        .await
        .unwrap();
    seed(&unguarded, &ctx).await;
    assert_eq!(unguarded.execute(&ctx, "DELETE FROM users").await.unwrap(), 3);

    let no_hook = Database::builder(DatasourceConfig::new("sqlite").with_sql_guard(true))
        .pool_config(pool())
        .without_query_hook()
        .open()
        .await
        .unwrap();
    seed(&no_hook, &ctx).await;
    no_hook.execute(&ctx, "DROP TABLE users").await.unwrap();
}

#[tokio::test]
async fn custom_guard_enforces_only_its_rules() {
    let rules: Vec<Arc<dyn Rule>> = vec![Arc::new(NoTruncate)];
    let db = Database::builder(DatasourceConfig::new("sqlite"))
        .pool_config(pool())
        .logger(Logger::disabled())
        .guard(Guard::new(Logger::disabled(), rules))
        .open()
        .await
        .unwrap();
    let ctx = OpContext::background();
    seed(&db, &ctx).await;

    assert_eq!(db.guard().unwrap().rule_names(), ["no_truncate"]);
    assert_eq!(db.execute(&ctx, "DELETE FROM users").await.unwrap(), 3);
}

#[tokio::test]
async fn no_rows_is_reported_to_the_caller() {
    let db = guarded_sqlite().await;
    let ctx = OpContext::background();
    seed(&db, &ctx).await;

    let err = db
        .fetch_one(&ctx, "SELECT * FROM users WHERE id = 404")
        .await
        .unwrap_err();
    assert!(is_no_rows(&err));
    assert!(db
        .fetch_optional(&ctx, "SELECT * FROM users WHERE id = 404")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn expired_deadline_fails_fast() {
    let db = guarded_sqlite().await;
    let ctx = OpContext::background().with_timeout(Duration::ZERO);

    let err = db.fetch_all(&ctx, "SELECT 1").await.unwrap_err();
    assert!(err.is(&DatasourceError::Timeout(Duration::ZERO)));
}

#[tokio::test]
async fn file_database_persists_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.db");
    let ctx = OpContext::background();

    let first = Database::builder(DatasourceConfig::new("sqlite3").with_path(&path))
        .pool_config(pool())
        .open()
        .await
        .unwrap();
    seed(&first, &ctx).await;
    first.close().await;

    let second = Database::builder(DatasourceConfig::new("sqlite").with_path(&path))
        .pool_config(pool())
        .open()
        .await
        .unwrap();
    assert_eq!(count_users(&second, &ctx).await, 3);
}

#[tokio::test]
async fn unsupported_dialect_lists_registered_ones() {
    let err = Database::builder(DatasourceConfig::new("oracle"))
        .open()
        .await
        .unwrap_err();
    assert!(err.is(&DatasourceError::UnsupportedDialectType(String::new())));
    assert_eq!(err.context("supported_dialects"), Some("mysql, postgres, sqlite"));

    let mut only_sqlite = ProviderRegistry::new();
    only_sqlite.register(Arc::new(SqliteProvider::new()));
    let err = Database::builder(DatasourceConfig::new("postgres").with_database("orders"))
        .registry(Arc::new(only_sqlite))
        .open()
        .await
        .unwrap_err();
    assert_eq!(err.context("supported_dialects"), Some("sqlite"));
}

#[tokio::test]
async fn provider_validation_is_fatal() {
    let err = Database::builder(DatasourceConfig::new("postgres"))
        .open()
        .await
        .unwrap_err();
    assert_eq!(err.operation(), Operation::Validate);
    assert!(err.is(&DatasourceError::MissingDatabaseName));

    let err = Database::builder(DatasourceConfig::new("mysql").with_database("orders"))
        .open()
        .await
        .unwrap_err();
    assert!(err.is(&DatasourceError::MissingUser));
}

#[tokio::test]
async fn lifecycle_start_fails_when_server_is_unreachable() {
    let db = Database::builder(
        DatasourceConfig::new("postgres")
            .with_host("127.0.0.1")
            .with_port(1)
            .with_database("orders"),
    )
    .pool_config(pool())
    .acquire_timeout(Duration::from_millis(200))
    .logger(Logger::disabled())
    .open()
    .await
    .unwrap();

    let mut lifecycle = Lifecycle::new(Logger::disabled());
    lifecycle.append(Arc::new(
        db.lifecycle_hook().with_ping_timeout(Duration::from_millis(500)),
    ));

    let err = lifecycle.start(&OpContext::background()).await.unwrap_err();
    let cause = err.database_error().unwrap();
    assert_eq!(cause.operation(), Operation::Ping);
    assert_eq!(cause.dialect(), Some("postgres"));
    assert_eq!(cause.category(), ErrorCategory::Connectivity);
}

#[tokio::test]
async fn lifecycle_stop_closes_the_pool() {
    let db = guarded_sqlite().await;
    let mut lifecycle = Lifecycle::new(Logger::disabled());
    lifecycle.append(Arc::new(db.lifecycle_hook()));
    let ctx = OpContext::background();

    lifecycle.start(&ctx).await.unwrap();
    lifecycle.stop(&ctx).await.unwrap();

    assert!(db.is_closed());
    assert!(db.fetch_all(&ctx, "SELECT 1").await.is_err());
}

#[tokio::test]
async fn opens_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("app.db");
    let config_path = dir.path().join("datagate.json");
    let doc = serde_json::json!({
        "datasource": { "type": "sqlite", "path": db_path, "enable_sql_guard": true },
        "pool": { "max_idle_conns": 1, "max_open_conns": 2 },
        "connector": { "foreign_keys": "ON" },
        "logging": { "format": "json" }
    });
    std::fs::write(&config_path, doc.to_string()).unwrap();

    let db = DatagateConfig::load(&config_path)
        .unwrap()
        .into_builder()
        .logger(Logger::disabled())
        .open()
        .await
        .unwrap();
    let ctx = OpContext::background();

    assert_eq!(db.pool_config().max_open_conns, 2);
    assert_eq!(db.raw().max_connections(), 2);
    assert!(db.guard().is_some());

    let row = db.fetch_one(&ctx, "PRAGMA foreign_keys").await.unwrap();
    assert_eq!(row.get_index(0).and_then(Value::as_i64), Some(1));
    assert!(db_path.exists());
}
