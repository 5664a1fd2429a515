//! Adapter construction from `[warehouse]` configuration

use crate::adapter::{QueryError, WarehouseAdapter};
use crate::mock::MockAdapter;
use crate::postgres::PostgresAdapter;
use sourcefresh_core::{Config, WarehouseConfig};
use std::path::Path;
use std::sync::Arc;

/// Build the adapter named by `warehouse.type`.
///
/// - `mock`: requires `fixture`, a JSON file resolved against the project root
/// - `postgres`: either `connection_string`, or `host`, `dbname`, `user`,
///   `password` and optional `port`; `sslmode = "require"` enables TLS
///
/// Either type accepts `max_connections`, which caps the worker pool.
pub async fn connect(
    warehouse: &WarehouseConfig,
    config: &Config,
) -> Result<Arc<dyn WarehouseAdapter>, QueryError> {
    let setting = |key: &str| {
        warehouse
            .require(key)
            .map_err(|e| QueryError::ConfigError(e.to_string()))
    };

    let max_connections = connection_limit(warehouse)?;

    match warehouse.warehouse_type.to_lowercase().as_str() {
        "mock" => {
            let fixture = config.resolve_path(Path::new(setting("fixture")?));
            tracing::debug!(fixture = %fixture.display(), "Loading mock warehouse");
            let mut adapter = MockAdapter::from_fixture_file(&fixture)?;
            if let Some(limit) = max_connections {
                adapter = adapter.with_max_connections(limit);
            }
            Ok(Arc::new(adapter))
        }
        "postgres" | "postgresql" | "redshift" => {
            let tls = warehouse
                .settings
                .get("sslmode")
                .is_some_and(|mode| mode != "disable" && mode != "prefer");

            let mut adapter = if let Some(conn_str) = warehouse.settings.get("connection_string") {
                if tls {
                    PostgresAdapter::from_connection_string_with_tls(conn_str).await?
                } else {
                    PostgresAdapter::from_connection_string(conn_str).await?
                }
            } else {
                let port = match warehouse.settings.get("port") {
                    Some(port) => port
                        .parse()
                        .map_err(|_| QueryError::ConfigError(format!("Invalid port '{}'", port)))?,
                    None => 5432,
                };
                let (host, dbname, user, password) =
                    (setting("host")?, setting("dbname")?, setting("user")?, setting("password")?);

                if tls {
                    PostgresAdapter::connect_with_tls(host, port, dbname, user, password).await?
                } else {
                    PostgresAdapter::connect(host, port, dbname, user, password).await?
                }
            };

            if let Some(limit) = max_connections {
                adapter = adapter.with_max_connections(limit);
            }

            tracing::debug!(
                host = adapter.host(),
                database = adapter.database(),
                max_connections = ?max_connections,
                "Connected to PostgreSQL"
            );
            Ok(Arc::new(adapter))
        }
        other => Err(QueryError::ConfigError(format!(
            "Unsupported warehouse type '{}' (expected mock or postgres)",
            other
        ))),
    }
}

/// Optional positive `max_connections` setting
fn connection_limit(warehouse: &WarehouseConfig) -> Result<Option<usize>, QueryError> {
    let Some(raw) = warehouse.settings.get("max_connections") else {
        return Ok(None);
    };
    match raw.parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(Some(limit)),
        _ => Err(QueryError::ConfigError(format!(
            "Invalid max_connections '{}' (expected a positive integer)",
            raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn warehouse(kind: &str, settings: &[(&str, &str)]) -> WarehouseConfig {
        WarehouseConfig {
            warehouse_type: kind.to_string(),
            settings: settings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn test_connect_mock_fixture() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("warehouse.json"),
            r#"{"tables": {"analytics.orders": [{"updated_at": "2024-01-01T00:00:00Z"}]}}"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.project_root = dir.path().to_path_buf();

        let adapter = connect(&warehouse("mock", &[("fixture", "warehouse.json")]), &config)
            .await
            .unwrap();
        assert_eq!(adapter.name(), "Mock");
        assert!(adapter.test_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_errors() {
        let config = Config::default();

        let missing = connect(&warehouse("mock", &[]), &config).await.err().unwrap();
        assert!(missing.to_string().contains("fixture"));

        let unknown = connect(&warehouse("oracle", &[]), &config).await.err().unwrap();
        assert!(matches!(unknown, QueryError::ConfigError(_)));

        let bad_port = connect(&warehouse("postgres", &[("port", "abc")]), &config)
            .await
            .err()
            .unwrap();
        assert!(bad_port.to_string().contains("Invalid port"));

        for raw in ["0", "many"] {
            let bad_limit = connect(&warehouse("postgres", &[("max_connections", raw)]), &config)
                .await
                .err()
                .unwrap();
            assert!(bad_limit.to_string().contains("Invalid max_connections"));
        }
    }

    #[tokio::test]
    async fn test_connect_reports_connection_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("warehouse.json"), r#"{"tables": {}}"#).unwrap();

        let mut config = Config::default();
        config.project_root = dir.path().to_path_buf();

        let unbounded = connect(&warehouse("mock", &[("fixture", "warehouse.json")]), &config)
            .await
            .unwrap();
        assert_eq!(unbounded.max_connections(), None);

        let bounded = connect(
            &warehouse("mock", &[("fixture", "warehouse.json"), ("max_connections", "3")]),
            &config,
        )
        .await
        .unwrap();
        assert_eq!(bounded.max_connections(), Some(3));
    }
}
