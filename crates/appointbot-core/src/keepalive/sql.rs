use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection};
use tiberius::{AuthMethod, Client, Config as TdsConfig, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use crate::config::{DatabaseConfig, DatabaseEngine};
use crate::error::DatabaseError;

use super::DatabaseProbe;

/// Liveness query sent on every probe.
pub const KEEPALIVE_QUERY: &str = "SELECT 1";

const APPLICATION_NAME: &str = "appointbot-keepalive";

/// Build the probe for the configured engine.
pub fn probe_for(config: &DatabaseConfig) -> Arc<dyn DatabaseProbe> {
    match config.engine {
        DatabaseEngine::SqlServer => Arc::new(SqlServerProbe::new(config)),
        DatabaseEngine::Postgres => Arc::new(PostgresProbe::new(config)),
    }
}

type TdsClient = Client<Compat<TcpStream>>;

/// SQL Server probe over an encrypted TDS connection, opened fresh per call.
pub struct SqlServerProbe {
    config: TdsConfig,
}

impl SqlServerProbe {
    pub fn new(db: &DatabaseConfig) -> Self {
        let mut config = TdsConfig::new();
        config.host(&db.server);
        config.port(db.port());
        config.database(&db.database);
        config.authentication(AuthMethod::sql_server(&db.user, &db.password));
        config.encryption(EncryptionLevel::Required);
        config.application_name(APPLICATION_NAME);
        Self { config }
    }

    /// `host:port` the probe dials.
    pub fn addr(&self) -> String {
        self.config.get_addr()
    }

    async fn connect(&self) -> Result<TdsClient, DatabaseError> {
        let tcp = open_tcp(&self.config.get_addr()).await?;
        match Client::connect(self.config.clone(), tcp.compat_write()).await {
            Ok(client) => Ok(client),
            // Azure SQL gateways may redirect to the node hosting the database.
            Err(tiberius::error::Error::Routing { host, port }) => {
                debug!("Keep-alive redirected to {}:{}", host, port);
                let mut config = self.config.clone();
                config.host(&host);
                config.port(port);
                let tcp = open_tcp(&config.get_addr()).await?;
                Client::connect(config, tcp.compat_write())
                    .await
                    .map_err(|e| DatabaseError::Connect(e.to_string()))
            }
            Err(e) => Err(DatabaseError::Connect(e.to_string())),
        }
    }
}

async fn open_tcp(addr: &str) -> Result<TcpStream, DatabaseError> {
    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|e| DatabaseError::Connect(e.to_string()))?;
    tcp.set_nodelay(true)
        .map_err(|e| DatabaseError::Connect(e.to_string()))?;
    Ok(tcp)
}

async fn select_one(client: &mut TdsClient) -> Result<Vec<i32>, DatabaseError> {
    let query_error = |e: tiberius::error::Error| DatabaseError::Query(e.to_string());
    let rows = client
        .simple_query(KEEPALIVE_QUERY)
        .await
        .map_err(query_error)?
        .into_first_result()
        .await
        .map_err(query_error)?;

    let mut values = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(v) = row.try_get::<i32, _>(0).map_err(query_error)? {
            values.push(v);
        }
    }
    Ok(values)
}

#[async_trait]
impl DatabaseProbe for SqlServerProbe {
    async fn ping(&self) -> Result<Vec<i32>, DatabaseError> {
        let mut client = self.connect().await?;
        let result = select_one(&mut client).await;

        // Closed on both paths; a failed close does not change the outcome.
        if let Err(e) = client.close().await {
            warn!("Failed to close keep-alive connection: {}", e);
        } else {
            debug!("Keep-alive connection closed");
        }

        result
    }
}

/// Postgres probe backed by a fresh `sqlx` connection per call.
pub struct PostgresProbe {
    options: PgConnectOptions,
}

impl PostgresProbe {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.server)
            .port(config.port())
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .ssl_mode(PgSslMode::Require)
            .application_name(APPLICATION_NAME);
        Self { options }
    }
}

#[async_trait]
impl DatabaseProbe for PostgresProbe {
    async fn ping(&self) -> Result<Vec<i32>, DatabaseError> {
        let mut conn = self
            .options
            .connect()
            .await
            .map_err(|e| DatabaseError::Connect(e.to_string()))?;

        let result = sqlx::query_scalar::<_, i32>(KEEPALIVE_QUERY)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()));

        if let Err(e) = conn.close().await {
            warn!("Failed to close keep-alive connection: {}", e);
        } else {
            debug!("Keep-alive connection closed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(engine: DatabaseEngine, port: Option<u16>) -> DatabaseConfig {
        DatabaseConfig {
            engine,
            user: "keeper".into(),
            password: "secret".into(),
            server: "127.0.0.1".into(),
            database: "clinic".into(),
            port,
        }
    }

    /// A local port with nothing listening on it.
    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_sql_server_defaults_to_1433() {
        let probe = SqlServerProbe::new(&config(DatabaseEngine::SqlServer, None));
        assert_eq!(probe.addr(), "127.0.0.1:1433");

        let probe = SqlServerProbe::new(&config(DatabaseEngine::SqlServer, Some(14330)));
        assert_eq!(probe.addr(), "127.0.0.1:14330");
    }

    #[test]
    fn test_postgres_options_from_config() {
        let probe = PostgresProbe::new(&config(DatabaseEngine::Postgres, None));
        assert_eq!(probe.options.get_host(), "127.0.0.1");
        assert_eq!(probe.options.get_port(), 5432);
        assert_eq!(probe.options.get_username(), "keeper");
        assert_eq!(probe.options.get_database(), Some("clinic"));
    }

    #[tokio::test]
    async fn test_sql_server_unreachable_is_connect_error() {
        let port = closed_port().await;
        let probe = probe_for(&config(DatabaseEngine::SqlServer, Some(port)));
        assert!(matches!(probe.ping().await, Err(DatabaseError::Connect(_))));
    }

    #[tokio::test]
    async fn test_postgres_unreachable_is_connect_error() {
        let port = closed_port().await;
        let probe = probe_for(&config(DatabaseEngine::Postgres, Some(port)));
        assert!(matches!(probe.ping().await, Err(DatabaseError::Connect(_))));
    }
}
