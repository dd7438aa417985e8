use crate::config::FactoryConfig;
use crate::db::models::DatabaseCredentials;
use crate::error::KeywayError;
use crate::secret::{SecretResolver, SecretStore};
use crate::service::credential_loader::CredentialLoader;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Error as SqlxError};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const MYSQL_PORT: u16 = 3306;

macro_rules! session_time_zone {
    () => {
        "Europe/London"
    };
}

pub const SESSION_TIME_ZONE: &str = session_time_zone!();
pub const SESSION_SETUP: &str = concat!("SET time_zone = '", session_time_zone!(), "'");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Socket { path: PathBuf },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp({host}:{port})"),
            Self::Socket { path } => write!(f, "unix({})", path.display()),
        }
    }
}

/// Everything needed to open one MySQL session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub username: String,
    pub password: String,
    pub endpoint: Endpoint,
    pub database: String,
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionTarget {
    /// go-mysql style DSN. Contains the password; do not log it.
    pub fn dsn(&self) -> String {
        let Self {
            username,
            password,
            endpoint,
            database,
        } = self;
        match endpoint {
            Endpoint::Tcp { .. } => {
                format!("{username}:{password}@{endpoint}/{database}?autocommit=true&parseTime=true")
            }
            Endpoint::Socket { .. } => {
                format!("{username}:{password}@{endpoint}/{database}?parseTime=true&autocommit=true")
            }
        }
    }

    /// sqlx counterpart of [`Self::dsn`]. Autocommit stays at the server default
    /// (on) and the factory never opens a transaction.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let opts = MySqlConnectOptions::new()
            .username(&self.username)
            .password(&self.password)
            .database(&self.database);
        match &self.endpoint {
            Endpoint::Tcp { host, port } => opts.host(host).port(*port),
            Endpoint::Socket { path } => opts.socket(path),
        }
    }
}

/// Opens and configures database sessions for the factory.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Conn: Send;

    async fn open(&self, target: &ConnectionTarget) -> Result<Self::Conn, SqlxError>;

    async fn apply(&self, conn: &mut Self::Conn, statement: &str) -> Result<(), SqlxError>;

    async fn release(&self, conn: Self::Conn) -> Result<(), SqlxError>;
}

/// Single unpooled sqlx MySQL connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialer;

#[async_trait]
impl Dialer for MySqlDialer {
    type Conn = MySqlConnection;

    async fn open(&self, target: &ConnectionTarget) -> Result<Self::Conn, SqlxError> {
        MySqlConnection::connect_with(&target.connect_options()).await
    }

    async fn apply(&self, conn: &mut Self::Conn, statement: &str) -> Result<(), SqlxError> {
        sqlx::query(statement).execute(&mut *conn).await?;
        Ok(())
    }

    async fn release(&self, conn: Self::Conn) -> Result<(), SqlxError> {
        conn.close().await
    }
}

/// Builds MySQL sessions from lazily loaded credentials.
#[derive(Debug)]
pub struct DatabaseFactory<D = MySqlDialer> {
    loader: CredentialLoader<DatabaseCredentials>,
    dialer: D,
}

impl DatabaseFactory<MySqlDialer> {
    pub fn new(config: FactoryConfig, store: Arc<dyn SecretStore>) -> Self {
        Self::with_dialer(config, store, MySqlDialer)
    }
}

impl<D: Dialer> DatabaseFactory<D> {
    pub fn with_dialer(config: FactoryConfig, store: Arc<dyn SecretStore>, dialer: D) -> Self {
        Self {
            loader: CredentialLoader::new(SecretResolver::new(config, store)),
            dialer,
        }
    }

    pub fn loader(&self) -> &CredentialLoader<DatabaseCredentials> {
        &self.loader
    }

    pub async fn ensure_loaded(&self) -> Result<&DatabaseCredentials, KeywayError> {
        self.loader.ensure_loaded().await
    }

    /// Target for the private network address on the standard port.
    pub async fn address_target(&self) -> Result<ConnectionTarget, KeywayError> {
        let creds = self.ensure_loaded().await?;
        if creds.private_host.is_empty() {
            return Err(KeywayError::MissingField {
                field: "private_host",
            });
        }
        Ok(ConnectionTarget {
            username: creds.username.clone(),
            password: creds.password.clone(),
            endpoint: Endpoint::Tcp {
                host: creds.private_host.clone(),
                port: MYSQL_PORT,
            },
            database: creds.database.clone(),
        })
    }

    /// Target for the instance socket under the configured socket directory.
    pub async fn socket_target(&self) -> Result<ConnectionTarget, KeywayError> {
        let creds = self.ensure_loaded().await?;
        if creds.host.is_empty() {
            return Err(KeywayError::MissingField { field: "host" });
        }
        let dir = self.loader.resolver().config().socket_dir();
        Ok(ConnectionTarget {
            username: creds.username.clone(),
            password: creds.password.clone(),
            endpoint: Endpoint::Socket {
                path: dir.join(&creds.host),
            },
            database: creds.database.clone(),
        })
    }

    pub async fn connect_by_address(&self) -> Result<D::Conn, KeywayError> {
        let target = self.address_target().await?;
        self.connect(&target, "address").await
    }

    pub async fn connect_by_socket(&self) -> Result<D::Conn, KeywayError> {
        let target = self.socket_target().await?;
        self.connect(&target, "socket").await
    }

    async fn connect(
        &self,
        target: &ConnectionTarget,
        strategy: &'static str,
    ) -> Result<D::Conn, KeywayError> {
        let mut conn = self.dialer.open(target).await.map_err(|e| {
            error!(strategy, endpoint = %target.endpoint, error = %e, "database open failed");
            KeywayError::Connect(e)
        })?;

        if let Err(e) = self.dialer.apply(&mut conn, SESSION_SETUP).await {
            error!(strategy, endpoint = %target.endpoint, error = %e, "session setup failed");
            if let Err(close_err) = self.dialer.release(conn).await {
                warn!(strategy, error = %close_err, "failed to release connection");
            }
            return Err(KeywayError::Connect(e));
        }

        info!(
            strategy,
            endpoint = %target.endpoint,
            database = %target.database,
            time_zone = SESSION_TIME_ZONE,
            "database connection established"
        );
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::testing::ScriptedStore;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FakeConn {
        dsn: String,
        statements: Vec<String>,
    }

    #[derive(Default)]
    struct ScriptedDialer {
        fail_open: bool,
        fail_apply: bool,
        fail_release: bool,
        opened: Mutex<Vec<String>>,
        released: AtomicUsize,
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        type Conn = FakeConn;

        async fn open(&self, target: &ConnectionTarget) -> Result<FakeConn, SqlxError> {
            self.opened.lock().unwrap().push(target.dsn());
            if self.fail_open {
                return Err(SqlxError::Protocol("connection refused".into()));
            }
            Ok(FakeConn {
                dsn: target.dsn(),
                statements: Vec::new(),
            })
        }

        async fn apply(&self, conn: &mut FakeConn, statement: &str) -> Result<(), SqlxError> {
            if self.fail_apply {
                return Err(SqlxError::Protocol("unknown time zone".into()));
            }
            conn.statements.push(statement.to_string());
            Ok(())
        }

        async fn release(&self, _conn: FakeConn) -> Result<(), SqlxError> {
            self.released.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                return Err(SqlxError::Protocol("socket already closed".into()));
            }
            Ok(())
        }
    }

    const FULL: &str =
        r#"{"instance":"proj:region:db","username":"u","password":"p","database":"d","private":"10.0.0.5"}"#;

    fn factory(body: &str, dialer: ScriptedDialer) -> DatabaseFactory<ScriptedDialer> {
        DatabaseFactory::with_dialer(
            FactoryConfig::remote("projects/p/secrets/db"),
            Arc::new(ScriptedStore::ok(body)),
            dialer,
        )
    }

    #[test]
    fn dsn_formats_match_driver_conventions() {
        let tcp = ConnectionTarget {
            username: "u".into(),
            password: "p".into(),
            endpoint: Endpoint::Tcp {
                host: "10.0.0.5".into(),
                port: MYSQL_PORT,
            },
            database: "d".into(),
        };
        assert_eq!(
            tcp.dsn(),
            "u:p@tcp(10.0.0.5:3306)/d?autocommit=true&parseTime=true"
        );

        let unix = ConnectionTarget {
            endpoint: Endpoint::Socket {
                path: PathBuf::from("/cloudsql/proj:region:db"),
            },
            ..tcp
        };
        assert_eq!(
            unix.dsn(),
            "u:p@unix(/cloudsql/proj:region:db)/d?parseTime=true&autocommit=true"
        );
        assert!(!format!("{unix:?}").contains(":p@"));
    }

    #[tokio::test]
    async fn address_connect_sets_time_zone() {
        let f = factory(FULL, ScriptedDialer::default());
        let conn = f.connect_by_address().await.unwrap();
        assert_eq!(
            conn.dsn,
            "u:p@tcp(10.0.0.5:3306)/d?autocommit=true&parseTime=true"
        );
        assert_eq!(conn.statements, vec![SESSION_SETUP.to_string()]);
    }

    #[tokio::test]
    async fn socket_connect_uses_default_dir() {
        let f = factory(FULL, ScriptedDialer::default());
        let target = f.socket_target().await.unwrap();
        assert_eq!(
            target.endpoint,
            Endpoint::Socket {
                path: Path::new("/cloudsql").join("proj:region:db")
            }
        );
        let conn = f.connect_by_socket().await.unwrap();
        assert_eq!(conn.statements, vec![SESSION_SETUP.to_string()]);
    }

    #[tokio::test]
    async fn socket_dir_override_is_honoured() {
        let f = DatabaseFactory::with_dialer(
            FactoryConfig::remote("projects/p/secrets/db").with_socket_dir("/run/mysqld"),
            Arc::new(ScriptedStore::ok(FULL)),
            ScriptedDialer::default(),
        );
        let target = f.socket_target().await.unwrap();
        assert_eq!(
            target.endpoint,
            Endpoint::Socket {
                path: PathBuf::from("/run/mysqld/proj:region:db")
            }
        );
    }

    #[tokio::test]
    async fn missing_private_host_gates_address_only() {
        let body = r#"{"instance":"h","username":"u","password":"p","database":"d"}"#;
        let f = factory(body, ScriptedDialer::default());

        assert!(matches!(
            f.connect_by_address().await.unwrap_err(),
            KeywayError::MissingField {
                field: "private_host"
            }
        ));
        assert!(f.connect_by_socket().await.is_ok());
        assert_eq!(f.dialer.opened.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_host_gates_socket_only() {
        let body = r#"{"username":"u","password":"p","database":"d","private":"10.0.0.5"}"#;
        let f = factory(body, ScriptedDialer::default());

        assert!(matches!(
            f.connect_by_socket().await.unwrap_err(),
            KeywayError::MissingField { field: "host" }
        ));
        assert!(f.connect_by_address().await.is_ok());
    }

    #[tokio::test]
    async fn open_failure_surfaces_as_connect_error() {
        let f = factory(
            FULL,
            ScriptedDialer {
                fail_open: true,
                ..ScriptedDialer::default()
            },
        );
        assert!(matches!(
            f.connect_by_address().await.unwrap_err(),
            KeywayError::Connect(_)
        ));
        assert_eq!(f.dialer.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn setup_failure_releases_the_open_handle() {
        let f = factory(
            FULL,
            ScriptedDialer {
                fail_apply: true,
                ..ScriptedDialer::default()
            },
        );
        assert!(matches!(
            f.connect_by_socket().await.unwrap_err(),
            KeywayError::Connect(_)
        ));
        assert_eq!(f.dialer.opened.lock().unwrap().len(), 1);
        assert_eq!(f.dialer.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_failure_keeps_setup_error() {
        let f = factory(
            FULL,
            ScriptedDialer {
                fail_apply: true,
                fail_release: true,
                ..ScriptedDialer::default()
            },
        );
        match f.connect_by_address().await.unwrap_err() {
            KeywayError::Connect(SqlxError::Protocol(msg)) => assert_eq!(msg, "unknown time zone"),
            other => panic!("expected setup error, got {other:?}"),
        }
        assert_eq!(f.dialer.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn session_setup_names_the_session_time_zone() {
        assert_eq!(SESSION_SETUP, format!("SET time_zone = '{SESSION_TIME_ZONE}'"));
    }

    #[tokio::test]
    async fn load_failure_is_propagated_unchanged() {
        let f = factory(r#"{"password":"p"}"#, ScriptedDialer::default());
        assert!(matches!(
            f.connect_by_address().await.unwrap_err(),
            KeywayError::Validation { field: "username" }
        ));
        assert!(f.dialer.opened.lock().unwrap().is_empty());
    }

    #[test]
    fn connect_options_carry_the_endpoint() {
        let target = ConnectionTarget {
            username: "u".into(),
            password: "p".into(),
            endpoint: Endpoint::Tcp {
                host: "10.0.0.5".into(),
                port: MYSQL_PORT,
            },
            database: "d".into(),
        };
        let opts = target.connect_options();
        assert_eq!(opts.get_host(), "10.0.0.5");
        assert_eq!(opts.get_port(), MYSQL_PORT);
        assert_eq!(opts.get_username(), "u");
        assert_eq!(opts.get_database(), Some("d"));
    }
}
