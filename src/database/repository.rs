use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tokio::time::{sleep, timeout};
use crate::config::postgres::{CONNECT_ATTEMPTS, WAIT_FOR, WRITE_TIMEOUT};
use crate::database::domain::DataPoint;
use crate::database::tables::points::{create_table_points, insert_points};
use crate::system::domain::StoreError;


/// Almacén de series temporales en el que el monitor escribe cada ciclo.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn write_points(&self, points: Vec<DataPoint>) -> Result<(), StoreError>;

    async fn close(&self);
}


#[derive(Clone, Debug)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub async fn new(database_url: &str, pool_size: u32) -> Result<Self, StoreError> {
        let pool = create_pool(database_url, pool_size).await.map_err(StoreError::Connect)?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Conecta con reintentos acotados. Agotados los intentos, el almacén es
    /// un colaborador obligatorio y el arranque falla.
    pub async fn create_repository(database_url: &str, pool_size: u32) -> Result<Self, StoreError> {
        let mut attempt = 1;
        loop {
            match Self::new(database_url, pool_size).await {
                Ok(repo) => {
                    info!("Info: conexión con el almacén establecida");
                    return Ok(repo);
                }
                Err(e) if attempt < CONNECT_ATTEMPTS => {
                    warn!(attempt, "Warning: error inicializando repo: {e}");
                    attempt += 1;
                    sleep(WAIT_FOR).await;
                }
                Err(e) => {
                    error!(attempt, "Error: no se pudo inicializar el repo: {e}");
                    return Err(e);
                }
            }
        }
    }
}


#[async_trait]
impl TimeSeriesStore for Repository {
    async fn write_points(&self, points: Vec<DataPoint>) -> Result<(), StoreError> {
        match timeout(WRITE_TIMEOUT, insert_points(&self.pool, points)).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Info: conexión con el almacén cerrada");
    }
}


async fn create_pool(db_path: &str, pool_size: u32) -> Result<PgPool, sqlx::Error> {
    let database_url = if db_path.starts_with("postgres://") || db_path.starts_with("postgresql://") {
        db_path.to_string()
    } else {
        format!("postgres://{}", db_path)
    };

    let pool = PgPoolOptions::new()
        .max_connections(pool_size)
        .acquire_timeout(WRITE_TIMEOUT)
        .connect(&database_url)
        .await?;

    Ok(pool)
}


async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    create_table_points(pool).await?;
    Ok(())
}
