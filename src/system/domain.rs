//! Módulo de configuración central y gestión del entorno de ejecución.
//!
//! Este módulo actúa como la fuente única de verdad para la configuración del monitor.
//! Se encarga de leer las variables de entorno, establecer valores por defecto seguros
//! y proveer las estructuras necesarias para iniciar los subsistemas (Sensores, Base de
//! Datos, Notificaciones, Logging).
//!
//! # Funcionalidades Principales
//! * **Carga de Configuración:** Lee de `.env` en desarrollo y variables de sistema en producción.
//! * **Observabilidad:** Configura `tracing_subscriber` para logs estructurados o legibles.
//! * **Taxonomía de Errores:** Tipos de error de cada colaborador externo.
//! * **Señales:** Traduce SIGINT/SIGTERM en una petición de parada cooperativa.
//!


use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use crate::config::circuits::DEFAULT_CONFIG_PATH;


/// Código de salida para una parada ordenada.
pub const EXIT_OK: u8 = 0;
/// Código de salida para un fallo durante la ejecución.
pub const EXIT_RUNTIME_FAILURE: u8 = 1;
/// Código de salida cuando el servicio nunca llegó a arrancar.
pub const EXIT_STARTUP_FAILURE: u8 = 2;


/// Umbrales de alerta de los circuitos de calefacción.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitThresholds {
    /// Temperatura de impulsión a partir de la cual se considera sobrecalentamiento.
    pub overheat_flow: f64,
    /// Diferencia por debajo de la cual un circuito caliente se considera ineficiente.
    pub low_efficiency_difference: f64,
    /// Impulsión mínima para evaluar la eficiencia (evita marcar circuitos fríos).
    pub low_efficiency_min_flow: f64,
}

impl Default for CircuitThresholds {
    fn default() -> Self {
        Self {
            overheat_flow: 80.0,
            low_efficiency_difference: 3.0,
            low_efficiency_min_flow: 30.0,
        }
    }
}


/// Límites ambientales de la sala de calderas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomLimits {
    /// Temperatura mínima (protección antiheladas).
    pub temp_min: f64,
    /// Temperatura máxima (sobrecalentamiento).
    pub temp_max: f64,
    /// Humedad relativa máxima (riesgo de condensación).
    pub humidity_max: f64,
}

impl Default for RoomLimits {
    fn default() -> Self {
        Self {
            temp_min: 5.0,
            temp_max: 35.0,
            humidity_max: 80.0,
        }
    }
}


/// Representa la configuración global del sistema y el estado del entorno.
///
/// Esta estructura centraliza todas las variables de entorno y configuraciones
/// necesarias para iniciar los servicios.
#[derive(Debug, Clone)]
pub struct System {
    /// URL de conexión a PostgreSQL (ej. `user:pass@localhost:5432/db`).
    /// **Requerido**.
    pub database_url: String,

    /// Tamaño máximo del pool de conexiones a la base de datos.
    /// Por defecto: `5`.
    pub db_pool_size: u32,

    /// Intervalo fijo del ciclo de monitorización.
    /// Por defecto: `30` segundos.
    pub monitoring_interval: Duration,

    /// Documento YAML con la definición de los circuitos.
    pub circuits_config: PathBuf,

    /// Raíz sysfs del bus one-wire.
    pub w1_devices_path: PathBuf,

    /// Habilita el sensor opcional de la sala de calderas.
    pub room_sensor_enabled: bool,
    pub room_sensor_path: PathBuf,
    pub room_sensor_name: String,

    pub room_limits: RoomLimits,
    pub circuit_thresholds: CircuitThresholds,

    /// Transporte SMTP con STARTTLS. `smtp_user` es también el remitente.
    pub email_enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub alert_email: String,

    pub discord_enabled: bool,
    pub discord_webhook_url: String,

    pub telegram_enabled: bool,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub telegram_api_url: String,

    /// Zona horaria usada en el texto de las notificaciones.
    pub alert_timezone: Tz,

    /// Entorno de ejecución actual (`development`, `staging`, `production`).
    /// Afecta el formato de logs y la carga de archivos `.env`.
    pub environment: String,

    /// Nivel de detalle de los logs (ej. `info`, `debug`, `warn`).
    /// Se autoconfigura según el `environment` si no se especifica.
    pub rust_log: String,
}


impl System {

    /// Carga la configuración desde las variables de entorno.
    ///
    /// # Comportamiento
    /// * Si `ENVIRONMENT` es "development", intenta cargar un archivo `.env`.
    /// * Establece valores por defecto para variables opcionales.
    ///
    /// # Errores
    /// * `ConfigError::Missing` si `DATABASE_URL` no está definida.
    /// * `ConfigError::Invalid` si una variable numérica o booleana no es válida.
    pub fn new() -> Result<Self, ConfigError> {

        let environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".into());

        if environment == "development" {
            dotenv::dotenv().ok();
        }

        let defaults_room = RoomLimits::default();
        let defaults_circuit = CircuitThresholds::default();

        let interval_secs: u64 = parse_var("MONITORING_INTERVAL", 30)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "MONITORING_INTERVAL",
                value: "0".to_string(),
            });
        }

        let timezone_raw = env::var("ALERT_TIMEZONE")
            .unwrap_or_else(|_| "Europe/Berlin".to_string());
        let alert_timezone = Tz::from_str(&timezone_raw)
            .map_err(|_| ConfigError::Invalid { name: "ALERT_TIMEZONE", value: timezone_raw.clone() })?;

        Ok(System {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            db_pool_size: parse_var("DB_POOL_SIZE", 5)?,

            monitoring_interval: Duration::from_secs(interval_secs),

            circuits_config: env::var("CIRCUITS_CONFIG")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
                .into(),

            w1_devices_path: env::var("W1_DEVICES_PATH")
                .unwrap_or_else(|_| "/sys/bus/w1/devices".to_string())
                .into(),

            room_sensor_enabled: parse_var("ROOM_SENSOR_ENABLED", true)?,
            room_sensor_path: env::var("ROOM_SENSOR_PATH")
                .unwrap_or_else(|_| "/sys/bus/iio/devices/iio:device0".to_string())
                .into(),
            room_sensor_name: env::var("ROOM_SENSOR_NAME")
                .unwrap_or_else(|_| "sala_calderas".to_string()),

            room_limits: RoomLimits {
                temp_min: parse_var("ROOM_TEMP_MIN", defaults_room.temp_min)?,
                temp_max: parse_var("ROOM_TEMP_MAX", defaults_room.temp_max)?,
                humidity_max: parse_var("ROOM_HUMIDITY_MAX", defaults_room.humidity_max)?,
            },

            circuit_thresholds: CircuitThresholds {
                overheat_flow: parse_var("OVERHEAT_FLOW_TEMP", defaults_circuit.overheat_flow)?,
                low_efficiency_difference: parse_var("LOW_EFFICIENCY_DIFF", defaults_circuit.low_efficiency_difference)?,
                low_efficiency_min_flow: parse_var("LOW_EFFICIENCY_MIN_FLOW", defaults_circuit.low_efficiency_min_flow)?,
            },

            email_enabled: parse_var("ALERT_EMAIL_ENABLED", false)?,
            smtp_server: env::var("SMTP_SERVER")
                .unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            smtp_port: parse_var("SMTP_PORT", 587)?,
            smtp_user: env::var("SMTP_USER").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            alert_email: env::var("ALERT_EMAIL").unwrap_or_default(),

            discord_enabled: parse_var("DISCORD_ENABLED", false)?,
            discord_webhook_url: env::var("DISCORD_WEBHOOK_URL").unwrap_or_default(),

            telegram_enabled: parse_var("TELEGRAM_ENABLED", false)?,
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").unwrap_or_default(),
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),

            alert_timezone,

            rust_log: env::var("RUST_LOG")
                .unwrap_or_else(|_| {
                    match environment.as_str() {
                        "development" => "debug".to_string(),
                        "staging" => "info".to_string(),
                        _ => "warn".to_string(),
                    }
                }),

            environment,
        })
    }
}


/// Lee una variable de entorno y la convierte al tipo pedido, usando `default` si no existe.
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}


fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .to_lowercase()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value: raw.to_string() })
}


/// Errores de configuración. Siempre fatales durante el arranque.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("variable requerida no configurada: {0}")]
    Missing(&'static str),

    #[error("valor inválido para {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("no se pudo leer {path}: {source}")]
    Unreadable { path: PathBuf, source: std::io::Error },

    #[error("documento de circuitos mal formado en {path}: {source}")]
    Malformed { path: PathBuf, source: serde_yaml::Error },

    #[error("circuito {0:?} duplicado en la configuración")]
    DuplicateCircuit(String),
}


/// Fallo de lectura de un sensor. Nunca se propaga más allá del circuito.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("sensor {0} no encontrado")]
    NotFound(String),

    #[error("error de E/S en el sensor {sensor}: {reason}")]
    Io { sensor: String, reason: String },

    #[error("lectura ilegible en el sensor {sensor}: {raw:?}")]
    Parse { sensor: String, raw: String },

    #[error("CRC inválido en el sensor {0}")]
    CrcMismatch(String),

    #[error("valor fuera de rango en el sensor {sensor}: {value}")]
    Implausible { sensor: String, value: f64 },

    #[error("tiempo de lectura agotado en el sensor {0}")]
    Timeout(String),

    #[error("sensor no disponible: {0}")]
    Unavailable(String),
}


/// Fallo de persistencia. Se registra por escritura y no aborta el ciclo.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no se pudo conectar al almacén: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("consulta fallida: {0}")]
    Query(#[from] sqlx::Error),

    #[error("tiempo de escritura agotado")]
    Timeout,
}


/// Fallo de un transporte de notificación. Los demás transportes se siguen intentando.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("error HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("respuesta inesperada: {0}")]
    Status(reqwest::StatusCode),

    #[error("error SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("dirección de correo inválida: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("no se pudo construir el correo: {0}")]
    Email(String),

    #[error("tiempo de envío agotado")]
    Timeout,

    #[error("transporte sin configurar: {0}")]
    NotConfigured(&'static str),
}


/// Fallo de un colaborador obligatorio durante el arranque.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("registro de circuitos: {0}")]
    Registry(#[from] ConfigError),

    #[error("almacén de series temporales: {0}")]
    Store(#[from] StoreError),
}


/// Fallo inesperado dentro de un ciclo. El ciclo se abandona y el bucle continúa.
#[derive(Debug, thiserror::Error)]
pub enum CycleFailure {
    #[error("el ciclo entró en pánico: {0}")]
    Panicked(String),

    #[error("el ciclo fue cancelado")]
    Cancelled,
}


/// Inicializa el sistema de trazabilidad y logs (Tracing).
///
/// Configura el formato de salida basándose en el entorno:
/// * **Production**: Salida JSON (para logs estructurados).
/// * **Development/Otros**: Salida "Pretty" (colores y formato legible).
pub fn init_tracing(system: &System) {

    let filter = EnvFilter::try_new(&system.rust_log)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter).with_target(false);

    if system.environment == "production" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}


/// Espera la primera señal de parada y devuelve su nombre.
///
/// Si SIGINT no pudo registrarse se sigue esperando SIGTERM.
async fn first_stop_signal<I, T>(interrupt: I, terminate: T) -> &'static str
where
    I: Future<Output = std::io::Result<()>>,
    T: Future<Output = ()>,
{
    tokio::pin!(terminate);

    let interrupted = tokio::select! {
        result = interrupt => Some(result),
        _ = &mut terminate => None,
    };

    match interrupted {
        Some(Ok(())) => "SIGINT",
        Some(Err(e)) => {
            error!("Error: no se pudo escuchar SIGINT: {e}");
            terminate.await;
            "SIGTERM"
        }
        None => "SIGTERM",
    }
}


/// Espera SIGINT o SIGTERM y publica la petición de parada en el canal `watch`.
async fn wait_for_signal(tx: watch::Sender<bool>) {

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => { sigterm.recv().await; }
            Err(e) => {
                error!("Error: no se pudo registrar SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = first_stop_signal(tokio::signal::ctrl_c(), terminate).await;
    info!("Info: {signal} recibido, deteniendo monitor");

    let _ = tx.send(true);
}


/// Lanza la tarea que escucha señales del sistema operativo.
pub fn start_signal_listener(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        wait_for_signal(tx).await;
    });
}
