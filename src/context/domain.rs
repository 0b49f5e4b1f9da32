//! Definición del Contexto de Aplicación (Shared State).
//!
//! El `AppContext` actúa como un contenedor de "Inyección de Dependencias" manual:
//! agrupa los colaboradores que el planificador necesita en cada ciclo (registro
//! de circuitos, almacén, sensor ambiente, transportes y `AlertGate`). Se
//! construye una vez en el arranque y se clona barato (solo `Arc`s) hacia la
//! tarea de cada ciclo.


use std::sync::Arc;
use tracing::{error, info, warn};
use crate::alerts::domain::AlertGate;
use crate::alerts::logic::{build_notifiers, Notifier};
use crate::circuit::logic::{Bootstrap, CircuitRegistry};
use crate::database::repository::{Repository, TimeSeriesStore};
use crate::sensors::domain::{HumiditySource, TemperatureSource};
use crate::sensors::logic::{bus_present, IioHumiditySensor, OneWireBus};
use crate::system::domain::{StartupError, System};


#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<CircuitRegistry>,
    pub store: Arc<dyn TimeSeriesStore>,
    pub room_sensor: Option<Arc<dyn HumiditySource>>,
    pub notifiers: Arc<Vec<Box<dyn Notifier>>>,
    pub gate: Arc<AlertGate>,
    pub system: Arc<System>,
}


impl AppContext {

    /// Construye los colaboradores del monitor.
    ///
    /// # Errores
    /// * Registro de circuitos y almacén son obligatorios: su fallo es fatal.
    /// * El sensor ambiente es opcional: su fallo se registra y el servicio
    ///   continúa sin esa capacidad.
    pub async fn new(system: System) -> Result<Self, StartupError> {

        let registry = load_registry(&system).await?;

        let store: Arc<dyn TimeSeriesStore> = Arc::new(
            Repository::create_repository(&system.database_url, system.db_pool_size).await?
        );

        let room_sensor = open_room_sensor(&system);
        let notifiers = Arc::new(build_notifiers(&system));

        Ok(Self {
            registry,
            store,
            room_sensor,
            notifiers,
            gate: Arc::new(AlertGate::default()),
            system: Arc::new(system),
        })
    }

    /// Libera sensor y almacén. Se llama una única vez al detener el servicio.
    pub async fn shutdown(&self) {
        if let Some(sensor) = &self.room_sensor {
            sensor.cleanup().await;
        }
        self.store.close().await;
    }
}


/// Carga el registro sobre el bus one-wire y ejecuta la verificación inicial.
async fn load_registry(system: &System) -> Result<Arc<CircuitRegistry>, StartupError> {

    if !bus_present(&system.w1_devices_path) {
        warn!("Warning: bus one-wire no encontrado en {}", system.w1_devices_path.display());
    }
    let bus: Arc<dyn TemperatureSource> = Arc::new(OneWireBus::new(&system.w1_devices_path));

    let outcome = CircuitRegistry::load(&system.circuits_config, bus).await?;
    match &outcome.bootstrap {
        Some(Bootstrap::TemplateWritten(path)) => {
            warn!("Warning: usando plantilla recién creada en {}", path.display());
        }
        Some(Bootstrap::TemplateNotPersisted { path, reason }) => {
            warn!("Warning: usando plantilla en memoria; {} no se pudo escribir: {}", path.display(), reason);
        }
        None => {}
    }
    let registry = Arc::new(outcome.registry);

    let failed = registry.self_test().await.iter().filter(|c| !c.passed()).count();
    if failed > 0 {
        warn!("Warning: {failed} de {} circuitos no superaron la verificación inicial", registry.count());
    }

    Ok(registry)
}


/// Sensor ambiente opcional. Un fallo se registra y devuelve `None`.
fn open_room_sensor(system: &System) -> Option<Arc<dyn HumiditySource>> {
    if !system.room_sensor_enabled {
        info!("Info: sensor ambiente deshabilitado");
        return None;
    }

    match IioHumiditySensor::new(&system.room_sensor_name, &system.room_sensor_path) {
        Ok(sensor) => {
            info!("Info: sensor ambiente {} inicializado", system.room_sensor_name);
            Some(Arc::new(sensor) as Arc<dyn HumiditySource>)
        }
        Err(e) => {
            error!("Error: sensor ambiente no disponible, se continúa sin él: {e}");
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::system::domain::ConfigError;
    use crate::test_support::test_system;

    #[test]
    fn missing_room_sensor_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut system = test_system(Duration::from_secs(30));
        system.room_sensor_enabled = true;
        system.room_sensor_path = dir.path().join("iio:device9");

        assert!(open_room_sensor(&system).is_none());
    }

    #[test]
    fn present_room_sensor_is_opened() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in_humidityrelative_input"), "50000\n").unwrap();
        let mut system = test_system(Duration::from_secs(30));
        system.room_sensor_path = dir.path().to_path_buf();

        assert!(open_room_sensor(&system).is_none());

        system.room_sensor_enabled = true;
        assert_eq!(open_room_sensor(&system).unwrap().name(), "sala_calderas");
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_registry_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("circuits.yaml");
        std::fs::write(&path, "heating_circuits: [").unwrap();
        let mut system = test_system(Duration::from_secs(30));
        system.circuits_config = path;

        let err = load_registry(&system).await.unwrap_err();
        assert!(matches!(err, StartupError::Registry(ConfigError::Malformed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn registry_loads_without_a_bus() {
        let dir = tempfile::tempdir().unwrap();
        let mut system = test_system(Duration::from_secs(30));
        system.circuits_config = dir.path().join("heating_circuits.yaml");

        let registry = load_registry(&system).await.unwrap();
        assert_eq!(registry.count(), 3);
    }
}
