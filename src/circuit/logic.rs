//! Registro de circuitos y lectura secuencial del bus.
//!
//! El registro se carga una vez al arrancar desde el documento YAML y resuelve
//! las sondas de cada circuito contra el colaborador de sensores. Las lecturas
//! se hacen de una en una, en orden de registro, con una pausa corta entre
//! circuitos para no saturar el bus one-wire compartido.


use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use crate::circuit::domain::{CircuitReading, CircuitStatus, CircuitsDocument, HeatingCircuit};
use crate::config::sensors::{BETWEEN_CIRCUITS, BETWEEN_SENSORS};
use crate::sensors::domain::{SensorHandle, TemperatureSource};
use crate::system::domain::ConfigError;


impl HeatingCircuit {

    /// Lee impulsión y retorno. Un fallo en un lado solo anula ese lado.
    pub async fn read_temperatures(&self, source: &dyn TemperatureSource) -> CircuitReading {
        let flow = self.read_side(source, &self.flow_sensor, "impulsión").await;

        sleep(BETWEEN_SENSORS).await;

        let return_temp = self.read_side(source, &self.return_sensor, "retorno").await;

        CircuitReading::new(flow, return_temp)
    }

    async fn read_side(&self, source: &dyn TemperatureSource, handle: &SensorHandle, side: &str) -> Option<f64> {
        let id = handle.id()?;
        match source.read_temperature(id).await {
            Ok(value) => {
                debug!("Debug: {} {}: {}°C", self.name, side, value);
                Some(value)
            }
            Err(e) => {
                error!(circuit = %self.name, sensor = %id, "Error: lectura de {side} fallida: {e}");
                None
            }
        }
    }
}


/// Acción de recuperación realizada durante la carga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    /// Se escribió una plantilla porque faltaba el documento.
    TemplateWritten(PathBuf),
    /// Faltaba el documento y la plantilla no pudo escribirse; se usa en memoria.
    TemplateNotPersisted { path: PathBuf, reason: String },
}


/// Resultado de [`CircuitRegistry::load`].
#[derive(Debug)]
pub struct LoadOutcome {
    pub registry: CircuitRegistry,
    pub bootstrap: Option<Bootstrap>,
}


/// Resultado de la prueba de cableado de un circuito.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitCheck {
    pub name: String,
    pub available: bool,
    pub flow_ok: bool,
    pub return_ok: bool,
}

impl CircuitCheck {
    pub fn passed(&self) -> bool {
        self.available && self.flow_ok && self.return_ok
    }
}


/// Conjunto de circuitos configurados junto con su fuente de temperaturas.
pub struct CircuitRegistry {
    circuits: Vec<HeatingCircuit>,
    source: Arc<dyn TemperatureSource>,
}


impl std::fmt::Debug for CircuitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitRegistry")
            .field("circuits", &self.circuits)
            .finish()
    }
}


impl CircuitRegistry {

    /// Carga los circuitos desde `path`.
    ///
    /// # Comportamiento
    /// * Documento ausente: se genera la plantilla por defecto, se intenta persistir
    ///   y se informa en `bootstrap`. No es un error.
    /// * Documento ilegible o mal formado: `ConfigError`, fatal para el arranque.
    /// * Fallo del listado de sensores: todos los circuitos quedan sin enlazar.
    #[instrument(name = "load_circuits", skip(path, source), fields(path = %path.display()))]
    pub async fn load(path: &Path, source: Arc<dyn TemperatureSource>) -> Result<LoadOutcome, ConfigError> {

        let (document, bootstrap) = match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                let document: CircuitsDocument = serde_yaml::from_str(&raw)
                    .map_err(|e| ConfigError::Malformed { path: path.to_path_buf(), source: e })?;
                (document, None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Warning: configuración de circuitos no encontrada, creando plantilla");
                let document = CircuitsDocument::template();
                let bootstrap = write_template(path, &document).await;
                (document, Some(bootstrap))
            }
            Err(e) => {
                return Err(ConfigError::Unreadable { path: path.to_path_buf(), source: e });
            }
        };

        let present = match source.available_sensors().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Error: no se pudo listar el bus de sensores: {e}");
                Vec::new()
            }
        };

        let mut registry = CircuitRegistry::from_circuits(Vec::with_capacity(document.heating_circuits.len()), source);
        for (key, config) in document.heating_circuits {
            if registry.by_name(&config.name).is_some() {
                return Err(ConfigError::DuplicateCircuit(config.name));
            }

            let circuit = HeatingCircuit::from_config(config, &present);
            for (handle, id, side) in [
                (&circuit.flow_sensor, &circuit.flow_sensor_id, "impulsión"),
                (&circuit.return_sensor, &circuit.return_sensor_id, "retorno"),
            ] {
                if !handle.is_bound() {
                    warn!(circuit = %circuit.name, sensor = %id, "Warning: sensor de {side} no encontrado");
                }
            }
            info!("Info: circuito cargado: {} ({})", circuit.name, key);
            registry.circuits.push(circuit);
        }

        info!("Info: {} circuitos configurados", registry.count());

        Ok(LoadOutcome { registry, bootstrap })
    }

    /// Crea un registro a partir de circuitos ya construidos.
    pub fn from_circuits(circuits: Vec<HeatingCircuit>, source: Arc<dyn TemperatureSource>) -> Self {
        Self { circuits, source }
    }

    /// Lee todos los circuitos en orden de registro.
    ///
    /// Un fallo en un circuito nunca impide leer los siguientes.
    pub async fn read_all(&self) -> Vec<CircuitStatus> {
        let mut statuses = Vec::with_capacity(self.circuits.len());

        for (index, circuit) in self.circuits.iter().enumerate() {
            if index > 0 {
                sleep(BETWEEN_CIRCUITS).await;
            }
            let reading = circuit.read_temperatures(self.source.as_ref()).await;
            statuses.push(circuit.status(reading, Utc::now()));
        }

        statuses
    }

    /// Búsqueda exacta sin distinguir mayúsculas.
    pub fn by_name(&self, name: &str) -> Option<&HeatingCircuit> {
        self.circuits.iter().find(|c| c.name.to_lowercase() == name.to_lowercase())
    }

    pub fn count(&self) -> usize {
        self.circuits.len()
    }

    /// Diagnóstico de cableado: lee cada circuito una vez e informa del resultado.
    pub async fn self_test(&self) -> Vec<CircuitCheck> {
        let mut checks = Vec::with_capacity(self.circuits.len());

        for circuit in &self.circuits {
            let check = if circuit.is_available() {
                let reading = circuit.read_temperatures(self.source.as_ref()).await;
                CircuitCheck {
                    name: circuit.name.clone(),
                    available: true,
                    flow_ok: reading.flow.is_some(),
                    return_ok: reading.return_temp.is_some(),
                }
            } else {
                CircuitCheck { name: circuit.name.clone(), available: false, flow_ok: false, return_ok: false }
            };

            if check.passed() {
                info!("Info: circuito {} verificado", check.name);
            } else {
                warn!(circuit = %check.name, available = check.available, flow_ok = check.flow_ok,
                      return_ok = check.return_ok, "Warning: circuito con problemas");
            }
            checks.push(check);
        }

        checks
    }
}


async fn write_template(path: &Path, document: &CircuitsDocument) -> Bootstrap {
    let result = async {
        let yaml = serde_yaml::to_string(document).map_err(|e| e.to_string())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
        }
        tokio::fs::write(path, yaml).await.map_err(|e| e.to_string())
    }.await;

    match result {
        Ok(()) => {
            warn!("Warning: plantilla de configuración creada en {}; ajuste los IDs de sensor", path.display());
            Bootstrap::TemplateWritten(path.to_path_buf())
        }
        Err(reason) => {
            error!("Error: no se pudo escribir la plantilla en {}: {}", path.display(), reason);
            Bootstrap::TemplateNotPersisted { path: path.to_path_buf(), reason }
        }
    }
}
