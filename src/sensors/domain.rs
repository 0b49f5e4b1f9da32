//! Contratos de los colaboradores de sensores.
//!
//! El núcleo del monitor nunca depende de un transporte concreto: cualquier
//! implementación que exponga estos traits es aceptable (bus one-wire real,
//! driver IIO del kernel, o dobles de prueba).


use async_trait::async_trait;
use crate::system::domain::SensorError;


/// Estado de cableado de una ranura de sensor de un circuito.
///
/// `Unbound` es un estado válido y persistente ("sensor no disponible"): se decide
/// una sola vez al cargar el registro, nunca a partir de un fallo de lectura.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorHandle {
    Bound(String),
    Unbound,
}

impl SensorHandle {
    pub fn is_bound(&self) -> bool {
        matches!(self, SensorHandle::Bound(_))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            SensorHandle::Bound(id) => Some(id),
            SensorHandle::Unbound => None,
        }
    }
}


/// Muestra de temperatura y humedad relativa del ambiente.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumiditySample {
    pub temperature: f64,
    pub humidity: f64,
}


/// Fuente de temperaturas de tubería (sondas DS18B20 o equivalentes).
#[async_trait]
pub trait TemperatureSource: Send + Sync {
    /// Identificadores de todos los sensores presentes en el bus.
    async fn available_sensors(&self) -> Result<Vec<String>, SensorError>;

    /// Temperatura actual del sensor en °C.
    async fn read_temperature(&self, sensor_id: &str) -> Result<f64, SensorError>;
}


/// Fuente de muestras de temperatura/humedad ambiente (DHT22 o equivalente).
#[async_trait]
pub trait HumiditySource: Send + Sync {
    fn name(&self) -> &str;

    async fn read_sample(&self) -> Result<HumiditySample, SensorError>;

    /// Libera los recursos del sensor al detener el servicio.
    async fn cleanup(&self) {}
}
