//! Modelo de un circuito de calefacción.
//!
//! Un circuito es un par de sondas (impulsión/retorno) con una temperatura
//! objetivo. Todas las métricas derivadas son cálculo puro sobre la lectura
//! que se les entrega: este módulo no realiza E/S.


use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use crate::config::circuits::ACTIVE_DIFFERENCE;
use crate::sensors::domain::SensorHandle;
use crate::sensors::logic::round_to;


/// Entrada del documento de configuración para un circuito.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub name: String,
    pub flow_sensor: String,
    pub return_sensor: String,
    pub target_temp: f64,
}


/// Calificación cualitativa local de un circuito según su diferencia de temperatura.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EfficiencyRating {
    VeryGood,
    Good,
    Fair,
    Poor,
}

impl EfficiencyRating {
    /// Umbrales cerrados por abajo: 15, 10 y 5 °C.
    pub fn from_difference(difference: f64) -> Self {
        if difference >= 15.0 {
            EfficiencyRating::VeryGood
        } else if difference >= 10.0 {
            EfficiencyRating::Good
        } else if difference >= 5.0 {
            EfficiencyRating::Fair
        } else {
            EfficiencyRating::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EfficiencyRating::VeryGood => "very_good",
            EfficiencyRating::Good => "good",
            EfficiencyRating::Fair => "fair",
            EfficiencyRating::Poor => "poor",
        }
    }
}


/// Puntuación numérica 0-100 que se persiste por circuito.
///
/// Escala escalonada propia del almacén; no confundir con [`EfficiencyRating`]
/// ni con la eficiencia del sistema.
pub fn efficiency_score(difference: f64) -> f64 {
    match difference {
        d if d >= 15.0 => 100.0,
        d if d >= 10.0 => 80.0,
        d if d >= 7.0 => 60.0,
        d if d >= 5.0 => 40.0,
        d if d >= 3.0 => 20.0,
        _ => 0.0,
    }
}


/// Lectura puntual de un circuito. Cada lado es opcional de forma independiente.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitReading {
    pub flow: Option<f64>,
    #[serde(rename = "return")]
    pub return_temp: Option<f64>,
}

impl CircuitReading {
    pub fn new(flow: Option<f64>, return_temp: Option<f64>) -> Self {
        Self { flow, return_temp }
    }

    /// Impulsión menos retorno, redondeado a un decimal. Ausente si falta algún lado.
    pub fn temperature_difference(&self) -> Option<f64> {
        match (self.flow, self.return_temp) {
            (Some(flow), Some(ret)) => Some(round_to(flow - ret, 1)),
            _ => None,
        }
    }

    /// Circulando/calentando: diferencia estrictamente mayor que 2 °C.
    pub fn is_active(&self) -> bool {
        self.temperature_difference()
            .is_some_and(|d| d > ACTIVE_DIFFERENCE)
    }

    pub fn efficiency_rating(&self) -> Option<EfficiencyRating> {
        self.temperature_difference().map(EfficiencyRating::from_difference)
    }
}


/// Circuito de calefacción cargado en el registro.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatingCircuit {
    pub name: String,
    pub flow_sensor_id: String,
    pub return_sensor_id: String,
    pub target_temp: f64,
    pub flow_sensor: SensorHandle,
    pub return_sensor: SensorHandle,
}

impl HeatingCircuit {
    /// Construye el circuito resolviendo cada ranura contra los sensores presentes.
    pub fn from_config(config: CircuitConfig, present: &[String]) -> Self {
        let bind = |id: &str| {
            if present.iter().any(|p| p == id) {
                SensorHandle::Bound(id.to_string())
            } else {
                SensorHandle::Unbound
            }
        };

        Self {
            flow_sensor: bind(&config.flow_sensor),
            return_sensor: bind(&config.return_sensor),
            name: config.name,
            flow_sensor_id: config.flow_sensor,
            return_sensor_id: config.return_sensor,
            target_temp: config.target_temp,
        }
    }

    /// Disponible a nivel de cableado: ambas ranuras enlazadas.
    pub fn is_available(&self) -> bool {
        self.flow_sensor.is_bound() && self.return_sensor.is_bound()
    }

    /// Copia independiente de las métricas derivadas en un instante dado.
    pub fn status(&self, reading: CircuitReading, timestamp: DateTime<Utc>) -> CircuitStatus {
        CircuitStatus {
            name: self.name.clone(),
            flow_temperature: reading.flow,
            return_temperature: reading.return_temp,
            temperature_difference: reading.temperature_difference(),
            is_active: reading.is_active(),
            efficiency_rating: reading.efficiency_rating(),
            target_temperature: self.target_temp,
            sensors_available: self.is_available(),
            timestamp,
        }
    }
}


/// Estado de un circuito tal como aparece en la instantánea del sistema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitStatus {
    pub name: String,
    pub flow_temperature: Option<f64>,
    pub return_temperature: Option<f64>,
    pub temperature_difference: Option<f64>,
    pub is_active: bool,
    pub efficiency_rating: Option<EfficiencyRating>,
    pub target_temperature: f64,
    pub sensors_available: bool,
    pub timestamp: DateTime<Utc>,
}

/// Documento YAML completo de circuitos. Conserva el orden del documento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitsDocument {
    pub heating_circuits: IndexMap<String, CircuitConfig>,
}

impl CircuitsDocument {
    /// Plantilla que se escribe cuando falta la configuración.
    pub fn template() -> Self {
        let entries = [
            ("erdgeschoss", "Erdgeschoss", "28-0000000001", "28-0000000002", 21.0),
            ("obergeschoss", "Obergeschoss", "28-0000000003", "28-0000000004", 20.0),
            ("warmwasser", "Warmwasser", "28-0000000005", "28-0000000006", 45.0),
        ];

        let heating_circuits = entries
            .into_iter()
            .map(|(key, name, flow, ret, target)| {
                (key.to_string(), CircuitConfig {
                    name: name.to_string(),
                    flow_sensor: flow.to_string(),
                    return_sensor: ret.to_string(),
                    target_temp: target,
                })
            })
            .collect();

        Self { heating_circuits }
    }
}
