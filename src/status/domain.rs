//! Dominio del estado del sistema: alertas e instantáneas por ciclo.


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::circuit::domain::CircuitStatus;


/// Severidad de una alerta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Critical,
    Warning,
    Error,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Critical => "critical",
            AlertType::Warning => "warning",
            AlertType::Error => "error",
        }
    }

    /// Solo críticas y avisos salen por los canales de notificación.
    pub fn is_notifiable(&self) -> bool {
        matches!(self, AlertType::Critical | AlertType::Warning)
    }
}


/// Alerta como objeto valor.
///
/// `message` es estable para una misma condición (forma parte de la clave de
/// deduplicación); la medición que la disparó va en `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub circuit: String,
    pub message: String,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(alert_type: AlertType, circuit: impl Into<String>, message: impl Into<String>,
               value: Option<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            alert_type,
            circuit: circuit.into(),
            message: message.into(),
            value,
            timestamp,
        }
    }
}


/// Mensajes fijos de las alertas del sistema.
pub mod messages {
    pub const OVERHEAT: &str = "Sobrecalentamiento de impulsión";
    pub const LOW_EFFICIENCY: &str = "Baja eficiencia: diferencia de temperatura insuficiente";
    pub const SENSOR_FAILURE: &str = "Fallo de sensor detectado";
    pub const FROST_RISK: &str = "Riesgo de helada en la sala de calderas";
    pub const ROOM_OVERHEAT: &str = "Sobrecalentamiento en la sala de calderas";
    pub const HIGH_HUMIDITY: &str = "Humedad alta: riesgo de condensación";
    pub const ROOM_SENSOR_UNAVAILABLE: &str = "Sensor ambiente no disponible";
}


/// Instantánea del sistema creada en cada ciclo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_circuits: usize,
    pub available_circuits: usize,
    pub active_circuits: usize,
    pub circuits: Vec<CircuitStatus>,
    /// Porcentaje 0-100, o `None` si ningún circuito está activo.
    pub system_efficiency: Option<f64>,
    pub alerts: Vec<Alert>,
}

impl SystemSnapshot {
    pub fn inactive_circuits(&self) -> usize {
        self.total_circuits - self.active_circuits
    }
}
