//! Evaluación del clima de la sala de calderas.
//!
//! Cálculo puro a partir de una muestra (temperatura, humedad): punto de rocío
//! (aproximación de Magnus), riesgo de condensación en tuberías, alertas
//! ambientales y clasificación de confort. No conserva estado entre ciclos.


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::config::alerts::SYSTEM_SOURCE;
use crate::sensors::logic::round_to;
use crate::status::domain::{messages, Alert, AlertType};
use crate::system::domain::RoomLimits;


const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;

/// Estimación conservadora de la superficie más fría respecto al ambiente.
pub const PIPE_OFFSET: f64 = 5.0;


/// Punto de rocío en °C, redondeado a un decimal.
///
/// Ausente si el cálculo no es numéricamente válido (humedad no positiva,
/// denominador nulo o resultado no finito).
pub fn dew_point(temperature: f64, humidity: f64) -> Option<f64> {
    if humidity <= 0.0 || !temperature.is_finite() || !humidity.is_finite() {
        return None;
    }

    let alpha = (MAGNUS_A * temperature) / (MAGNUS_B + temperature) + (humidity / 100.0).ln();
    let denominator = MAGNUS_A - alpha;
    if denominator == 0.0 {
        return None;
    }

    let dew = (MAGNUS_B * alpha) / denominator;
    dew.is_finite().then(|| round_to(dew, 1))
}


/// Temperatura estimada de la tubería más fría.
pub fn estimated_pipe_temperature(temperature: f64) -> f64 {
    temperature - PIPE_OFFSET
}


/// Riesgo de condensación en porcentaje [0, 100].
pub fn condensation_risk(dew_point: f64, pipe_temperature: f64) -> f64 {
    ((dew_point - pipe_temperature + 5.0) * 20.0).clamp(0.0, 100.0)
}


/// Nivel cualitativo del riesgo según el margen entre tubería y punto de rocío.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CondensationLevel {
    High,
    Medium,
    Low,
    Minimal,
}

impl CondensationLevel {
    pub fn from_margin(pipe_temperature: f64, dew_point: f64) -> Self {
        let margin = pipe_temperature - dew_point;
        if margin < 0.0 {
            CondensationLevel::High
        } else if margin < 2.0 {
            CondensationLevel::Medium
        } else if margin < 5.0 {
            CondensationLevel::Low
        } else {
            CondensationLevel::Minimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CondensationLevel::High => "high",
            CondensationLevel::Medium => "medium",
            CondensationLevel::Low => "low",
            CondensationLevel::Minimal => "minimal",
        }
    }
}


/// Banda de confort de una magnitud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComfortBand {
    Optimal,
    Acceptable,
    Uncomfortable,
}

impl ComfortBand {
    fn classify(value: f64, optimal: (f64, f64), acceptable: (f64, f64)) -> Self {
        if (optimal.0..=optimal.1).contains(&value) {
            ComfortBand::Optimal
        } else if (acceptable.0..=acceptable.1).contains(&value) {
            ComfortBand::Acceptable
        } else {
            ComfortBand::Uncomfortable
        }
    }

    pub fn for_temperature(temperature: f64) -> Self {
        Self::classify(temperature, (18.0, 24.0), (15.0, 27.0))
    }

    pub fn for_humidity(humidity: f64) -> Self {
        Self::classify(humidity, (40.0, 60.0), (30.0, 70.0))
    }
}


/// Clasificación global de confort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComfortLevel {
    Optimal,
    Good,
    NeedsImprovement,
}

impl ComfortLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComfortLevel::Optimal => "optimal",
            ComfortLevel::Good => "good",
            ComfortLevel::NeedsImprovement => "needs_improvement",
        }
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comfort {
    pub level: ComfortLevel,
    pub temperature: ComfortBand,
    pub humidity: ComfortBand,
    pub recommendations: Vec<String>,
}


/// Combina ambas bandas de forma conjuntiva.
pub fn comfort(temperature: f64, humidity: f64) -> Comfort {
    let temp_band = ComfortBand::for_temperature(temperature);
    let humidity_band = ComfortBand::for_humidity(humidity);

    let level = match (temp_band, humidity_band) {
        (ComfortBand::Optimal, ComfortBand::Optimal) => ComfortLevel::Optimal,
        (ComfortBand::Uncomfortable, _) | (_, ComfortBand::Uncomfortable) => ComfortLevel::NeedsImprovement,
        _ => ComfortLevel::Good,
    };

    Comfort {
        level,
        temperature: temp_band,
        humidity: humidity_band,
        recommendations: recommendations(temperature, humidity),
    }
}


fn recommendations(temperature: f64, humidity: f64) -> Vec<String> {
    let mut out = Vec::new();

    if temperature < 15.0 {
        out.push("Aumentar la calefacción: temperatura demasiado baja".to_string());
    } else if temperature > 27.0 {
        out.push("Mejorar la ventilación: temperatura demasiado alta".to_string());
    }

    if humidity < 30.0 {
        out.push("Humedad demasiado baja: considerar un humidificador".to_string());
    } else if humidity > 70.0 {
        out.push("Humedad demasiado alta: deshumidificar o ventilar".to_string());
    }

    if out.is_empty() {
        out.push("Condiciones de la sala óptimas".to_string());
    }
    out
}


/// Alertas ambientales de la sala. `None` en ambos valores indica sensor sin lectura.
pub fn room_alerts(temperature: Option<f64>, humidity: Option<f64>, limits: &RoomLimits,
                   timestamp: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(t) = temperature {
        if t < limits.temp_min {
            alerts.push(Alert::new(AlertType::Critical, SYSTEM_SOURCE, messages::FROST_RISK, Some(t), timestamp));
        } else if t > limits.temp_max {
            alerts.push(Alert::new(AlertType::Warning, SYSTEM_SOURCE, messages::ROOM_OVERHEAT, Some(t), timestamp));
        }
    }

    if let Some(h) = humidity.filter(|h| *h > limits.humidity_max) {
        alerts.push(Alert::new(AlertType::Warning, SYSTEM_SOURCE, messages::HIGH_HUMIDITY, Some(h), timestamp));
    }

    if temperature.is_none() && humidity.is_none() {
        alerts.push(Alert::new(AlertType::Error, SYSTEM_SOURCE, messages::ROOM_SENSOR_UNAVAILABLE, None, timestamp));
    }

    alerts
}


/// Condición completa de la sala calculada a partir de una muestra.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomCondition {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub dew_point: Option<f64>,
    pub estimated_pipe_temperature: Option<f64>,
    pub condensation_risk: Option<f64>,
    pub condensation_level: Option<CondensationLevel>,
    pub comfort: Option<Comfort>,
    pub alerts: Vec<Alert>,
    pub timestamp: DateTime<Utc>,
}

impl RoomCondition {
    /// Evalúa una muestra. `None` produce una condición vacía con alerta de sensor.
    pub fn evaluate(sample: Option<(f64, f64)>, limits: &RoomLimits, timestamp: DateTime<Utc>) -> Self {
        let Some((temperature, humidity)) = sample else {
            return Self {
                temperature: None,
                humidity: None,
                dew_point: None,
                estimated_pipe_temperature: None,
                condensation_risk: None,
                condensation_level: None,
                comfort: None,
                alerts: room_alerts(None, None, limits, timestamp),
                timestamp,
            };
        };

        let dew = dew_point(temperature, humidity);
        let pipe = estimated_pipe_temperature(temperature);

        Self {
            temperature: Some(temperature),
            humidity: Some(humidity),
            dew_point: dew,
            estimated_pipe_temperature: Some(pipe),
            condensation_risk: dew.map(|d| condensation_risk(d, pipe)),
            condensation_level: dew.map(|d| CondensationLevel::from_margin(pipe, d)),
            comfort: Some(comfort(temperature, humidity)),
            alerts: room_alerts(Some(temperature), Some(humidity), limits, timestamp),
            timestamp,
        }
    }
}
