//! Estructuras de dominio para la persistencia de series temporales.
//!
//! Un `DataPoint` sigue el modelo medición/etiquetas/campos de los almacenes de
//! series temporales. Los constructores de este módulo fijan el esquema de
//! puntos que consumen los paneles (nombres de medición y etiquetas).


use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::circuit::domain::{efficiency_score, CircuitStatus};
use crate::room::domain::RoomCondition;
use crate::status::domain::SystemSnapshot;


/// Valor de un campo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Text(String),
}


/// Punto etiquetado de una serie temporal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}


impl DataPoint {
    pub fn new(measurement: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn float(mut self, key: &str, value: f64) -> Self {
        self.fields.insert(key.to_string(), FieldValue::Float(value));
        self
    }

    pub fn int(mut self, key: &str, value: i64) -> Self {
        self.fields.insert(key.to_string(), FieldValue::Int(value));
        self
    }

    pub fn text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), FieldValue::Text(value.into()));
        self
    }
}


const HEATING_SYSTEM: &str = "heating_system";
const HEATING_ROOM: &str = "heating_room";


/// Puntos de un circuito: temperaturas presentes y, con ambos lados, diferencia y puntuación.
pub fn circuit_points(status: &CircuitStatus, timestamp: DateTime<Utc>) -> Vec<DataPoint> {
    let mut points = Vec::with_capacity(4);

    for (side, value) in [("flow", status.flow_temperature), ("return", status.return_temperature)] {
        if let Some(temperature) = value {
            points.push(
                DataPoint::new("heating_temperature", timestamp)
                    .tag("circuit", &status.name)
                    .tag("type", side)
                    .tag("location", HEATING_SYSTEM)
                    .float("temperature", temperature),
            );
        }
    }

    if let (Some(flow), Some(ret), Some(diff)) =
        (status.flow_temperature, status.return_temperature, status.temperature_difference)
    {
        points.push(
            DataPoint::new("heating_efficiency", timestamp)
                .tag("circuit", &status.name)
                .tag("metric", "temperature_difference")
                .tag("location", HEATING_SYSTEM)
                .float("value", diff)
                .float("flow_temperature", flow)
                .float("return_temperature", ret),
        );
        let mut score = DataPoint::new("heating_efficiency", timestamp)
            .tag("circuit", &status.name)
            .tag("metric", "efficiency_score")
            .tag("location", HEATING_SYSTEM)
            .float("score", efficiency_score(diff))
            .float("temperature_difference", diff);
        if let Some(rating) = status.efficiency_rating {
            score = score.tag("rating", rating.as_str());
        }
        points.push(score);
    }

    points
}


/// Puntos del clima de la sala y su riesgo de condensación.
pub fn room_points(sensor: &str, condition: &RoomCondition) -> Vec<DataPoint> {
    let timestamp = condition.timestamp;
    let comfort = condition.comfort.as_ref().map(|c| c.level.as_str());
    let mut points = Vec::with_capacity(4);

    for (kind, value) in [
        ("temperature", condition.temperature),
        ("humidity", condition.humidity),
        ("dew_point", condition.dew_point),
    ] {
        if let Some(value) = value {
            let mut point = DataPoint::new("room_climate", timestamp)
                .tag("sensor", sensor)
                .tag("location", HEATING_ROOM)
                .tag("type", kind)
                .float("value", value);
            if let Some(level) = comfort {
                point = point.tag("comfort", level);
            }
            points.push(point);
        }
    }

    if let (Some(risk), Some(dew), Some(pipe)) =
        (condition.condensation_risk, condition.dew_point, condition.estimated_pipe_temperature)
    {
        let mut point = DataPoint::new("heating_alerts", timestamp)
            .tag("type", "condensation_risk")
            .tag("location", HEATING_ROOM)
            .float("risk_percentage", risk)
            .float("dew_point", dew)
            .float("estimated_pipe_temp", pipe);
        if let Some(level) = condition.condensation_level {
            point = point.tag("level", level.as_str());
        }
        points.push(point);
    }

    points
}


/// Punto de estado global; la eficiencia solo se escribe cuando está definida.
pub fn status_points(snapshot: &SystemSnapshot) -> Vec<DataPoint> {
    let mut point = DataPoint::new("heating_system_status", snapshot.timestamp)
        .tag("system", "main")
        .tag("location", HEATING_SYSTEM)
        .int("total_circuits", snapshot.total_circuits as i64)
        .int("available_circuits", snapshot.available_circuits as i64)
        .int("active_circuits", snapshot.active_circuits as i64)
        .int("inactive_circuits", snapshot.inactive_circuits() as i64);

    if let Some(efficiency) = snapshot.system_efficiency {
        point = point.float("efficiency", efficiency);
    }

    vec![point]
}


/// Una fila por alerta (`active=1`) o un único marcador sin alertas (`active=0`).
pub fn alert_points(snapshot: &SystemSnapshot) -> Vec<DataPoint> {
    if snapshot.alerts.is_empty() {
        return vec![
            DataPoint::new("heating_alerts", snapshot.timestamp)
                .tag("type", "status")
                .tag("location", HEATING_SYSTEM)
                .text("message", "Sistema funcionando con normalidad")
                .int("active", 0),
        ];
    }

    snapshot
        .alerts
        .iter()
        .map(|alert| {
            let mut point = DataPoint::new("heating_alerts", snapshot.timestamp)
                .tag("type", alert.alert_type.as_str())
                .tag("circuit", &alert.circuit)
                .tag("location", HEATING_SYSTEM)
                .text("message", &alert.message)
                .int("active", 1);
            if let Some(value) = alert.value {
                point = point.float("value", value);
            }
            point
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::domain::EfficiencyRating;
    use crate::status::domain::{messages, Alert, AlertType};

    fn status(flow: Option<f64>, ret: Option<f64>, diff: Option<f64>) -> CircuitStatus {
        CircuitStatus {
            name: "Erdgeschoss".into(),
            flow_temperature: flow,
            return_temperature: ret,
            temperature_difference: diff,
            is_active: diff.is_some_and(|d| d > 2.0),
            efficiency_rating: diff.map(EfficiencyRating::from_difference),
            target_temperature: 21.0,
            sensors_available: true,
            timestamp: Utc::now(),
        }
    }

    fn snapshot(alerts: Vec<Alert>, efficiency: Option<f64>) -> SystemSnapshot {
        SystemSnapshot {
            timestamp: Utc::now(),
            total_circuits: 3,
            available_circuits: 2,
            active_circuits: 1,
            circuits: Vec::new(),
            system_efficiency: efficiency,
            alerts,
        }
    }

    #[test]
    fn full_circuit_reading_produces_four_points() {
        let points = circuit_points(&status(Some(45.0), Some(30.0), Some(15.0)), Utc::now());
        assert_eq!(points.len(), 4);
        assert_eq!(points[2].fields["value"], FieldValue::Float(15.0));
        assert_eq!(points[3].fields["score"], FieldValue::Float(100.0));
        assert_eq!(points[3].tags["rating"], "very_good");
    }

    #[test]
    fn partial_circuit_reading_only_writes_present_side() {
        let points = circuit_points(&status(None, Some(30.0), None), Utc::now());
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].tags["type"], "return");
    }

    #[test]
    fn undefined_efficiency_is_omitted() {
        let points = status_points(&snapshot(Vec::new(), None));
        assert!(!points[0].fields.contains_key("efficiency"));
        assert_eq!(points[0].fields["inactive_circuits"], FieldValue::Int(2));
    }

    #[test]
    fn empty_alert_list_writes_inactive_marker() {
        let points = alert_points(&snapshot(Vec::new(), Some(50.0)));
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].fields["active"], FieldValue::Int(0));
    }

    #[test]
    fn room_points_carry_comfort_level() {
        use crate::system::domain::RoomLimits;

        let condition = RoomCondition::evaluate(Some((20.0, 50.0)), &RoomLimits::default(), Utc::now());
        let points = room_points("sala_calderas", &condition);
        let climate: Vec<_> = points.iter().filter(|p| p.measurement == "room_climate").collect();
        assert_eq!(climate.len(), 3);
        assert!(climate.iter().all(|p| p.tags["comfort"] == "optimal"));

        let empty = RoomCondition::evaluate(None, &RoomLimits::default(), Utc::now());
        assert!(room_points("sala_calderas", &empty).is_empty());
    }

    #[test]
    fn each_alert_is_an_active_point() {
        let alerts = vec![
            Alert::new(AlertType::Critical, "A", messages::OVERHEAT, Some(82.0), Utc::now()),
            Alert::new(AlertType::Error, "B", messages::SENSOR_FAILURE, None, Utc::now()),
        ];
        let points = alert_points(&snapshot(alerts, None));
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.fields["active"] == FieldValue::Int(1)));
        assert_eq!(points[1].tags["type"], "error");
        assert_eq!(points.iter().map(|p| p.fields.len()).sum::<usize>(), 5);
    }
}
