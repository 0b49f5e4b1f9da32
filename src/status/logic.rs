//! Agregación del estado de los circuitos en una instantánea del sistema.
//!
//! Las alertas se derivan de nuevo en cada ciclo y nunca se suprimen aquí: la
//! instantánea refleja siempre el conjunto real de condiciones. La deduplicación
//! pertenece únicamente a la ruta de notificación (`alerts`).


use chrono::{DateTime, Utc};
use crate::circuit::domain::CircuitStatus;
use crate::sensors::logic::round_to;
use crate::status::domain::{messages, Alert, AlertType, SystemSnapshot};
use crate::system::domain::CircuitThresholds;


/// Eficiencia del sistema a partir de la diferencia media de los circuitos activos.
///
/// `clamp(0, 100, (d - 5) / 10 * 67 + 33)`: 5 °C ≈ 33 %, 15 °C = 100 %.
/// Sin circuitos activos no hay dato (`None`), no un 0 %.
pub fn system_efficiency(circuits: &[CircuitStatus]) -> Option<f64> {
    let active: Vec<f64> = circuits
        .iter()
        .filter(|c| c.is_active)
        .filter_map(|c| c.temperature_difference)
        .collect();

    if active.is_empty() {
        return None;
    }

    let average = active.iter().sum::<f64>() / active.len() as f64;
    Some(round_to(efficiency_from_difference(average), 1))
}


pub fn efficiency_from_difference(average: f64) -> f64 {
    ((average - 5.0) / 10.0 * 67.0 + 33.0).clamp(0.0, 100.0)
}


/// Alertas de un circuito para la lectura actual.
pub fn circuit_alerts(circuit: &CircuitStatus, thresholds: &CircuitThresholds,
                      timestamp: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(flow) = circuit.flow_temperature.filter(|f| *f > thresholds.overheat_flow) {
        alerts.push(Alert::new(AlertType::Critical, &circuit.name, messages::OVERHEAT,
                               Some(flow), timestamp));
    }

    // Solo circuitos calientes: uno frío/parado no es ineficiente
    if let (Some(diff), Some(flow)) = (circuit.temperature_difference, circuit.flow_temperature) {
        if diff < thresholds.low_efficiency_difference && flow > thresholds.low_efficiency_min_flow {
            alerts.push(Alert::new(AlertType::Warning, &circuit.name, messages::LOW_EFFICIENCY,
                                   Some(diff), timestamp));
        }
    }

    if !circuit.sensors_available {
        alerts.push(Alert::new(AlertType::Error, &circuit.name, messages::SENSOR_FAILURE,
                               None, timestamp));
    }

    alerts
}


/// Combina el estado de todos los circuitos en una instantánea.
pub fn aggregate(circuits: Vec<CircuitStatus>, thresholds: &CircuitThresholds,
                 timestamp: DateTime<Utc>) -> SystemSnapshot {

    let alerts = circuits
        .iter()
        .flat_map(|c| circuit_alerts(c, thresholds, timestamp))
        .collect();

    SystemSnapshot {
        timestamp,
        total_circuits: circuits.len(),
        available_circuits: circuits.iter().filter(|c| c.sensors_available).count(),
        active_circuits: circuits.iter().filter(|c| c.is_active).count(),
        system_efficiency: system_efficiency(&circuits),
        alerts,
        circuits,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::domain::{CircuitReading, HeatingCircuit};
    use crate::sensors::domain::SensorHandle;

    fn circuit(name: &str, flow: Option<f64>, ret: Option<f64>, available: bool) -> CircuitStatus {
        let handle = |id: &str| if available { SensorHandle::Bound(id.into()) } else { SensorHandle::Unbound };
        let hc = HeatingCircuit {
            name: name.into(),
            flow_sensor_id: "28-f".into(),
            return_sensor_id: "28-r".into(),
            target_temp: 21.0,
            flow_sensor: handle("28-f"),
            return_sensor: handle("28-r"),
        };
        hc.status(CircuitReading::new(flow, ret), Utc::now())
    }

    #[test]
    fn efficiency_is_undefined_without_active_circuits() {
        let circuits = vec![circuit("A", Some(30.0), Some(29.0), true), circuit("B", None, None, false)];
        assert_eq!(system_efficiency(&circuits), None);
        assert_eq!(system_efficiency(&[]), None);
    }

    #[test]
    fn efficiency_anchor_points() {
        assert_eq!(system_efficiency(&[circuit("A", Some(45.0), Some(30.0), true)]), Some(100.0));
        assert_eq!(system_efficiency(&[circuit("A", Some(35.0), Some(30.0), true)]), Some(33.0));
        assert_eq!(efficiency_from_difference(-5.0), 0.0);
        assert_eq!(efficiency_from_difference(40.0), 100.0);
    }

    #[test]
    fn efficiency_averages_only_active_circuits() {
        let circuits = vec![
            circuit("A", Some(45.0), Some(35.0), true),   // 10
            circuit("B", Some(50.0), Some(30.0), true),   // 20
            circuit("C", Some(31.0), Some(30.0), true),   // 1, inactivo
        ];
        // media 15 -> 100
        assert_eq!(system_efficiency(&circuits), Some(100.0));

        let circuits = vec![circuit("A", Some(40.0), Some(30.0), true)];
        assert_eq!(system_efficiency(&circuits), Some(66.5));
    }

    #[test]
    fn overheat_is_critical() {
        let alerts = circuit_alerts(&circuit("A", Some(81.0), Some(70.0), true),
                                    &CircuitThresholds::default(), Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Critical);
        assert_eq!(alerts[0].value, Some(81.0));
    }

    #[test]
    fn low_efficiency_requires_hot_flow() {
        let t = CircuitThresholds::default();
        let hot = circuit_alerts(&circuit("A", Some(40.0), Some(38.0), true), &t, Utc::now());
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].alert_type, AlertType::Warning);

        let cold = circuit_alerts(&circuit("A", Some(25.0), Some(24.0), true), &t, Utc::now());
        assert!(cold.is_empty());
    }

    #[test]
    fn thresholds_are_configurable() {
        let t = CircuitThresholds { overheat_flow: 60.0, low_efficiency_difference: 5.0, low_efficiency_min_flow: 20.0 };
        let alerts = circuit_alerts(&circuit("A", Some(65.0), Some(61.0), true), &t, Utc::now());
        let kinds: Vec<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
        assert_eq!(kinds, vec![AlertType::Critical, AlertType::Warning]);
    }

    #[test]
    fn two_circuit_scenario() {
        let snapshot = aggregate(
            vec![
                circuit("Erdgeschoss", Some(45.0), Some(30.0), true),
                circuit("Obergeschoss", Some(40.0), None, false),
            ],
            &CircuitThresholds::default(),
            Utc::now(),
        );

        assert_eq!(snapshot.total_circuits, 2);
        assert_eq!(snapshot.available_circuits, 1);
        assert_eq!(snapshot.active_circuits, 1);
        assert_eq!(snapshot.inactive_circuits(), 1);
        assert_eq!(snapshot.system_efficiency, Some(100.0));
        assert_eq!(snapshot.alerts.len(), 1);
        assert_eq!(snapshot.alerts[0].alert_type, AlertType::Error);
        assert_eq!(snapshot.alerts[0].circuit, "Obergeschoss");
    }
}
