use tracing::{debug, error};
use crate::database::domain::{alert_points, circuit_points, room_points, status_points, DataPoint};
use crate::database::repository::TimeSeriesStore;
use crate::room::domain::RoomCondition;
use crate::status::domain::SystemSnapshot;


/// Resultado de las escrituras de un ciclo.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistReport {
    pub attempted: usize,
    pub failed: usize,
}

impl PersistReport {
    fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if !ok {
            self.failed += 1;
        }
    }

    pub fn merge(&mut self, other: PersistReport) {
        self.attempted += other.attempted;
        self.failed += other.failed;
    }
}


/// Una escritura independiente. El fallo se registra y no se propaga.
async fn write_logged(store: &dyn TimeSeriesStore, concern: &str, points: Vec<DataPoint>) -> bool {
    if points.is_empty() {
        return true;
    }

    let count = points.len();
    match store.write_points(points).await {
        Ok(()) => {
            debug!("Debug: {count} puntos escritos ({concern})");
            true
        }
        Err(e) => {
            error!(concern, "Error: no se pudo escribir en el almacén: {e}");
            false
        }
    }
}


/// Persiste la instantánea: un intento por circuito, otro para el estado
/// global y otro para las alertas. Un fallo no impide las escrituras siguientes.
pub async fn persist_snapshot(store: &dyn TimeSeriesStore, snapshot: &SystemSnapshot) -> PersistReport {
    let mut report = PersistReport::default();

    for circuit in &snapshot.circuits {
        let ok = write_logged(store, &circuit.name, circuit_points(circuit, snapshot.timestamp)).await;
        report.record(ok);
    }

    report.record(write_logged(store, "status", status_points(snapshot)).await);
    report.record(write_logged(store, "alerts", alert_points(snapshot)).await);

    report
}


/// Persiste el clima de la sala.
pub async fn persist_room(store: &dyn TimeSeriesStore, sensor: &str, condition: &RoomCondition) -> PersistReport {
    let mut report = PersistReport::default();
    report.record(write_logged(store, "room", room_points(sensor, condition)).await);
    report
}
