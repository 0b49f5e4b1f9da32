use chrono::Utc;
use tracing::{debug, warn};
use crate::room::domain::RoomCondition;
use crate::sensors::domain::HumiditySource;
use crate::system::domain::RoomLimits;


/// Lee el sensor ambiente y evalúa la condición de la sala.
///
/// Un fallo de lectura no se propaga: produce una condición vacía cuya única
/// alerta es "sensor no disponible".
pub async fn read_room_condition(sensor: &dyn HumiditySource, limits: &RoomLimits) -> RoomCondition {
    let sample = match sensor.read_sample().await {
        Ok(sample) => {
            debug!("Debug: leyendo {}: {}°C {}%RH", sensor.name(), sample.temperature, sample.humidity);
            Some((sample.temperature, sample.humidity))
        }
        Err(e) => {
            warn!(sensor = %sensor.name(), "Warning: sensor ambiente sin lectura: {e}");
            None
        }
    };

    RoomCondition::evaluate(sample, limits, Utc::now())
}
