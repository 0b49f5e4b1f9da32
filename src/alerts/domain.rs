//! Deduplicación de alertas salientes.
//!
//! `AlertGate` es el único estado mutable compartido del monitor: un mapa
//! clave de alerta → último envío. Se crea una vez en el arranque y se pasa
//! explícitamente al planificador a través del `AppContext`.


use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use crate::config::alerts::COOLDOWN;
use crate::status::domain::{Alert, AlertType};


/// Clave determinista de deduplicación: (tipo, circuito, mensaje).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub alert_type: AlertType,
    pub circuit: String,
    pub message: String,
}

impl From<&Alert> for AlertKey {
    fn from(alert: &Alert) -> Self {
        Self {
            alert_type: alert.alert_type,
            circuit: alert.circuit.clone(),
            message: alert.message.clone(),
        }
    }
}


/// Ventana de enfriamiento por clave de alerta.
///
/// Las entradas nunca se expulsan: el conjunto de claves posibles en una
/// instalación es pequeño y fijo.
#[derive(Debug)]
pub struct AlertGate {
    cooldown: TimeDelta,
    last_sent: DashMap<AlertKey, DateTime<Utc>>,
}


impl Default for AlertGate {
    fn default() -> Self {
        Self::new(COOLDOWN)
    }
}


impl AlertGate {
    pub fn new(cooldown: TimeDelta) -> Self {
        Self { cooldown, last_sent: DashMap::new() }
    }

    pub fn should_send(&self, key: &AlertKey) -> bool {
        self.should_send_at(key, Utc::now())
    }

    /// Devuelve `false` si la clave se envió hace menos de la ventana.
    /// En caso contrario registra `now` como último envío y devuelve `true`.
    pub fn should_send_at(&self, key: &AlertKey, now: DateTime<Utc>) -> bool {
        // entry() bloquea el shard: consulta y registro son atómicos
        match self.last_sent.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if now - *occupied.get() < self.cooldown {
                    return false;
                }
                occupied.insert(now);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
            }
        }
        true
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_sent.len()
    }
}
