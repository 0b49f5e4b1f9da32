use std::time::Duration;
use crate::alerts::logic::DispatchReport;
use crate::database::logic::PersistReport;
use crate::room::domain::RoomCondition;
use crate::status::domain::SystemSnapshot;
use crate::system::domain::EXIT_OK;


/// Estados del planificador.
///
/// `Idle → Initializing → Running ⇄ CycleError → ShuttingDown → Stopped`.
/// Un fallo de arranque pasa directamente de `Initializing` a `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Initializing,
    Running,
    CycleError,
    ShuttingDown,
    Stopped,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorState::Idle => "idle",
            MonitorState::Initializing => "initializing",
            MonitorState::Running => "running",
            MonitorState::CycleError => "cycle_error",
            MonitorState::ShuttingDown => "shutting_down",
            MonitorState::Stopped => "stopped",
        }
    }
}


/// Pausa hasta el siguiente ciclo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub sleep: Duration,
    pub overrun: bool,
}


/// `max(0, interval - elapsed)`. Con `elapsed >= interval` el ciclo se
/// considera desbordado y el siguiente empieza sin pausa.
pub fn compute_sleep(interval: Duration, elapsed: Duration) -> Pacing {
    Pacing {
        sleep: interval.saturating_sub(elapsed),
        overrun: elapsed >= interval,
    }
}


/// Resultado de un ciclo completo.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub snapshot: SystemSnapshot,
    pub room: Option<RoomCondition>,
    pub persisted: PersistReport,
    pub dispatch: DispatchReport,
}


/// Resultado de una ejecución del planificador.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub state: MonitorState,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub exit_code: u8,
}

impl RunOutcome {
    pub fn stopped(cycles: u64, failed_cycles: u64) -> Self {
        Self { state: MonitorState::Stopped, cycles, failed_cycles, exit_code: EXIT_OK }
    }
}


/// Línea de estado del ciclo para el log.
pub fn status_line(snapshot: &SystemSnapshot, room: Option<&RoomCondition>) -> String {
    let efficiency = snapshot
        .system_efficiency
        .map(|e| format!("{e:.1}%"))
        .unwrap_or_else(|| "n/d".to_string());

    let room = room
        .and_then(|r| r.temperature)
        .map(|t| format!("{t:.1}°C"))
        .unwrap_or_else(|| "n/d".to_string());

    format!(
        "Estado: {}/{} circuitos activos ({} disponibles) | eficiencia: {} | sala: {} | alertas: {}",
        snapshot.active_circuits,
        snapshot.total_circuits,
        snapshot.available_circuits,
        efficiency,
        room,
        snapshot.alerts.len(),
    )
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn sleep_compensates_for_cycle_time() {
        let pacing = compute_sleep(Duration::from_secs(30), Duration::from_secs(4));
        assert_eq!(pacing, Pacing { sleep: Duration::from_secs(26), overrun: false });
    }

    #[test]
    fn overrun_never_produces_a_negative_sleep() {
        let pacing = compute_sleep(Duration::from_secs(30), Duration::from_secs(42));
        assert_eq!(pacing, Pacing { sleep: Duration::ZERO, overrun: true });

        let exact = compute_sleep(Duration::from_secs(30), Duration::from_secs(30));
        assert_eq!(exact, Pacing { sleep: Duration::ZERO, overrun: true });
    }

    #[test]
    fn status_line_marks_missing_values() {
        let snapshot = SystemSnapshot {
            timestamp: Utc::now(),
            total_circuits: 3,
            available_circuits: 1,
            active_circuits: 0,
            circuits: Vec::new(),
            system_efficiency: None,
            alerts: Vec::new(),
        };
        let line = status_line(&snapshot, None);
        assert!(line.contains("0/3 circuitos activos"));
        assert!(line.contains("eficiencia: n/d"));
        assert!(line.contains("sala: n/d"));
    }
}
