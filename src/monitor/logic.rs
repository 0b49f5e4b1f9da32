//! Planificador del ciclo de monitorización.
//!
//! Un único bucle secuencial: leer → agregar → persistir → notificar → dormir
//! lo que reste del intervalo. El cuerpo de cada ciclo se ejecuta en una tarea
//! propia que se espera de inmediato, de modo que un pánico dentro del ciclo
//! se convierte en `CycleFailure` y el bucle sigue vivo. La petición de parada
//! solo se observa entre ciclos.


use std::any::Any;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};
use crate::alerts::logic::dispatch_alerts;
use crate::context::domain::AppContext;
use crate::database::logic::{persist_room, persist_snapshot};
use crate::monitor::domain::{compute_sleep, status_line, CycleReport, MonitorState, RunOutcome};
use crate::room::logic::read_room_condition;
use crate::status::logic::aggregate;
use crate::system::domain::{CycleFailure, System, EXIT_STARTUP_FAILURE};


/// Cuerpo de un ciclo. Nunca devuelve error: cada fallo parcial queda
/// registrado en el informe y en el log.
#[instrument(name = "monitoring_cycle", skip(ctx))]
pub async fn run_cycle(ctx: AppContext) -> CycleReport {

    let circuits = ctx.registry.read_all().await;
    let mut snapshot = aggregate(circuits, &ctx.system.circuit_thresholds, Utc::now());

    let room = match &ctx.room_sensor {
        Some(sensor) => {
            let condition = read_room_condition(sensor.as_ref(), &ctx.system.room_limits).await;
            snapshot.alerts.extend(condition.alerts.iter().cloned());
            Some(condition)
        }
        None => None,
    };

    let mut persisted = persist_snapshot(ctx.store.as_ref(), &snapshot).await;
    if let Some(condition) = &room {
        persisted.merge(persist_room(ctx.store.as_ref(), &ctx.system.room_sensor_name, condition).await);
    }
    if persisted.failed > 0 {
        warn!(failed = persisted.failed, attempted = persisted.attempted,
              "Warning: escrituras fallidas en este ciclo");
    }

    let dispatch = dispatch_alerts(&snapshot.alerts, &ctx.gate, &ctx.notifiers,
                                   ctx.system.alert_timezone).await;

    info!("Info: {}", status_line(&snapshot, room.as_ref()));
    if let Some(comfort) = room.as_ref().and_then(|r| r.comfort.as_ref()) {
        info!(comfort = comfort.level.as_str(), "Info: sala: {}", comfort.recommendations.join("; "));
    }

    CycleReport { snapshot, room, persisted, dispatch }
}


fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "pánico sin mensaje".to_string()
    }
}


impl From<JoinError> for CycleFailure {
    fn from(e: JoinError) -> Self {
        if e.is_panic() {
            CycleFailure::Panicked(panic_message(e.into_panic()))
        } else {
            CycleFailure::Cancelled
        }
    }
}


pub struct MonitoringScheduler {
    ctx: AppContext,
    shutdown: watch::Receiver<bool>,
    state: MonitorState,
    interval: Duration,
    signals_closed: bool,
    cycles: u64,
    failed_cycles: u64,
}


impl MonitoringScheduler {

    pub fn new(ctx: AppContext, shutdown: watch::Receiver<bool>) -> Self {
        let interval = ctx.system.monitoring_interval;
        Self {
            ctx,
            shutdown,
            state: MonitorState::Initializing,
            interval,
            signals_closed: false,
            cycles: 0,
            failed_cycles: 0,
        }
    }

    fn transition(&mut self, next: MonitorState) {
        debug!("Debug: monitor {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Ejecuta ciclos hasta recibir la petición de parada y libera los recursos.
    #[instrument(name = "monitoring_scheduler", skip(self), fields(interval_s = self.interval.as_secs()))]
    pub async fn run(mut self) -> RunOutcome {

        self.transition(MonitorState::Running);
        info!("Info: monitor iniciado, intervalo de {}s", self.interval.as_secs());

        while !self.stop_requested() {
            let started = Instant::now();

            match self.execute_cycle().await {
                Ok(report) => {
                    debug!(delivered = report.dispatch.delivered, suppressed = report.dispatch.suppressed,
                           "Debug: ciclo {} completado", self.cycles);
                }
                Err(e) => {
                    self.transition(MonitorState::CycleError);
                    self.failed_cycles += 1;
                    error!(cycle = self.cycles, "Error: ciclo abandonado: {e}");
                    self.transition(MonitorState::Running);
                }
            }

            let elapsed = started.elapsed();
            let pacing = compute_sleep(self.interval, elapsed);
            if pacing.overrun {
                warn!(elapsed_ms = elapsed.as_millis() as u64, interval_ms = self.interval.as_millis() as u64,
                      "Warning: el ciclo superó el intervalo, se continúa sin pausa");
                continue;
            }

            self.pause(pacing.sleep).await;
        }

        self.transition(MonitorState::ShuttingDown);
        info!("Info: deteniendo monitor tras {} ciclos ({} fallidos)", self.cycles, self.failed_cycles);
        self.ctx.shutdown().await;
        self.transition(MonitorState::Stopped);

        RunOutcome::stopped(self.cycles, self.failed_cycles)
    }

    async fn execute_cycle(&mut self) -> Result<CycleReport, CycleFailure> {
        self.cycles += 1;
        let handle = tokio::spawn(run_cycle(self.ctx.clone()));
        Ok(handle.await?)
    }

    /// Duerme hasta el siguiente ciclo o hasta la petición de parada.
    async fn pause(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;

        loop {
            if self.signals_closed {
                sleep_until(deadline).await;
                return;
            }

            tokio::select! {
                _ = sleep_until(deadline) => return,
                changed = self.shutdown.changed() => match changed {
                    Ok(()) if *self.shutdown.borrow_and_update() => return,
                    Ok(()) => {}
                    Err(_) => {
                        warn!("Warning: canal de parada cerrado, las señales ya no se observan");
                        self.signals_closed = true;
                    }
                },
            }
        }
    }
}


/// Arranca el monitor: construye los colaboradores y ejecuta el bucle.
///
/// Un fallo de un colaborador obligatorio termina en `Stopped` con
/// `EXIT_STARTUP_FAILURE`, distinto de un fallo en ejecución.
pub async fn start_monitor(system: System, shutdown: watch::Receiver<bool>) -> RunOutcome {

    debug!("Debug: monitor {} -> {}", MonitorState::Idle.as_str(), MonitorState::Initializing.as_str());

    let ctx = match AppContext::new(system).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error: no se pudo iniciar el monitor: {e}");
            return RunOutcome {
                state: MonitorState::Stopped,
                cycles: 0,
                failed_cycles: 0,
                exit_code: EXIT_STARTUP_FAILURE,
            };
        }
    };

    MonitoringScheduler::new(ctx, shutdown).run().await
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use crate::alerts::domain::AlertGate;
    use crate::alerts::logic::Notifier;
    use crate::circuit::domain::{CircuitConfig, HeatingCircuit};
    use crate::circuit::logic::CircuitRegistry;
    use crate::database::domain::DataPoint;
    use crate::database::repository::TimeSeriesStore;
    use crate::sensors::domain::{HumiditySource, TemperatureSource};
    use crate::status::domain::AlertType;
    use crate::system::domain::{SensorError, StoreError, EXIT_OK};
    use crate::test_support::{test_system, FakeBus, FakeRoomSensor, MemoryStore, RecordingNotifier};

    fn circuit(name: &str, flow: &str, ret: &str, present: &[String]) -> HeatingCircuit {
        HeatingCircuit::from_config(
            CircuitConfig {
                name: name.into(),
                flow_sensor: flow.into(),
                return_sensor: ret.into(),
                target_temp: 21.0,
            },
            present,
        )
    }

    fn context(source: Arc<dyn TemperatureSource>, circuits: Vec<HeatingCircuit>,
               store: Arc<dyn TimeSeriesStore>, notifiers: Vec<Box<dyn Notifier>>,
               room: Option<Arc<dyn HumiditySource>>) -> AppContext {
        AppContext {
            registry: Arc::new(CircuitRegistry::from_circuits(circuits, source)),
            store,
            room_sensor: room,
            notifiers: Arc::new(notifiers),
            gate: Arc::new(AlertGate::default()),
            system: Arc::new(test_system(Duration::from_secs(30))),
        }
    }

    fn two_circuit_context(store: Arc<dyn TimeSeriesStore>, notifiers: Vec<Box<dyn Notifier>>) -> AppContext {
        let bus = Arc::new(FakeBus::new().with("28-a", 45.0).with("28-b", 30.0).with("28-c", 40.0));
        let present = vec!["28-a".to_string(), "28-b".to_string(), "28-c".to_string()];
        let circuits = vec![
            circuit("Erdgeschoss", "28-a", "28-b", &present),
            circuit("Obergeschoss", "28-c", "28-x", &present),
        ];
        context(bus, circuits, store, notifiers, None)
    }

    #[tokio::test(start_paused = true)]
    async fn two_circuit_scenario() {
        let store = MemoryStore::new();
        let recorder = RecordingNotifier::new("mem");
        let sent = recorder.sent();
        let ctx = two_circuit_context(Arc::new(store.clone()), vec![Box::new(recorder)]);

        let report = run_cycle(ctx).await;
        let snapshot = report.snapshot;

        assert_eq!(snapshot.total_circuits, 2);
        assert_eq!(snapshot.available_circuits, 1);
        assert_eq!(snapshot.active_circuits, 1);
        assert_eq!(snapshot.system_efficiency, Some(100.0));
        assert_eq!(snapshot.alerts.len(), 1);
        assert_eq!(snapshot.alerts[0].alert_type, AlertType::Error);
        assert_eq!(snapshot.alerts[0].circuit, "Obergeschoss");

        assert_eq!(report.persisted.failed, 0);
        assert!(store.points().iter().any(|p| p.measurement == "heating_alerts"
            && p.tags.get("type").map(String::as_str) == Some("error")));

        // Los errores se guardan pero no se notifican
        assert_eq!(report.dispatch.considered, 0);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_does_not_abort_notification() {
        let bus = Arc::new(FakeBus::new().with("28-a", 85.5).with("28-b", 60.0));
        let present = vec!["28-a".to_string(), "28-b".to_string()];
        let store = MemoryStore::failing_first(1);
        let recorder = RecordingNotifier::new("mem");
        let sent = recorder.sent();
        let ctx = context(bus, vec![circuit("Kessel", "28-a", "28-b", &present)],
                          Arc::new(store.clone()), vec![Box::new(recorder)], None);

        let report = run_cycle(ctx).await;

        assert_eq!(report.persisted.failed, 1);
        assert_eq!(store.writes(), 2);
        assert_eq!(report.dispatch.delivered, 1);
        assert_eq!(sent.lock().unwrap()[0].0, "CRITICAL - Kessel");
    }

    #[tokio::test(start_paused = true)]
    async fn room_alerts_join_the_snapshot() {
        let bus = Arc::new(FakeBus::new());
        let room: Arc<dyn HumiditySource> = Arc::new(FakeRoomSensor::new(Some((3.0, 50.0))));
        let store = MemoryStore::new();
        let ctx = context(bus, Vec::new(), Arc::new(store.clone()), Vec::new(), Some(room));

        let report = run_cycle(ctx).await;

        assert_eq!(report.room.unwrap().temperature, Some(3.0));
        assert!(report.snapshot.alerts.iter().any(|a| a.alert_type == AlertType::Critical));
        assert!(store.points().iter().any(|p| p.measurement == "room_climate"));
    }

    #[tokio::test(start_paused = true)]
    async fn cycles_keep_a_fixed_cadence_until_stopped() {
        let store = MemoryStore::new();
        let ctx = two_circuit_context(Arc::new(store.clone()), Vec::new());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(MonitoringScheduler::new(ctx, rx).run());

        // Ciclos en t = 0, 30, 60 y 90 s
        tokio::time::sleep(Duration::from_secs(95)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, RunOutcome::stopped(4, 0));
        assert_eq!(outcome.exit_code, EXIT_OK);
        assert!(store.is_closed());
    }

    struct SlowStore {
        delay: Duration,
    }

    #[async_trait]
    impl TimeSeriesStore for SlowStore {
        async fn write_points(&self, _points: Vec<DataPoint>) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn overrun_starts_the_next_cycle_immediately() {
        let bus = Arc::new(FakeBus::new().with("28-a", 45.0).with("28-b", 30.0));
        let present = vec!["28-a".to_string(), "28-b".to_string()];
        // Tres escrituras de 12 s: cada ciclo dura ~36 s con un intervalo de 30 s
        let store = Arc::new(SlowStore { delay: Duration::from_secs(12) });
        let ctx = context(bus, vec![circuit("A", "28-a", "28-b", &present)], store, Vec::new(), None);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(MonitoringScheduler::new(ctx, rx).run());

        // Ciclos en t ≈ 0, 36 y 72 s; la parada llega durante el tercero
        tokio::time::sleep(Duration::from_secs(100)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.cycles, 3);
        assert_eq!(outcome.failed_cycles, 0);
    }

    struct PanickingBus {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TemperatureSource for PanickingBus {
        async fn available_sensors(&self) -> Result<Vec<String>, SensorError> {
            Ok(vec!["28-a".into(), "28-b".into()])
        }

        async fn read_temperature(&self, _sensor_id: &str) -> Result<f64, SensorError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("fallo inesperado en el driver");
            }
            Ok(40.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_panicking_cycle_does_not_stop_the_loop() {
        let bus = Arc::new(PanickingBus { calls: AtomicUsize::new(0) });
        let present = vec!["28-a".to_string(), "28-b".to_string()];
        let store = MemoryStore::new();
        let ctx = context(bus, vec![circuit("A", "28-a", "28-b", &present)],
                          Arc::new(store.clone()), Vec::new(), None);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(MonitoringScheduler::new(ctx, rx).run());

        tokio::time::sleep(Duration::from_secs(45)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.failed_cycles, 1);
        assert_eq!(outcome.state, MonitorState::Stopped);
        assert!(store.writes() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_cycle_releases_resources() {
        let store = MemoryStore::new();
        let room = FakeRoomSensor::new(Some((20.0, 50.0)));
        let cleaned = room.cleaned();
        let mut ctx = two_circuit_context(Arc::new(store.clone()), Vec::new());
        ctx.room_sensor = Some(Arc::new(room));

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let outcome = MonitoringScheduler::new(ctx, rx).run().await;
        assert_eq!(outcome.cycles, 0);
        assert!(store.is_closed());
        assert!(*cleaned.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn mandatory_collaborator_failure_stops_with_startup_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("circuits.yaml");
        std::fs::write(&path, "heating_circuits: [").unwrap();
        let mut system = test_system(Duration::from_secs(30));
        system.circuits_config = path;

        let (_tx, rx) = watch::channel(false);
        let outcome = start_monitor(system, rx).await;

        assert_eq!(outcome.state, MonitorState::Stopped);
        assert_eq!(outcome.exit_code, EXIT_STARTUP_FAILURE);
        assert_eq!((outcome.cycles, outcome.failed_cycles), (0, 0));
    }

    #[test]
    fn join_errors_map_to_cycle_failures() {
        let message = panic_message(Box::new("roto"));
        assert_eq!(message, "roto");
        let message = panic_message(Box::new(String::from("roto")));
        assert_eq!(message, "roto");
        assert_eq!(panic_message(Box::new(7_u8)), "pánico sin mensaje");
    }
}
