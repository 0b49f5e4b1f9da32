//! Dobles de prueba de los colaboradores externos.


use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use crate::alerts::logic::Notifier;
use crate::database::domain::DataPoint;
use crate::database::repository::TimeSeriesStore;
use crate::sensors::domain::{HumiditySample, HumiditySource, TemperatureSource};
use crate::system::domain::{CircuitThresholds, NotificationError, RoomLimits, SensorError, StoreError, System};


/// Configuración completa sin leer el entorno.
pub fn test_system(interval: Duration) -> System {
    System {
        database_url: "postgres://test@localhost/test".into(),
        db_pool_size: 1,
        monitoring_interval: interval,
        circuits_config: "config/heating_circuits.yaml".into(),
        w1_devices_path: "/nonexistent/w1".into(),
        room_sensor_enabled: false,
        room_sensor_path: "/nonexistent/iio".into(),
        room_sensor_name: "sala_calderas".into(),
        room_limits: RoomLimits::default(),
        circuit_thresholds: CircuitThresholds::default(),
        email_enabled: false,
        smtp_server: "smtp.example.org".into(),
        smtp_port: 587,
        smtp_user: String::new(),
        smtp_password: String::new(),
        alert_email: String::new(),
        discord_enabled: false,
        discord_webhook_url: String::new(),
        telegram_enabled: false,
        telegram_bot_token: String::new(),
        telegram_chat_id: String::new(),
        telegram_api_url: "https://api.telegram.org".into(),
        alert_timezone: chrono_tz::UTC,
        environment: "test".into(),
        rust_log: "debug".into(),
    }
}


/// Bus de temperaturas en memoria.
#[derive(Default)]
pub struct FakeBus {
    values: Mutex<BTreeMap<String, f64>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, id: &str, value: f64) -> Self {
        self.set(id, value);
        self
    }

    pub fn set(&self, id: &str, value: f64) {
        self.values.lock().unwrap().insert(id.to_string(), value);
    }

    /// El sensor sigue presente en el bus pero sus lecturas fallan.
    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }
}

#[async_trait]
impl TemperatureSource for FakeBus {
    async fn available_sensors(&self) -> Result<Vec<String>, SensorError> {
        Ok(self.values.lock().unwrap().keys().cloned().collect())
    }

    async fn read_temperature(&self, sensor_id: &str) -> Result<f64, SensorError> {
        if self.failing.lock().unwrap().contains(sensor_id) {
            return Err(SensorError::Io { sensor: sensor_id.to_string(), reason: "simulado".into() });
        }
        self.values
            .lock()
            .unwrap()
            .get(sensor_id)
            .copied()
            .ok_or_else(|| SensorError::NotFound(sensor_id.to_string()))
    }
}


/// Sensor ambiente con una muestra fija; `None` simula un fallo de lectura.
pub struct FakeRoomSensor {
    sample: Option<(f64, f64)>,
    cleaned: Arc<Mutex<bool>>,
}

impl FakeRoomSensor {
    pub fn new(sample: Option<(f64, f64)>) -> Self {
        Self { sample, cleaned: Arc::new(Mutex::new(false)) }
    }

    pub fn cleaned(&self) -> Arc<Mutex<bool>> {
        self.cleaned.clone()
    }
}

#[async_trait]
impl HumiditySource for FakeRoomSensor {
    fn name(&self) -> &str {
        "fake_room"
    }

    async fn read_sample(&self) -> Result<HumiditySample, SensorError> {
        match self.sample {
            Some((temperature, humidity)) => Ok(HumiditySample { temperature, humidity }),
            None => Err(SensorError::Unavailable("fake_room".into())),
        }
    }

    async fn cleanup(&self) {
        *self.cleaned.lock().unwrap() = true;
    }
}


/// Transporte que registra `(asunto, mensaje)` en memoria.
pub struct RecordingNotifier {
    name: String,
    fail: bool,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), fail: false, sent: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn failing(name: &str) -> Self {
        Self { fail: true, ..Self::new(name) }
    }

    pub fn sent(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, subject: &str, message: &str) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::NotConfigured("simulado"));
        }
        self.sent.lock().unwrap().push((subject.to_string(), message.to_string()));
        Ok(())
    }
}


/// Almacén en memoria. Las primeras `fail_first` escrituras fallan.
#[derive(Clone, Default)]
pub struct MemoryStore {
    points: Arc<Mutex<Vec<DataPoint>>>,
    writes: Arc<Mutex<usize>>,
    fail_first: Arc<Mutex<usize>>,
    closed: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: usize) -> Self {
        let store = Self::default();
        *store.fail_first.lock().unwrap() = n;
        store
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    pub fn points(&self) -> Vec<DataPoint> {
        self.points.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryStore {
    async fn write_points(&self, points: Vec<DataPoint>) -> Result<(), StoreError> {
        {
            let mut remaining = self.fail_first.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Timeout);
            }
        }
        *self.writes.lock().unwrap() += 1;
        self.points.lock().unwrap().extend(points);
        Ok(())
    }

    async fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}
