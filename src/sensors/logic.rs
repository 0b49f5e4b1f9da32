//! Drivers de sensores sobre sysfs de Linux.
//!
//! * [`OneWireBus`]: sondas DS18B20 expuestas por el driver `w1_therm`.
//! * [`IioHumiditySensor`]: DHT22 expuesto por el driver IIO `dht11`.
//!
//! Toda lectura pasa por [`with_deadline`], de modo que un bus colgado se
//! convierte en un `SensorError::Timeout` en lugar de bloquear el ciclo.


use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use crate::config::sensors::{DS18B20_POWER_ON_RESET, HUMIDITY_MIN_INTERVAL, HUMIDITY_RETRIES,
                             HUMIDITY_RETRY_PAUSE, READ_TIMEOUT};
use crate::sensors::domain::{HumiditySample, HumiditySource, TemperatureSource};
use crate::system::domain::SensorError;


/// Ejecuta una lectura con plazo máximo. Un plazo vencido es un fallo de esa lectura.
pub async fn with_deadline<T, F>(sensor: &str, deadline: Duration, fut: F) -> Result<T, SensorError>
where
    F: Future<Output = Result<T, SensorError>>,
{
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(SensorError::Timeout(sensor.to_string())),
    }
}


pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}


/// Bus one-wire leído a través de `/sys/bus/w1/devices`.
#[derive(Debug, Clone)]
pub struct OneWireBus {
    root: PathBuf,
}


impl OneWireBus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn listing_error(&self, e: std::io::Error) -> SensorError {
        SensorError::Io { sensor: self.root.display().to_string(), reason: e.to_string() }
    }

    fn slave_file(&self, sensor_id: &str) -> PathBuf {
        self.root.join(sensor_id).join("w1_slave")
    }
}


/// Filtra las sondas DS18B20 (familia 0x28) de un listado del bus.
/// Un error de lectura a mitad del listado invalida el listado entero.
fn ds18b20_ids(names: impl IntoIterator<Item = std::io::Result<String>>) -> std::io::Result<Vec<String>> {
    let mut ids = Vec::new();
    for name in names {
        let name = name?;
        if name.starts_with("28-") {
            ids.push(name);
        }
    }
    ids.sort();
    Ok(ids)
}


/// Interpreta el contenido de `w1_slave`.
///
/// La primera línea debe terminar en `YES` (CRC correcto); la segunda contiene
/// `t=<milésimas de grado>`.
pub fn parse_w1_slave(sensor_id: &str, raw: &str) -> Result<f64, SensorError> {
    let mut lines = raw.lines();

    let crc_line = lines.next().unwrap_or_default();
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorError::CrcMismatch(sensor_id.to_string()));
    }

    let millis = lines
        .next()
        .and_then(|line| line.split("t=").nth(1))
        .and_then(|value| value.trim().parse::<i64>().ok())
        .ok_or_else(|| SensorError::Parse {
            sensor: sensor_id.to_string(),
            raw: raw.to_string(),
        })?;

    let celsius = millis as f64 / 1000.0;
    if celsius == DS18B20_POWER_ON_RESET {
        return Err(SensorError::Implausible { sensor: sensor_id.to_string(), value: celsius });
    }

    Ok(round_to(celsius, 2))
}


#[async_trait]
impl TemperatureSource for OneWireBus {
    async fn available_sensors(&self) -> Result<Vec<String>, SensorError> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| self.listing_error(e))?;

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => names.push(Ok(entry.file_name().to_string_lossy().into_owned())),
                Ok(None) => break,
                Err(e) => {
                    names.push(Err(e));
                    break;
                }
            }
        }

        let ids = ds18b20_ids(names).map_err(|e| self.listing_error(e))?;
        debug!("Debug: {} sondas DS18B20 en el bus", ids.len());
        Ok(ids)
    }

    async fn read_temperature(&self, sensor_id: &str) -> Result<f64, SensorError> {
        let path = self.slave_file(sensor_id);
        with_deadline(sensor_id, READ_TIMEOUT, async {
            let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SensorError::NotFound(sensor_id.to_string())
                } else {
                    SensorError::Io { sensor: sensor_id.to_string(), reason: e.to_string() }
                }
            })?;
            parse_w1_slave(sensor_id, &raw)
        }).await
    }
}


/// Sensor DHT22 leído a través del subsistema IIO del kernel.
#[derive(Debug)]
pub struct IioHumiditySensor {
    name: String,
    device: PathBuf,
    last_read: Mutex<Option<Instant>>,
}


impl IioHumiditySensor {
    /// Abre el dispositivo. Falla si el directorio IIO no existe.
    pub fn new(name: impl Into<String>, device: impl Into<PathBuf>) -> Result<Self, SensorError> {
        let name = name.into();
        let device = device.into();

        if !device.join("in_humidityrelative_input").exists() {
            return Err(SensorError::Unavailable(format!("{} ({})", name, device.display())));
        }

        info!("Info: sensor ambiente {} en {}", name, device.display());
        Ok(Self { name, device, last_read: Mutex::new(None) })
    }

    async fn read_channel(&self, channel: &str) -> Result<f64, SensorError> {
        let path = self.device.join(channel);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| SensorError::Io {
            sensor: self.name.clone(),
            reason: e.to_string(),
        })?;
        raw.trim()
            .parse::<f64>()
            .map(|milli| milli / 1000.0)
            .map_err(|_| SensorError::Parse { sensor: self.name.clone(), raw })
    }

    async fn read_once(&self) -> Result<HumiditySample, SensorError> {
        let temperature = self.read_channel("in_temp_input").await?;
        let humidity = self.read_channel("in_humidityrelative_input").await?;
        check_plausible(&self.name, temperature, humidity)
    }
}


/// Descarta muestras físicamente imposibles para un DHT22.
pub fn check_plausible(sensor: &str, temperature: f64, humidity: f64) -> Result<HumiditySample, SensorError> {
    if !(0.0..=100.0).contains(&humidity) {
        return Err(SensorError::Implausible { sensor: sensor.to_string(), value: humidity });
    }
    if !(-20.0..=50.0).contains(&temperature) {
        return Err(SensorError::Implausible { sensor: sensor.to_string(), value: temperature });
    }
    Ok(HumiditySample {
        temperature: round_to(temperature, 1),
        humidity: round_to(humidity, 1),
    })
}


#[async_trait]
impl HumiditySource for IioHumiditySensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_sample(&self) -> Result<HumiditySample, SensorError> {
        let mut last_read = self.last_read.lock().await;

        if let Some(previous) = *last_read {
            let since = previous.elapsed();
            if since < HUMIDITY_MIN_INTERVAL {
                sleep(HUMIDITY_MIN_INTERVAL - since).await;
            }
        }

        let mut last_error = SensorError::Unavailable(self.name.clone());
        for attempt in 1..=HUMIDITY_RETRIES {
            let result = with_deadline(&self.name, READ_TIMEOUT, self.read_once()).await;
            *last_read = Some(Instant::now());

            match result {
                Ok(sample) => {
                    debug!("Debug: {}: {:.1}°C, {:.1}%RH", self.name, sample.temperature, sample.humidity);
                    return Ok(sample);
                }
                Err(e) => {
                    warn!(sensor = %self.name, attempt, "Warning: lectura DHT22 fallida: {e}");
                    last_error = e;
                    if attempt < HUMIDITY_RETRIES {
                        sleep(HUMIDITY_RETRY_PAUSE).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn cleanup(&self) {
        info!("Info: {}: recursos del sensor liberados", self.name);
    }
}


/// Comprueba si una ruta sysfs existe (usado para diagnosticar el bus al arrancar).
pub fn bus_present(root: &Path) -> bool {
    root.is_dir()
}
