pub mod postgres {
    use tokio::time::{Duration};

    pub const CONNECT_ATTEMPTS: u32 = 3;
    pub const WAIT_FOR: Duration = Duration::from_secs(5);
    pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const TABLE: &str = "heating_point";
}

pub mod sensors {
    use tokio::time::{Duration};

    pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
    pub const BETWEEN_SENSORS: Duration = Duration::from_millis(100);
    pub const BETWEEN_CIRCUITS: Duration = Duration::from_millis(200);
    pub const HUMIDITY_RETRIES: u32 = 3;
    pub const HUMIDITY_RETRY_PAUSE: Duration = Duration::from_secs(1);
    pub const HUMIDITY_MIN_INTERVAL: Duration = Duration::from_secs(2);
    /// Valor de arranque del DS18B20, nunca es una medición real.
    pub const DS18B20_POWER_ON_RESET: f64 = 85.0;
}

pub mod circuits {
    /// Diferencia mínima (estricta) para considerar un circuito en circulación.
    pub const ACTIVE_DIFFERENCE: f64 = 2.0;
    pub const DEFAULT_CONFIG_PATH: &str = "config/heating_circuits.yaml";
}

pub mod alerts {
    use chrono::TimeDelta;
    use tokio::time::{Duration};

    pub const COOLDOWN: TimeDelta = TimeDelta::minutes(30);
    pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
    pub const SYSTEM_SOURCE: &str = "system";
}
