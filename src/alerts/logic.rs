//! Ruta de notificación saliente.
//!
//! Cada alerta notificable pasa por el `AlertGate` y, si procede, se envía por
//! todos los transportes configurados. Los transportes se intentan de forma
//! independiente: el fallo de uno no bloquea a los demás.


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use crate::alerts::domain::{AlertGate, AlertKey};
use crate::config::alerts::NOTIFY_TIMEOUT;
use crate::status::domain::Alert;
use crate::system::domain::{NotificationError, System};


/// Transporte de notificación: recibe `(asunto, mensaje)`.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, subject: &str, message: &str) -> Result<(), NotificationError>;
}


fn http_client() -> Client {
    Client::builder()
        .timeout(NOTIFY_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}


/// Webhook de Discord con un embed rojo.
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self { client: http_client(), webhook_url: webhook_url.into() }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, subject: &str, message: &str) -> Result<(), NotificationError> {
        let body = json!({
            "embeds": [{
                "title": format!("🔥 Alarma de calefacción: {subject}"),
                "description": message,
                "color": 0xff0000,
                "timestamp": Utc::now().to_rfc3339(),
                "footer": { "text": "Monitor de calefacción" }
            }]
        });

        let response = self.client.post(&self.webhook_url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Status(response.status()));
        }
        Ok(())
    }
}


/// Bot de Telegram (`sendMessage` con Markdown).
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, subject: &str, message: &str) -> Result<(), NotificationError> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": format!("🔥 *Alarma de calefacción: {subject}*\n\n{message}"),
            "parse_mode": "Markdown",
        });

        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Status(response.status()));
        }
        Ok(())
    }
}


/// Correo por SMTP con STARTTLS. El usuario SMTP actúa como remitente.
pub struct EmailNotifier {
    server: String,
    port: u16,
    user: String,
    password: String,
    recipient: String,
    tz: Tz,
}

impl EmailNotifier {
    pub fn new(system: &System) -> Self {
        Self {
            server: system.smtp_server.clone(),
            port: system.smtp_port,
            user: system.smtp_user.clone(),
            password: system.smtp_password.clone(),
            recipient: system.alert_email.clone(),
            tz: system.alert_timezone,
        }
    }

    /// Arma el correo sin abrir conexión.
    pub fn message(&self, subject: &str, message: &str) -> Result<Message, NotificationError> {
        let now = Utc::now().with_timezone(&self.tz);
        Message::builder()
            .from(self.user.parse()?)
            .to(self.recipient.parse()?)
            .subject(format!("🔥 Alarma de calefacción: {subject}"))
            .header(ContentType::TEXT_PLAIN)
            .body(email_body(subject, message, now))
            .map_err(|e| NotificationError::Email(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, subject: &str, message: &str) -> Result<(), NotificationError> {
        let email = self.message(subject, message)?;

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.server)?
            .port(self.port)
            .timeout(Some(NOTIFY_TIMEOUT));
        if !self.password.is_empty() {
            transport = transport.credentials(Credentials::new(self.user.clone(), self.password.clone()));
        }

        transport.build().send(email).await?;
        Ok(())
    }
}


fn email_body(subject: &str, message: &str, now: DateTime<Tz>) -> String {
    format!(
        "Monitor de calefacción - Alarma\n\n\
         Hora: {}\n\
         Evento: {subject}\n\n\
         Detalles:\n{message}\n\n\
         --\n\
         Notificación automática del monitor de calefacción\n",
        now.format("%d.%m.%Y %H:%M:%S")
    )
}


/// Construye los transportes habilitados en la configuración.
///
/// Un transporte habilitado pero incompleto se omite con un aviso.
pub fn build_notifiers(system: &System) -> Vec<Box<dyn Notifier>> {
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();

    if system.email_enabled {
        if system.alert_email.is_empty() || system.smtp_user.is_empty() {
            warn!("Warning: {}", NotificationError::NotConfigured("ALERT_EMAIL/SMTP_USER"));
        } else {
            notifiers.push(Box::new(EmailNotifier::new(system)));
        }
    }

    if system.discord_enabled {
        if system.discord_webhook_url.is_empty() {
            warn!("Warning: {}", NotificationError::NotConfigured("DISCORD_WEBHOOK_URL"));
        } else {
            notifiers.push(Box::new(DiscordNotifier::new(&system.discord_webhook_url)));
        }
    }

    if system.telegram_enabled {
        if system.telegram_bot_token.is_empty() || system.telegram_chat_id.is_empty() {
            warn!("Warning: {}", NotificationError::NotConfigured("TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID"));
        } else {
            notifiers.push(Box::new(TelegramNotifier::new(
                &system.telegram_api_url,
                &system.telegram_bot_token,
                &system.telegram_chat_id,
            )));
        }
    }

    info!("Info: {} canales de notificación configurados", notifiers.len());
    notifiers
}


/// Asunto de la notificación: `"<TIPO> - <circuito>"`.
pub fn subject(alert: &Alert) -> String {
    format!("{} - {}", alert.alert_type.as_str().to_uppercase(), alert.circuit)
}


/// Cuerpo de la notificación con la hora local de la instalación.
pub fn body(alert: &Alert, tz: Tz) -> String {
    let local: DateTime<Tz> = alert.timestamp.with_timezone(&tz);
    let mut text = format!(
        "Circuito: {}\nTipo: {}\nMensaje: {}",
        alert.circuit,
        alert.alert_type.as_str(),
        alert.message
    );
    if let Some(value) = alert.value {
        text.push_str(&format!("\nValor: {value:.1}"));
    }
    text.push_str(&format!("\nHora: {}", local.format("%d.%m.%Y %H:%M:%S %Z")));
    text
}


/// Envía un mensaje por todos los transportes. Devuelve cuántos lo aceptaron.
pub async fn broadcast(notifiers: &[Box<dyn Notifier>], subject: &str, message: &str) -> usize {
    let mut sent = 0;

    for notifier in notifiers {
        let result = match timeout(NOTIFY_TIMEOUT, notifier.send(subject, message)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Timeout),
        };

        match result {
            Ok(()) => {
                info!(transport = notifier.name(), "Info: alarma enviada: {subject}");
                sent += 1;
            }
            Err(e) => {
                error!(transport = notifier.name(), "Error: envío de alarma fallido: {e}");
            }
        }
    }

    sent
}


/// Resumen de una pasada de notificación.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub considered: usize,
    pub suppressed: usize,
    pub delivered: usize,
}


/// Filtra las alertas de un ciclo por el `AlertGate` y las notifica.
pub async fn dispatch_alerts(alerts: &[Alert], gate: &AlertGate,
                             notifiers: &[Box<dyn Notifier>], tz: Tz) -> DispatchReport {
    let mut report = DispatchReport::default();

    for alert in alerts.iter().filter(|a| a.alert_type.is_notifiable()) {
        report.considered += 1;

        if !gate.should_send(&AlertKey::from(alert)) {
            debug!(tracked = gate.tracked_keys(), "Debug: cooldown activo para {} / {}", alert.circuit, alert.message);
            report.suppressed += 1;
            continue;
        }

        let subject = subject(alert);
        if notifiers.is_empty() {
            warn!("Warning: ningún canal de alarma disponible para: {subject}");
            continue;
        }

        let sent = broadcast(notifiers, &subject, &body(alert, tz)).await;
        if sent > 0 {
            info!("Info: alarma enviada por {sent} canal(es): {subject}");
            report.delivered += 1;
        } else {
            warn!("Warning: ningún canal aceptó la alarma: {subject}");
        }
    }

    report
}
