use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::templates::EmailTemplate;
use crate::{Alert, NotificationChannel, NotificationConfig, NotificationError, SmtpTls};

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        if config.smtp_host.trim().is_empty() {
            return Err(NotificationError::Config("SMTP host not set".into()));
        }

        let from: Mailbox = config
            .smtp_from
            .parse()
            .map_err(|e| NotificationError::Config(format!("Invalid from address: {}", e)))?;

        let to = config
            .smtp_to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>().map_err(|e| {
                    NotificationError::Config(format!("Invalid recipient {:?}: {}", addr, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if to.is_empty() {
            return Err(NotificationError::Config("No recipients configured".into()));
        }

        let host = config.smtp_host.as_str();
        let mut builder = match config.smtp_tls {
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                host,
            )),
        }
        .map_err(|e| NotificationError::Smtp(format!("SMTP transport error: {}", e)))?;

        builder = builder
            .port(config.smtp_port)
            .timeout(Some(config.smtp_timeout));

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let transport = builder.build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }

    /// Build the message: plain text body with an HTML alternative.
    pub fn build_message(&self, alert: &Alert) -> Result<Message, NotificationError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(&alert.title);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                alert.message.clone(),
                EmailTemplate::render(alert),
            ))
            .map_err(|e| NotificationError::Smtp(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl NotificationChannel for SmtpNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let email = self.build_message(alert)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::Smtp(format!("Failed to send email: {}", e)))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}
