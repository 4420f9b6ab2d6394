use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::NotifyParameters;
use crate::errors::NotifyError;

/// Sends a short run-summary notification over SMTP.
pub struct Notifier {
    sender: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl Notifier {
    /// Returns a new instance of the Notifier.
    ///
    /// # Arguments
    ///
    /// * 'config' - notification configuration parameters
    pub fn new(config: &NotifyParameters) -> Result<Self, NotifyError> {
        let credentials = Credentials::new(config.smtp_user.to_owned(), config.smtp_password.to_owned());
        let sender = SmtpTransport::relay(&config.smtp_endpoint)?
            .credentials(credentials)
            .build();

        let from = config.from.parse::<Mailbox>()?;
        let to = config.to.parse::<Mailbox>()?;

        Ok(Self { sender, from, to })
    }

    /// Sends a notification with the given subject and body.
    ///
    /// # Arguments
    ///
    /// * 'subject' - the subject of the notification
    /// * 'body' - the body of the notification
    pub fn send(&self, subject: String, body: String) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.sender.send(&message)?;

        Ok(())
    }
}
