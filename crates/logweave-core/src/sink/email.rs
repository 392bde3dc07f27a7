use super::wire::BackgroundQueue;
use super::{Sink, SinkFilter};
use crate::config::EmailSinkSettings;
use crate::error::SinkError;
use crate::format::FormatterManager;
use crate::record::LogEvent;
use std::sync::{Arc, Mutex};

const SUBJECT_MESSAGE_LIMIT: usize = 120;

/// Addressing of alert mails
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailOptions {
    /// Sender address
    pub from: String,
    /// Recipients
    pub to: Vec<String>,
    /// Subject prefix
    pub subject: String,
    /// Mail relay host
    pub smtp_host: String,
    /// Mail relay port
    pub smtp_port: u16,
}

impl EmailOptions {
    /// Options with a sender and one recipient
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let defaults = EmailSinkSettings::default();
        Self {
            from: from.into(),
            to: vec![to.into()],
            subject: defaults.subject,
            smtp_host: defaults.smtp_host,
            smtp_port: defaults.smtp_port,
        }
    }

    /// Add a recipient
    pub fn with_recipient(mut self, to: impl Into<String>) -> Self {
        self.to.push(to.into());
        self
    }

    /// Set the subject prefix
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

impl From<&EmailSinkSettings> for EmailOptions {
    fn from(settings: &EmailSinkSettings) -> Self {
        Self {
            from: settings.from.clone(),
            to: settings.to.clone(),
            subject: settings.subject.clone(),
            smtp_host: settings.smtp_host.clone(),
            smtp_port: settings.smtp_port,
        }
    }
}

/// One alert mail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailMessage {
    /// Sender
    pub from: String,
    /// Recipients
    pub to: Vec<String>,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// Delivers alert mails; SMTP itself lives outside this crate
pub trait MailTransport: Send + Sync {
    /// Send `message` through the relay in `options`
    fn send(&self, options: &EmailOptions, message: MailMessage) -> Result<(), SinkError>;
}

/// Records every message; clones share the buffer
#[derive(Clone, Debug, Default)]
pub struct MemoryMailTransport {
    sent: Arc<Mutex<Vec<MailMessage>>>,
}

impl MemoryMailTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl MailTransport for MemoryMailTransport {
    fn send(&self, _options: &EmailOptions, message: MailMessage) -> Result<(), SinkError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| SinkError::write("memory-mail", e))?;
        sent.push(message);
        Ok(())
    }
}

/// Hands mails to a worker task so a slow relay never delays the caller
pub struct BackgroundMailTransport {
    queue: BackgroundQueue<(EmailOptions, MailMessage)>,
}

impl BackgroundMailTransport {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(inner: Arc<dyn MailTransport>, capacity: usize) -> Result<Self, SinkError> {
        let queue = BackgroundQueue::spawn(
            "email".to_string(),
            capacity,
            move |(options, message): (EmailOptions, MailMessage)| inner.send(&options, message),
        )?;
        Ok(Self { queue })
    }
}

impl MailTransport for BackgroundMailTransport {
    fn send(&self, options: &EmailOptions, message: MailMessage) -> Result<(), SinkError> {
        self.queue.push((options.clone(), message))
    }
}

/// Mails genuine system failures; policy-validation rejections never alert
pub struct EmailSink {
    options: EmailOptions,
    transport: Arc<dyn MailTransport>,
    formatter: Arc<FormatterManager>,
    filter: SinkFilter,
}

impl EmailSink {
    /// Create the sink
    pub fn new(
        options: EmailOptions,
        transport: Arc<dyn MailTransport>,
        formatter: Arc<FormatterManager>,
    ) -> Self {
        Self {
            options,
            transport,
            formatter,
            filter: SinkFilter::SystemErrors,
        }
    }

    /// Addressing in use
    pub fn options(&self) -> &EmailOptions {
        &self.options
    }

    fn subject(&self, event: &LogEvent) -> String {
        let message = event.record.message();
        let head = message.lines().next().unwrap_or_default();
        let head: String = head.chars().take(SUBJECT_MESSAGE_LIMIT).collect();
        if head.is_empty() {
            self.options.subject.clone()
        } else {
            format!("{}: {}", self.options.subject, head)
        }
    }
}

impl Sink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    fn accepts(&self, event: &LogEvent) -> bool {
        self.filter.matches(event)
    }

    fn emit(&self, event: &LogEvent) -> Result<(), SinkError> {
        if self.options.to.is_empty() {
            return Err(SinkError::Unavailable("email (no recipients)".to_string()));
        }
        let message = MailMessage {
            from: self.options.from.clone(),
            to: self.options.to.clone(),
            subject: self.subject(event),
            body: self.formatter.format_log_event(event),
        };
        self.transport.send(&self.options, message)
    }
}
