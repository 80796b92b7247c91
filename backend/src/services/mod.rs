pub mod email;
pub mod notifier;

pub use email::{EmailError, EmailService, MailTransport, OutgoingEmail};
pub use notifier::{EmailNotification, EmailNotifier};
