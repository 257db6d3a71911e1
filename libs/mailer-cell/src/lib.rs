pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::mailer::{HttpMailer, MailError, MailMessage, Mailer};
pub use services::producer::CancellationMailProducer;
pub use services::queue::{CancellationQueue, RedisCancellationQueue};
pub use services::worker::MailWorkerService;
