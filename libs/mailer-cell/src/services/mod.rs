pub mod locale;
pub mod mailer;
pub mod producer;
pub mod queue;
pub mod template;
pub mod worker;
