pub mod client;
pub mod models;

pub use client::{EmailFactory, MailgunClient};
pub use models::{EmailCredentials, Message, SendResponse};
