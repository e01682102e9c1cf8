//! Listener/dispatcher: three accepting loops feeding a bounded worker
//! pool, with one connection handler per protocol kind.

mod handler;
mod listener;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, ServerConfig};
use crate::smtp::DeliveryPipeline;
use crate::storage::MailStore;

pub use listener::run;

/// The three wire protocols this server speaks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtocolKind {
    Smtp,
    Imap,
    Pop3,
}

impl ProtocolKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Smtp => "SMTP",
            Self::Imap => "IMAP",
            Self::Pop3 => "POP3",
        }
    }

    pub fn port(self) -> u16 {
        match self {
            Self::Smtp => config::SMTP_PORT,
            Self::Imap => config::IMAP_PORT,
            Self::Pop3 => config::POP3_PORT,
        }
    }

    pub fn idle_timeout(self) -> Duration {
        match self {
            Self::Smtp => config::SMTP_IDLE,
            Self::Imap => config::IMAP_IDLE,
            Self::Pop3 => config::POP3_IDLE,
        }
    }
}

/// Everything a connection handler needs, built once in `main`.
pub struct ServerContext {
    pub config: Arc<ServerConfig>,
    pub store: Arc<MailStore>,
    pub delivery: DeliveryPipeline,
}
