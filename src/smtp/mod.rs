//! SMTP engine: the inbound RFC 5321 state machine plus the outbound relay
//! client and the per-recipient delivery pipeline.

mod command;
pub mod delivery;
pub mod relay;
mod response;
mod session;
mod transaction;

pub use command::{parse_command, SmtpCommand};
pub use delivery::DeliveryPipeline;
pub use relay::RelayClient;
pub use response::SmtpResponse;
pub use session::{SmtpResult, SmtpSession, SmtpState};
pub use transaction::MailTransaction;
