//! Message I/O — outbound transport and inbound task mailbox.

pub mod channel;
pub mod email;
pub mod email_types;

pub use channel::{InboundChannel, MessageTransport};
pub use email::{ImapMailbox, SmtpMailer};
pub use email_types::{InboundEmail, OutboundEmail};
