//! Wire format of a queued notification.
//!
//! Tags 1-10 are the fields every deployed producer writes. Tags 11 and 12
//! were appended later; consumers treat their absence as an initial
//! notification with a derived subject.

use prost::Message;

use crate::error::QueueError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TemplateKind {
    /// First email sent on submission, carries the decrypt URL
    Initial = 0,
    /// Reminder for an unviewed message, never carries a URL
    Reminder = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotificationEnvelope {
    #[prost(string, tag = "1")]
    pub sender_email: String,
    #[prost(string, tag = "2")]
    pub sender_name: String,
    #[prost(string, tag = "3")]
    pub recipient_name: String,
    #[prost(string, tag = "4")]
    pub recipient_last_name: String,
    #[prost(string, tag = "5")]
    pub recipient_email: String,
    #[prost(string, tag = "6")]
    pub unique_id: String,
    /// Message body shown to the recipient
    #[prost(string, tag = "7")]
    pub content: String,
    /// Decrypt URL, empty for reminders
    #[prost(string, tag = "8")]
    pub url: String,
    #[prost(string, tag = "9")]
    pub additional_info: String,
    #[prost(string, tag = "10")]
    pub captcha: String,
    #[prost(string, tag = "11")]
    pub subject: String,
    #[prost(enumeration = "TemplateKind", tag = "12")]
    pub kind: i32,
}

impl NotificationEnvelope {
    pub fn encode_to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn decode_from(bytes: &[u8]) -> Result<Self, QueueError> {
        Ok(Self::decode(bytes)?)
    }

    pub fn template_kind(&self) -> TemplateKind {
        TemplateKind::try_from(self.kind).unwrap_or(TemplateKind::Initial)
    }

    pub fn with_kind(mut self, kind: TemplateKind) -> Self {
        self.kind = kind as i32;
        self
    }
}
