pub mod gmail;
pub mod outlook;
pub mod sendgrid;
pub mod smtp_relay;

/// One sender or recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub name: String,
    pub addr: String,
}

impl Address {
    pub fn new(name: &str, addr: &str) -> Self {
        Address {
            name: name.to_string(),
            addr: addr.to_string(),
        }
    }

    /// `Name <addr>` when a display name is present, bare address otherwise.
    pub fn rfc_format(&self) -> String {
        if self.name.trim().is_empty() {
            self.addr.clone()
        } else {
            format!("{} <{}>", self.name, self.addr)
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentBlob {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Canonical outbound message. Adapters translate this into their wire
/// shape; none of them touch the datastore.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: Address,
    pub to: Address,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body_html: String,
    pub attachments: Vec<AttachmentBlob>,
}

/// What a provider acknowledged. Either id may be absent depending on the
/// transport; the raw relay reports nothing at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: Option<String>,
    pub thread_id: Option<String>,
}
