/// One in-progress mail transaction: envelope sender, recipients and the
/// accumulated (dot-unstuffed) message data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MailTransaction {
    pub sender: String,
    pub recipients: Vec<String>,
    pub data: Vec<u8>,
}

impl MailTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.sender.clear();
        self.recipients.clear();
        self.data.clear();
    }

    pub fn has_recipients(&self) -> bool {
        !self.recipients.is_empty()
    }
}
