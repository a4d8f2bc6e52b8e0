/// A command packet before framing: command code plus optional payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub cmd: u8,

    /// Payload bytes (may be empty).
    pub data: Vec<u8>,
}

impl Message {
    /// Creates a message without payload.
    pub fn new(cmd: u8) -> Message {
        Message::with_data(cmd, &[])
    }

    /// Creates a message carrying `data` as payload.
    #[inline]
    pub fn with_data(cmd: u8, data: &[u8]) -> Message {
        Message {
            cmd,
            data: data.to_vec(),
        }
    }

    #[inline]
    pub fn has_payload(&self) -> bool {
        !self.data.is_empty()
    }
}
