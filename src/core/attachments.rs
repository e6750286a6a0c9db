//! Pending-attachment buffer.
//!
//! Files wait here between upload and the next sent message. Validation
//! happens on entry (allow-list, count cap); sending drains the buffer into
//! base64 inline content parts.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::core::message::ContentPart;
use crate::error::ValidationError;

/// Plain-text-ish formats accepted by extension regardless of MIME type.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "html", "js", "css", "json", "xml", "csv", "py", "java", "sql", "log", "md", "txt", "pdf",
    "docx",
];

/// One raw file waiting to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Buffer of files staged for the next message.
#[derive(Debug, Default)]
pub struct AttachmentBuffer {
    pending: Vec<Attachment>,
    max_attachments: usize,
}

impl AttachmentBuffer {
    pub fn new(max_attachments: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_attachments,
        }
    }

    pub fn pending(&self) -> &[Attachment] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Stage one file. Rejections leave the buffer untouched.
    pub fn add(
        &mut self,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<(), ValidationError> {
        if self.pending.len() >= self.max_attachments {
            return Err(ValidationError::AttachmentLimit(self.max_attachments));
        }

        let file_name = file_name.into();
        let mime_type = mime_type.into().to_ascii_lowercase();
        if !is_supported(&file_name, &mime_type) {
            return Err(ValidationError::UnsupportedAttachment(file_name));
        }

        self.pending.push(Attachment {
            file_name,
            mime_type,
            data,
        });
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Attachment> {
        if index < self.pending.len() {
            Some(self.pending.remove(index))
        } else {
            None
        }
    }

    /// Convert everything staged into inline content parts and clear the
    /// buffer. The raw bytes are dropped once encoded.
    pub fn drain_parts(&mut self) -> Vec<ContentPart> {
        self.pending
            .drain(..)
            .map(|attachment| ContentPart::Attachment {
                mime_type: attachment.mime_type,
                data: BASE64.encode(&attachment.data),
            })
            .collect()
    }
}

fn is_supported(file_name: &str, mime_type: &str) -> bool {
    if (mime_type.starts_with("image/") && mime_type != "image/gif")
        || mime_type.starts_with("audio/")
        || mime_type.starts_with("video/")
    {
        return true;
    }

    file_name
        .rsplit('.')
        .next()
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
