//! Label and comment synchronisation payloads.

use crate::wire::{MakeNamesRequest, NameItem};

/// Longest label, in bytes, the debugger UI accepts (its 256-byte text field
/// minus the terminator).
pub const MAX_LABEL_BYTES: usize = 255;

/// One label or comment to apply at an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    /// Address in the disassembler's image.
    pub address: u64,
    /// Label or comment text.
    pub label: String,
}

impl NameEntry {
    /// Builds an entry.
    #[must_use]
    pub fn new(address: u64, label: impl Into<String>) -> Self {
        Self {
            address,
            label: label.into(),
        }
    }
}

/// A batch of entries together with the image bases used for rebasing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameBatch {
    /// Image base in the disassembler.
    pub base: u64,
    /// Image base in the debuggee.
    pub remote_base: u64,
    /// Entries to apply.
    pub entries: Vec<NameEntry>,
}

impl NameBatch {
    pub(crate) fn to_wire(&self) -> MakeNamesRequest {
        MakeNamesRequest {
            base: self.base,
            remote_base: self.remote_base,
            names: self
                .entries
                .iter()
                .map(|entry| NameItem {
                    ea: entry.address,
                    name: truncate_label(&entry.label).to_owned(),
                })
                .collect(),
        }
    }

    pub(crate) fn from_wire(request: MakeNamesRequest) -> Self {
        Self {
            base: request.base,
            remote_base: request.remote_base,
            entries: request
                .names
                .into_iter()
                .map(|item| NameEntry::new(item.ea, item.name))
                .collect(),
        }
    }
}

/// Cuts a label to at most [`MAX_LABEL_BYTES`] bytes.
///
/// The cut lands on a character boundary, so a multi-byte character that
/// straddles the limit is dropped whole.
#[must_use]
pub fn truncate_label(label: &str) -> &str {
    if label.len() <= MAX_LABEL_BYTES {
        return label;
    }
    let mut end = MAX_LABEL_BYTES;
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    label.get(..end).unwrap_or_default()
}
