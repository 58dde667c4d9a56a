//! PE header inspection payloads.

use crate::wire::{CheckPeHeadersRequest, CheckPeHeadersResult, ExportItem, SectionItem};

/// Mapped image to inspect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeHeadersQuery {
    /// Image base.
    pub base: u64,
    /// Image size.
    pub size: u64,
}

impl PeHeadersQuery {
    pub(crate) const fn to_wire(self) -> CheckPeHeadersRequest {
        CheckPeHeadersRequest {
            base: self.base,
            size: self.size,
        }
    }

    pub(crate) const fn from_wire(request: &CheckPeHeadersRequest) -> Self {
        Self {
            base: request.base,
            size: request.size,
        }
    }
}

/// An exported symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeExport {
    /// Symbol address.
    pub address: u64,
    /// Export ordinal.
    pub ordinal: u32,
    /// Symbol name.
    pub name: String,
}

/// A section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeSection {
    /// Section name.
    pub name: String,
    /// Virtual address.
    pub virtual_address: u64,
    /// Virtual size.
    pub virtual_size: u64,
    /// File offset of the raw data.
    pub raw_offset: u64,
    /// Raw data size.
    pub raw_size: u64,
    /// Characteristics flags.
    pub characteristics: u32,
}

/// Parsed PE header report.
///
/// Exports and sections are only read when the headers were valid; an
/// invalid report is always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeHeaders {
    /// Whether the headers parsed on the debugger side.
    pub valid: bool,
    /// Export table.
    pub exports: Vec<PeExport>,
    /// Section table.
    pub sections: Vec<PeSection>,
}

impl PeHeaders {
    pub(crate) fn to_wire(&self) -> CheckPeHeadersResult {
        CheckPeHeadersResult {
            pe_valid: self.valid,
            exps: self
                .exports
                .iter()
                .map(|export| ExportItem {
                    ea: export.address,
                    ord: export.ordinal,
                    name: export.name.clone(),
                })
                .collect(),
            sections: self
                .sections
                .iter()
                .map(|section| SectionItem {
                    name: section.name.clone(),
                    va: section.virtual_address,
                    v_size: section.virtual_size,
                    raw: section.raw_offset,
                    raw_size: section.raw_size,
                    characteristics: section.characteristics,
                })
                .collect(),
        }
    }

    pub(crate) fn from_wire(result: CheckPeHeadersResult) -> Self {
        if !result.pe_valid {
            return Self::default();
        }
        Self {
            valid: true,
            exports: result
                .exps
                .into_iter()
                .map(|item| PeExport {
                    address: item.ea,
                    ordinal: item.ord,
                    name: item.name,
                })
                .collect(),
            sections: result
                .sections
                .into_iter()
                .map(|item| PeSection {
                    name: item.name,
                    virtual_address: item.va,
                    virtual_size: item.v_size,
                    raw_offset: item.raw,
                    raw_size: item.raw_size,
                    characteristics: item.characteristics,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_section() -> SectionItem {
        SectionItem {
            name: ".text".to_owned(),
            va: 0x1000,
            v_size: 0x2_0000,
            raw: 0x400,
            raw_size: 0x2_0000,
            characteristics: 0x6000_0020,
        }
    }

    #[test]
    fn invalid_headers_discard_tables() {
        let headers = PeHeaders::from_wire(CheckPeHeadersResult {
            pe_valid: false,
            exps: vec![ExportItem {
                ea: 0x1000,
                ord: 1,
                name: "DllMain".to_owned(),
            }],
            sections: vec![text_section()],
        });
        assert_eq!(headers, PeHeaders::default());
    }

    #[test]
    fn valid_headers_keep_tables() {
        let headers = PeHeaders::from_wire(CheckPeHeadersResult {
            pe_valid: true,
            exps: Vec::new(),
            sections: vec![text_section()],
        });
        assert!(headers.valid);
        assert_eq!(headers.sections.len(), 1);
        assert_eq!(headers.sections[0].name, ".text");
        assert_eq!(headers.sections[0].characteristics, 0x6000_0020);
    }
}
