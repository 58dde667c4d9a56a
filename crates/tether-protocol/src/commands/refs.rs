//! External reference analysis payloads.
//!
//! The debugger side may report records it could only partially resolve.
//! Those records are not actionable on the disassembler side and are dropped
//! while parsing.

use crate::wire::{
    AnalysisContext, AnalyzeExternalRefsRequest, AnalyzeExternalRefsResult, PointerData, RefData,
};

/// Range and image bounds of an external reference scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExternalRefsQuery {
    /// First address to scan.
    pub from: u64,
    /// End of the scan range.
    pub to: u64,
    /// Scan step.
    pub increment: u64,
    /// Base of the analysed image.
    pub image_base: u64,
    /// Size of the analysed image.
    pub image_size: u64,
}

impl ExternalRefsQuery {
    pub(crate) const fn to_wire(self) -> AnalyzeExternalRefsRequest {
        AnalyzeExternalRefsRequest {
            ea_from: self.from,
            ea_to: self.to,
            increment: self.increment,
            analysing_base: self.image_base,
            analysing_size: self.image_size,
        }
    }

    pub(crate) const fn from_wire(request: &AnalyzeExternalRefsRequest) -> Self {
        Self {
            from: request.ea_from,
            to: request.ea_to,
            increment: request.increment,
            image_base: request.analysing_base,
            image_size: request.analysing_size,
        }
    }
}

/// A pointer resolving into an imported procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerRecord {
    /// Address of the pointer.
    pub address: u64,
    /// Exporting module.
    pub module: String,
    /// Procedure name.
    pub procedure: String,
}

impl PointerRecord {
    const fn is_resolved(&self) -> bool {
        self.address != 0 && !self.module.is_empty() && !self.procedure.is_empty()
    }
}

/// An instruction that references imported code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRef {
    /// Instruction address.
    pub instruction_address: u64,
    /// Instruction length in bytes.
    pub length: u32,
    /// Disassembly text.
    pub disassembly: String,
    /// Referenced value.
    pub value: u64,
    /// Reference kind as reported by the debugger.
    pub ref_type: u32,
    /// Exporting module.
    pub module: String,
    /// Procedure name.
    pub procedure: String,
}

impl ExternalRef {
    const fn is_resolved(&self) -> bool {
        self.instruction_address != 0
            && self.value != 0
            && !self.disassembly.is_empty()
            && self.length > 0
            && !self.module.is_empty()
            && !self.procedure.is_empty()
    }
}

/// Parsed result of an external reference scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalRefsReport {
    /// Instruction pointer captured during the scan.
    pub eip: u64,
    /// Resolved API pointers.
    pub pointers: Vec<PointerRecord>,
    /// Resolved instruction references.
    pub refs: Vec<ExternalRef>,
}

impl ExternalRefsReport {
    pub(crate) fn to_wire(&self) -> AnalyzeExternalRefsResult {
        AnalyzeExternalRefsResult {
            context: Some(AnalysisContext { eip: self.eip }),
            api_constants: self
                .pointers
                .iter()
                .map(|pointer| PointerData {
                    ea: pointer.address,
                    module: pointer.module.clone(),
                    proc: pointer.procedure.clone(),
                })
                .collect(),
            refs: self
                .refs
                .iter()
                .map(|reference| RefData {
                    ea: reference.instruction_address,
                    len: reference.length,
                    dis: reference.disassembly.clone(),
                    v: reference.value,
                    ref_type: reference.ref_type,
                    module: reference.module.clone(),
                    proc: reference.procedure.clone(),
                })
                .collect(),
        }
    }

    /// Converts a wire result, discarding partially resolved records.
    pub(crate) fn from_wire(result: AnalyzeExternalRefsResult) -> Self {
        let pointers = result
            .api_constants
            .into_iter()
            .map(|data| PointerRecord {
                address: data.ea,
                module: data.module,
                procedure: data.proc,
            })
            .filter(PointerRecord::is_resolved)
            .collect();
        let refs = result
            .refs
            .into_iter()
            .map(|data| ExternalRef {
                instruction_address: data.ea,
                length: data.len,
                disassembly: data.dis,
                value: data.v,
                ref_type: data.ref_type,
                module: data.module,
                procedure: data.proc,
            })
            .filter(ExternalRef::is_resolved)
            .collect();
        Self {
            eip: result.context.map_or(0, |context| context.eip),
            pointers,
            refs,
        }
    }
}
