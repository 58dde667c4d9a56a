//! Protocol buffer envelopes exchanged between the disassembler and the
//! debugger.
//!
//! Field tags are part of the wire contract and must never be renumbered.

use prost::{Enumeration, Message};

/// Client to server message: a script to run, a structured request, or a poll.
#[derive(Clone, PartialEq, Message)]
pub struct Execute {
    /// Script source. Empty for structured requests and polls.
    #[prost(bytes = "vec", tag = "1")]
    pub script: Vec<u8>,
    /// JSON document bound into the script environment before it runs.
    #[prost(bytes = "vec", tag = "2")]
    pub script_extern_obj: Vec<u8>,
    /// Serialized [`RpcRequest`]. Empty for plain scripts and polls.
    #[prost(bytes = "vec", tag = "3")]
    pub rpc_request: Vec<u8>,
    /// Re-arm the job after each delivery instead of removing it.
    #[prost(bool, tag = "4")]
    pub background: bool,
    /// Existing job to poll.
    #[prost(uint64, optional, tag = "5")]
    pub job_id: Option<u64>,
}

/// Delivery state reported in a [`Response`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum JobStatus {
    /// The job has not finished yet.
    Pending = 0,
    /// The job finished and the response carries its output.
    Finished = 1,
}

/// Server to client message.
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    /// Job the response belongs to.
    #[prost(uint64, optional, tag = "1")]
    pub job_id: Option<u64>,
    /// Captured standard output of the job.
    #[prost(string, tag = "2")]
    pub std_out: String,
    /// Captured standard error of the job.
    #[prost(string, tag = "3")]
    pub std_err: String,
    /// Protocol or execution error text.
    #[prost(string, optional, tag = "4")]
    pub error: Option<String>,
    /// Delivery state.
    #[prost(enumeration = "JobStatus", optional, tag = "5")]
    pub job_status: Option<i32>,
    /// Serialized result matching the request type.
    #[prost(bytes = "vec", tag = "6")]
    pub rpc_result: Vec<u8>,
}

/// Discriminant of a structured request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum RequestType {
    /// Not a valid request.
    Unknown = 0,
    /// Apply labels.
    MakeNames = 1,
    /// Apply comments.
    MakeComments = 2,
    /// List memory regions of the debuggee.
    GetMemoryMap = 3,
    /// Read raw bytes of memory regions.
    ReadMemoryRegions = 4,
    /// Resolve references to imported code.
    AnalyzeExternalRefs = 5,
    /// Inspect PE headers of a mapped image.
    CheckPeHeaders = 6,
}

/// Structured request envelope.
#[derive(Clone, PartialEq, Message)]
pub struct RpcRequest {
    /// Request discriminant.
    #[prost(enumeration = "RequestType", tag = "1")]
    pub request_type: i32,
    /// Request body. Absent for [`RequestType::GetMemoryMap`].
    #[prost(oneof = "rpc_request::Payload", tags = "2, 3, 4, 5, 6")]
    pub payload: Option<rpc_request::Payload>,
}

/// Payload variants of [`RpcRequest`].
pub mod rpc_request {
    use prost::Oneof;

    /// One populated body per request type.
    #[derive(Clone, PartialEq, Oneof)]
    pub enum Payload {
        /// Body of [`super::RequestType::MakeNames`].
        #[prost(message, tag = "2")]
        MakeNames(super::MakeNamesRequest),
        /// Body of [`super::RequestType::MakeComments`].
        #[prost(message, tag = "3")]
        MakeComments(super::MakeNamesRequest),
        /// Body of [`super::RequestType::ReadMemoryRegions`].
        #[prost(message, tag = "4")]
        ReadMemoryRegions(super::ReadMemoryRegionsRequest),
        /// Body of [`super::RequestType::AnalyzeExternalRefs`].
        #[prost(message, tag = "5")]
        AnalyzeExternalRefs(super::AnalyzeExternalRefsRequest),
        /// Body of [`super::RequestType::CheckPeHeaders`].
        #[prost(message, tag = "6")]
        CheckPeHeaders(super::CheckPeHeadersRequest),
    }
}

/// One address/text pair.
#[derive(Clone, PartialEq, Message)]
pub struct NameItem {
    /// Address in the disassembler's image.
    #[prost(uint64, tag = "1")]
    pub ea: u64,
    /// Label or comment text.
    #[prost(string, tag = "2")]
    pub name: String,
}

/// Body shared by the names and comments requests.
#[derive(Clone, PartialEq, Message)]
pub struct MakeNamesRequest {
    /// Image base in the disassembler.
    #[prost(uint64, tag = "1")]
    pub base: u64,
    /// Image base in the debuggee.
    #[prost(uint64, tag = "2")]
    pub remote_base: u64,
    /// Entries to apply.
    #[prost(message, repeated, tag = "3")]
    pub names: Vec<NameItem>,
}

/// One entry of the debuggee memory map.
#[derive(Clone, PartialEq, Message)]
pub struct MemoryInfo {
    /// Region start.
    #[prost(uint64, tag = "1")]
    pub base: u64,
    /// Region length.
    #[prost(uint64, tag = "2")]
    pub size: u64,
    /// Access flags.
    #[prost(uint32, tag = "3")]
    pub access: u32,
    /// Owning module name, possibly empty.
    #[prost(string, tag = "4")]
    pub name: String,
}

/// Result of [`RequestType::GetMemoryMap`].
#[derive(Clone, PartialEq, Message)]
pub struct GetMemoryMapResult {
    /// Regions in debugger order.
    #[prost(message, repeated, tag = "1")]
    pub memories: Vec<MemoryInfo>,
}

/// A region to read.
#[derive(Clone, PartialEq, Message)]
pub struct RegionRequest {
    /// Region start.
    #[prost(uint64, tag = "1")]
    pub addr: u64,
    /// Region length.
    #[prost(uint64, tag = "2")]
    pub size: u64,
}

/// Body of [`RequestType::ReadMemoryRegions`].
#[derive(Clone, PartialEq, Message)]
pub struct ReadMemoryRegionsRequest {
    /// Regions in the order results are expected.
    #[prost(message, repeated, tag = "1")]
    pub regions: Vec<RegionRequest>,
}

/// Contents of one region read.
#[derive(Clone, PartialEq, Message)]
pub struct RegionData {
    /// Region start, echoed from the request.
    #[prost(uint64, tag = "1")]
    pub addr: u64,
    /// Region length, echoed from the request.
    #[prost(uint64, tag = "2")]
    pub size: u64,
    /// Raw bytes.
    #[prost(bytes = "vec", tag = "3")]
    pub mem: Vec<u8>,
    /// Page protection flags.
    #[prost(uint32, tag = "4")]
    pub protect: u32,
}

/// Result of [`RequestType::ReadMemoryRegions`].
#[derive(Clone, PartialEq, Message)]
pub struct ReadMemoryRegionsResult {
    /// One entry per requested region, in request order.
    #[prost(message, repeated, tag = "1")]
    pub memories: Vec<RegionData>,
}

/// Body of [`RequestType::AnalyzeExternalRefs`].
#[derive(Clone, PartialEq, Message)]
pub struct AnalyzeExternalRefsRequest {
    /// First address to scan.
    #[prost(uint64, tag = "1")]
    pub ea_from: u64,
    /// End of the scan range.
    #[prost(uint64, tag = "2")]
    pub ea_to: u64,
    /// Scan step.
    #[prost(uint64, tag = "3")]
    pub increment: u64,
    /// Base of the analysed image.
    #[prost(uint64, tag = "4")]
    pub analysing_base: u64,
    /// Size of the analysed image.
    #[prost(uint64, tag = "5")]
    pub analysing_size: u64,
}

/// Thread context captured during analysis.
#[derive(Clone, PartialEq, Message)]
pub struct AnalysisContext {
    /// Instruction pointer.
    #[prost(uint64, tag = "1")]
    pub eip: u64,
}

/// A pointer that resolves into an imported procedure.
#[derive(Clone, PartialEq, Message)]
pub struct PointerData {
    /// Address of the pointer.
    #[prost(uint64, tag = "1")]
    pub ea: u64,
    /// Module exporting the target.
    #[prost(string, tag = "2")]
    pub module: String,
    /// Procedure name of the target.
    #[prost(string, tag = "3")]
    pub proc: String,
}

/// An instruction referencing imported code.
#[derive(Clone, PartialEq, Message)]
pub struct RefData {
    /// Instruction address.
    #[prost(uint64, tag = "1")]
    pub ea: u64,
    /// Instruction length.
    #[prost(uint32, tag = "2")]
    pub len: u32,
    /// Disassembly text.
    #[prost(string, tag = "3")]
    pub dis: String,
    /// Referenced value.
    #[prost(uint64, tag = "4")]
    pub v: u64,
    /// Reference kind.
    #[prost(uint32, tag = "5")]
    pub ref_type: u32,
    /// Module exporting the target.
    #[prost(string, tag = "6")]
    pub module: String,
    /// Procedure name of the target.
    #[prost(string, tag = "7")]
    pub proc: String,
}

/// Result of [`RequestType::AnalyzeExternalRefs`].
#[derive(Clone, PartialEq, Message)]
pub struct AnalyzeExternalRefsResult {
    /// Context at analysis time.
    #[prost(message, optional, tag = "1")]
    pub context: Option<AnalysisContext>,
    /// Resolved API pointers.
    #[prost(message, repeated, tag = "2")]
    pub api_constants: Vec<PointerData>,
    /// Resolved instruction references.
    #[prost(message, repeated, tag = "3")]
    pub refs: Vec<RefData>,
}

/// Body of [`RequestType::CheckPeHeaders`].
#[derive(Clone, PartialEq, Message)]
pub struct CheckPeHeadersRequest {
    /// Image base.
    #[prost(uint64, tag = "1")]
    pub base: u64,
    /// Image size.
    #[prost(uint64, tag = "2")]
    pub size: u64,
}

/// One exported symbol.
#[derive(Clone, PartialEq, Message)]
pub struct ExportItem {
    /// Symbol address.
    #[prost(uint64, tag = "1")]
    pub ea: u64,
    /// Export ordinal.
    #[prost(uint32, tag = "2")]
    pub ord: u32,
    /// Symbol name.
    #[prost(string, tag = "3")]
    pub name: String,
}

/// One section header.
#[derive(Clone, PartialEq, Message)]
pub struct SectionItem {
    /// Section name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Virtual address.
    #[prost(uint64, tag = "2")]
    pub va: u64,
    /// Virtual size.
    #[prost(uint64, tag = "3")]
    pub v_size: u64,
    /// File offset of the raw data.
    #[prost(uint64, tag = "4")]
    pub raw: u64,
    /// Raw data size.
    #[prost(uint64, tag = "5")]
    pub raw_size: u64,
    /// Section characteristics flags.
    #[prost(uint32, tag = "6")]
    pub characteristics: u32,
}

/// Result of [`RequestType::CheckPeHeaders`].
#[derive(Clone, PartialEq, Message)]
pub struct CheckPeHeadersResult {
    /// Whether the headers parsed.
    #[prost(bool, tag = "1")]
    pub pe_valid: bool,
    /// Export table entries.
    #[prost(message, repeated, tag = "2")]
    pub exps: Vec<ExportItem>,
    /// Section table entries.
    #[prost(message, repeated, tag = "3")]
    pub sections: Vec<SectionItem>,
}

impl Response {
    /// Reports whether the response describes a job that is still running.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.job_status == Some(JobStatus::Pending as i32)
    }

    /// Serializes the response into its wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}

impl Execute {
    /// Builds a poll for an existing job.
    #[must_use]
    pub fn poll(job_id: u64) -> Self {
        Self {
            job_id: Some(job_id),
            ..Self::default()
        }
    }

    /// Reports whether the message only asks for an existing job's status.
    #[must_use]
    pub const fn is_poll(&self) -> bool {
        self.job_id.is_some() && self.script.is_empty() && self.rpc_request.is_empty()
    }
}
