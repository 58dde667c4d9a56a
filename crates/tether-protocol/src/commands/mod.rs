//! Typed commands and their codec.
//!
//! Each [`Command`] variant knows how to serialize itself into an
//! [`Execute`] envelope and how to read the matching typed result out of a
//! [`Response`]. The codec holds no state between calls.

mod memory;
mod names;
mod pe;
mod refs;

use prost::Message;

pub use memory::{MemoryRegion, MemoryRegionRead};
pub use names::{MAX_LABEL_BYTES, NameBatch, NameEntry, truncate_label};
pub use pe::{PeExport, PeHeaders, PeHeadersQuery, PeSection};
pub use refs::{ExternalRef, ExternalRefsQuery, ExternalRefsReport, PointerRecord};

use crate::errors::CodecError;
use crate::wire::{
    AnalyzeExternalRefsResult, CheckPeHeadersResult, Execute, GetMemoryMapResult,
    ReadMemoryRegionsResult, RequestType, Response, RpcRequest, rpc_request::Payload,
};

/// A request the disassembler side can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a script with an optional JSON extern object.
    ExecScript {
        /// Script source.
        script: String,
        /// JSON document bound into the script environment.
        extern_object: String,
    },
    /// Apply labels.
    MakeNames(NameBatch),
    /// Apply comments.
    MakeComments(NameBatch),
    /// List the debuggee memory map.
    GetMemoryMap,
    /// Read raw bytes of the given regions.
    ReadMemoryRegions(Vec<MemoryRegionRead>),
    /// Resolve references to imported code.
    AnalyzeExternalRefs(ExternalRefsQuery),
    /// Inspect the PE headers of a mapped image.
    CheckPeHeaders(PeHeadersQuery),
}

/// Fields common to every response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Job the response belongs to, when the server assigned one.
    pub job_id: Option<u64>,
    /// Captured standard output.
    pub std_out: String,
    /// Captured standard error.
    pub std_err: String,
    /// Protocol or execution error. Empty error text is treated as absent.
    pub error: Option<String>,
    /// `true` while the job has not finished.
    pub pending: bool,
}

/// Typed result of a structured request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Regions of the debuggee address space.
    MemoryMap(Vec<MemoryRegion>),
    /// Region contents, in request order.
    MemoryRegions(Vec<MemoryRegionRead>),
    /// Resolved external references.
    ExternalRefs(ExternalRefsReport),
    /// PE header report.
    PeHeaders(PeHeaders),
}

impl CommandResult {
    /// Serializes the result into the bytes carried by `Response::rpc_result`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::MemoryMap(regions) => memory::memory_map_to_wire(regions).encode_to_vec(),
            Self::MemoryRegions(regions) => memory::read_result_to_wire(regions).encode_to_vec(),
            Self::ExternalRefs(report) => report.to_wire().encode_to_vec(),
            Self::PeHeaders(headers) => headers.to_wire().encode_to_vec(),
        }
    }
}

/// A parsed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// Common fields.
    pub header: ResponseHeader,
    /// Typed result. `None` while pending, on error, and for commands that
    /// produce no structured result.
    pub result: Option<CommandResult>,
}

impl Command {
    /// Request discriminant, or `None` for plain scripts.
    #[must_use]
    pub const fn request_type(&self) -> Option<RequestType> {
        match self {
            Self::ExecScript { .. } => None,
            Self::MakeNames(_) => Some(RequestType::MakeNames),
            Self::MakeComments(_) => Some(RequestType::MakeComments),
            Self::GetMemoryMap => Some(RequestType::GetMemoryMap),
            Self::ReadMemoryRegions(_) => Some(RequestType::ReadMemoryRegions),
            Self::AnalyzeExternalRefs(_) => Some(RequestType::AnalyzeExternalRefs),
            Self::CheckPeHeaders(_) => Some(RequestType::CheckPeHeaders),
        }
    }

    /// Builds the structured request envelope, or `None` for plain scripts.
    #[must_use]
    pub fn to_rpc_request(&self) -> Option<RpcRequest> {
        let payload = match self {
            Self::ExecScript { .. } => return None,
            Self::MakeNames(batch) => Some(Payload::MakeNames(batch.to_wire())),
            Self::MakeComments(batch) => Some(Payload::MakeComments(batch.to_wire())),
            Self::GetMemoryMap => None,
            Self::ReadMemoryRegions(regions) => Some(Payload::ReadMemoryRegions(
                memory::read_request_to_wire(regions),
            )),
            Self::AnalyzeExternalRefs(query) => {
                Some(Payload::AnalyzeExternalRefs(query.to_wire()))
            }
            Self::CheckPeHeaders(query) => Some(Payload::CheckPeHeaders(query.to_wire())),
        };
        let request_type = self.request_type()?;
        Some(RpcRequest {
            request_type: request_type as i32,
            payload,
        })
    }

    /// Builds the outer envelope sent to the server.
    #[must_use]
    pub fn to_execute(&self, background: bool) -> Execute {
        match self {
            Self::ExecScript {
                script,
                extern_object,
            } => Execute {
                script: script.clone().into_bytes(),
                script_extern_obj: extern_object.clone().into_bytes(),
                background,
                ..Execute::default()
            },
            _ => Execute {
                rpc_request: self
                    .to_rpc_request()
                    .map(|request| request.encode_to_vec())
                    .unwrap_or_default(),
                background,
                ..Execute::default()
            },
        }
    }

    /// Serializes the command into the bytes of one logical message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the envelope cannot be written.
    pub fn serialize(&self, background: bool) -> Result<Vec<u8>, CodecError> {
        let envelope = self.to_execute(background);
        let mut buffer = Vec::with_capacity(envelope.encoded_len());
        envelope
            .encode(&mut buffer)
            .map_err(|source| CodecError::Encode {
                what: "Execute",
                source,
            })?;
        Ok(buffer)
    }

    /// Decodes a structured request envelope back into a command.
    ///
    /// # Errors
    ///
    /// Fails when the bytes are not an [`RpcRequest`], when the request type
    /// is unknown, or when the payload does not match the request type.
    pub fn decode_request(bytes: &[u8]) -> Result<Self, CodecError> {
        let request =
            RpcRequest::decode(bytes).map_err(|source| CodecError::decode("RpcRequest", source))?;
        let request_type = RequestType::try_from(request.request_type)
            .map_err(|_| CodecError::UnsupportedRequest(RequestType::Unknown))?;
        match (request_type, request.payload) {
            (RequestType::MakeNames, Some(Payload::MakeNames(body))) => {
                Ok(Self::MakeNames(NameBatch::from_wire(body)))
            }
            (RequestType::MakeComments, Some(Payload::MakeComments(body))) => {
                Ok(Self::MakeComments(NameBatch::from_wire(body)))
            }
            (RequestType::GetMemoryMap, None) => Ok(Self::GetMemoryMap),
            (RequestType::ReadMemoryRegions, Some(Payload::ReadMemoryRegions(body))) => Ok(
                Self::ReadMemoryRegions(memory::read_request_from_wire(body)),
            ),
            (RequestType::AnalyzeExternalRefs, Some(Payload::AnalyzeExternalRefs(body))) => Ok(
                Self::AnalyzeExternalRefs(ExternalRefsQuery::from_wire(&body)),
            ),
            (RequestType::CheckPeHeaders, Some(Payload::CheckPeHeaders(body))) => {
                Ok(Self::CheckPeHeaders(PeHeadersQuery::from_wire(&body)))
            }
            (RequestType::Unknown, _) => Err(CodecError::UnsupportedRequest(RequestType::Unknown)),
            (other, _) => Err(CodecError::PayloadMismatch(other)),
        }
    }

    /// Parses a response envelope into common fields and a typed result.
    ///
    /// The typed result is read only when the job has finished without a
    /// bare error. A failed parse returns an error and yields no data.
    ///
    /// # Errors
    ///
    /// Fails on an empty or undecodable envelope, an undecodable result, or
    /// a region read result that disagrees with the requested regions.
    pub fn parse_response(&self, bytes: &[u8]) -> Result<CommandResponse, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::EmptyEnvelope);
        }
        let response =
            Response::decode(bytes).map_err(|source| CodecError::decode("Response", source))?;
        let header = ResponseHeader {
            job_id: response.job_id,
            pending: response.is_pending(),
            std_out: response.std_out,
            std_err: response.std_err,
            error: response.error.filter(|text| !text.is_empty()),
        };
        if header.pending || (header.error.is_some() && response.rpc_result.is_empty()) {
            return Ok(CommandResponse {
                header,
                result: None,
            });
        }
        let result = self.parse_result(&response.rpc_result)?;
        Ok(CommandResponse { header, result })
    }

    fn parse_result(&self, bytes: &[u8]) -> Result<Option<CommandResult>, CodecError> {
        let result = match self {
            Self::ExecScript { .. } | Self::MakeNames(_) | Self::MakeComments(_) => return Ok(None),
            Self::GetMemoryMap => {
                let wire = GetMemoryMapResult::decode(bytes)
                    .map_err(|source| CodecError::decode("GetMemoryMapResult", source))?;
                CommandResult::MemoryMap(memory::memory_map_from_wire(wire))
            }
            Self::ReadMemoryRegions(requested) => {
                let wire = ReadMemoryRegionsResult::decode(bytes)
                    .map_err(|source| CodecError::decode("ReadMemoryRegionsResult", source))?;
                CommandResult::MemoryRegions(memory::merge_read_result(requested, wire)?)
            }
            Self::AnalyzeExternalRefs(_) => {
                let wire = AnalyzeExternalRefsResult::decode(bytes)
                    .map_err(|source| CodecError::decode("AnalyzeExternalRefsResult", source))?;
                CommandResult::ExternalRefs(ExternalRefsReport::from_wire(wire))
            }
            Self::CheckPeHeaders(_) => {
                let wire = CheckPeHeadersResult::decode(bytes)
                    .map_err(|source| CodecError::decode("CheckPeHeadersResult", source))?;
                CommandResult::PeHeaders(PeHeaders::from_wire(wire))
            }
        };
        Ok(Some(result))
    }
}
