//! Memory map and region read payloads.

use crate::errors::CodecError;
use crate::wire::{
    GetMemoryMapResult, MemoryInfo, ReadMemoryRegionsRequest, ReadMemoryRegionsResult,
    RegionData, RegionRequest,
};

/// One region of the debuggee address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Region start.
    pub base: u64,
    /// Region length.
    pub size: u64,
    /// Access flags.
    pub access: u32,
    /// Owning module, possibly empty.
    pub name: String,
}

/// A region to read, and after a successful parse, its contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRegionRead {
    /// Region start.
    pub base: u64,
    /// Region length.
    pub size: u64,
    /// Raw bytes, empty until the response is parsed.
    pub raw: Vec<u8>,
    /// Page protection. A non-zero value supplied by the caller is kept
    /// when the response is merged. It never travels in the request, so a
    /// request decoded on the server side always carries zero.
    pub protect: u32,
}

impl MemoryRegionRead {
    /// Builds an unread region.
    #[must_use]
    pub fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            ..Self::default()
        }
    }
}

pub(crate) fn memory_map_to_wire(regions: &[MemoryRegion]) -> GetMemoryMapResult {
    GetMemoryMapResult {
        memories: regions
            .iter()
            .map(|region| MemoryInfo {
                base: region.base,
                size: region.size,
                access: region.access,
                name: region.name.clone(),
            })
            .collect(),
    }
}

pub(crate) fn memory_map_from_wire(result: GetMemoryMapResult) -> Vec<MemoryRegion> {
    result
        .memories
        .into_iter()
        .map(|info| MemoryRegion {
            base: info.base,
            size: info.size,
            access: info.access,
            name: info.name,
        })
        .collect()
}

/// Only base and size are sent; protection stays with the caller.
pub(crate) fn read_request_to_wire(regions: &[MemoryRegionRead]) -> ReadMemoryRegionsRequest {
    ReadMemoryRegionsRequest {
        regions: regions
            .iter()
            .map(|region| RegionRequest {
                addr: region.base,
                size: region.size,
            })
            .collect(),
    }
}

pub(crate) fn read_request_from_wire(request: ReadMemoryRegionsRequest) -> Vec<MemoryRegionRead> {
    request
        .regions
        .into_iter()
        .map(|region| MemoryRegionRead::new(region.addr, region.size))
        .collect()
}

pub(crate) fn read_result_to_wire(regions: &[MemoryRegionRead]) -> ReadMemoryRegionsResult {
    ReadMemoryRegionsResult {
        memories: regions
            .iter()
            .map(|region| RegionData {
                addr: region.base,
                size: region.size,
                mem: region.raw.clone(),
                protect: region.protect,
            })
            .collect(),
    }
}

/// Merges read results into the requested regions.
///
/// Record `i` of the result must echo the base and size of requested region
/// `i`. The first disagreement, or a record with no requested counterpart,
/// rejects the whole result and nothing is merged.
pub(crate) fn merge_read_result(
    requested: &[MemoryRegionRead],
    result: ReadMemoryRegionsResult,
) -> Result<Vec<MemoryRegionRead>, CodecError> {
    let mut merged = Vec::with_capacity(result.memories.len());
    for (index, data) in result.memories.into_iter().enumerate() {
        let Some(expected) = requested.get(index) else {
            return Err(CodecError::RegionMismatch {
                index,
                expected_base: 0,
                expected_size: 0,
                actual_base: data.addr,
                actual_size: data.size,
            });
        };
        if expected.base != data.addr || expected.size != data.size {
            return Err(CodecError::RegionMismatch {
                index,
                expected_base: expected.base,
                expected_size: expected.size,
                actual_base: data.addr,
                actual_size: data.size,
            });
        }
        merged.push(MemoryRegionRead {
            base: expected.base,
            size: expected.size,
            raw: data.mem,
            protect: if expected.protect == 0 {
                data.protect
            } else {
                expected.protect
            },
        });
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(addr: u64, size: u64, fill: u8) -> RegionData {
        RegionData {
            addr,
            size,
            mem: vec![fill; 4],
            protect: 0x20,
        }
    }

    #[test]
    fn merges_matching_records_in_order() {
        let requested = vec![
            MemoryRegionRead::new(0x1000, 0x10),
            MemoryRegionRead::new(0x2000, 0x20),
        ];
        let result = ReadMemoryRegionsResult {
            memories: vec![record(0x1000, 0x10, 0xaa), record(0x2000, 0x20, 0xbb)],
        };
        let merged = merge_read_result(&requested, result).expect("records should merge");
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].raw, vec![0xaa; 4]);
        assert_eq!(merged[1].raw, vec![0xbb; 4]);
        assert_eq!(merged[1].protect, 0x20);
    }

    #[test]
    fn caller_supplied_protection_wins() {
        let requested = vec![MemoryRegionRead {
            protect: 0x04,
            ..MemoryRegionRead::new(0x1000, 0x10)
        }];
        let result = ReadMemoryRegionsResult {
            memories: vec![record(0x1000, 0x10, 0)],
        };
        let merged = merge_read_result(&requested, result).expect("records should merge");
        assert_eq!(merged[0].protect, 0x04);
    }

    #[test]
    fn request_wire_form_leaves_protection_behind() {
        let requested = vec![MemoryRegionRead {
            protect: 0x40,
            ..MemoryRegionRead::new(0x1000, 0x10)
        }];
        let decoded = read_request_from_wire(read_request_to_wire(&requested));
        assert_eq!(decoded, vec![MemoryRegionRead::new(0x1000, 0x10)]);
        assert_eq!(requested[0].protect, 0x40);
    }

    #[test]
    fn surplus_record_is_a_mismatch() {
        let requested = vec![MemoryRegionRead::new(0x1000, 0x10)];
        let result = ReadMemoryRegionsResult {
            memories: vec![record(0x1000, 0x10, 0), record(0x2000, 0x10, 0)],
        };
        let error = merge_read_result(&requested, result).expect_err("surplus should fail");
        assert!(matches!(error, CodecError::RegionMismatch { index: 1, .. }));
    }

    #[test]
    fn size_disagreement_is_a_mismatch() {
        let requested = vec![MemoryRegionRead::new(0x1000, 0x10)];
        let result = ReadMemoryRegionsResult {
            memories: vec![record(0x1000, 0x11, 0)],
        };
        let error = merge_read_result(&requested, result).expect_err("size should fail");
        assert!(error.is_consistency_error());
    }
}
