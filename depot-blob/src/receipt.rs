use serde::{Deserialize, Serialize};

use crate::{ByteStream, FileRecord};

/// Result of opening a file for reading
pub struct OpenedBlob {
    pub record: FileRecord,
    /// Whether the payload supports byte range reads
    pub accepts_ranges: bool,
    pub delivery: Delivery,
}

/// How the opened content is delivered
pub enum Delivery {
    /// The whole payload
    Full { stream: ByteStream, length: u64 },
    /// A sub-range of the payload
    Partial {
        stream: ByteStream,
        range: ResolvedRange,
    },
    /// The requested range cannot be served
    NotSatisfiable { total_size: u64 },
}

/// Range information for partial content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl ResolvedRange {
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_full_content(&self) -> bool {
        self.start == 0 && self.end + 1 == self.total_size
    }

    /// Value for a `Content-Range` header, e.g. `bytes 6-10/11`
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}

impl OpenedBlob {
    /// Check if this is a partial content response
    pub fn is_partial(&self) -> bool {
        matches!(self.delivery, Delivery::Partial { .. })
    }

    /// Get content length of the delivered body
    pub fn content_length(&self) -> u64 {
        match &self.delivery {
            Delivery::Full { length, .. } => *length,
            Delivery::Partial { range, .. } => range.content_length(),
            Delivery::NotSatisfiable { .. } => 0,
        }
    }
}

impl std::fmt::Debug for OpenedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let delivery = match &self.delivery {
            Delivery::Full { .. } => "full",
            Delivery::Partial { .. } => "partial",
            Delivery::NotSatisfiable { .. } => "not_satisfiable",
        };
        f.debug_struct("OpenedBlob")
            .field("record", &self.record)
            .field("accepts_ranges", &self.accepts_ranges)
            .field("delivery", &delivery)
            .field("content_length", &self.content_length())
            .finish()
    }
}
