use bytes::Bytes;

/// Number of log records in the default conversion payload.
pub const DEFAULT_RECORD_COUNT: usize = 10;

/// The fixed XML document every conversion request carries.
///
/// Built once at startup and shared by every user behind an `Arc`; cloning
/// the body for a request only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePayload {
    xml: Bytes,
}

impl SamplePayload {
    /// A `<logs>` document with `records` entries numbered from zero, each
    /// carrying an id, an `INFO` level and a message.
    pub fn with_records(records: usize) -> Self {
        let entries: String = (0..records)
            .map(|i| format!("  <log><id>{i}</id><level>INFO</level><msg>Message {i}</msg></log>\n"))
            .collect();
        let xml = format!("<logs>\n{entries}</logs>");

        Self {
            xml: Bytes::from(xml),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.xml
    }

    /// The payload as a request body.
    pub fn body(&self) -> Bytes {
        self.xml.clone()
    }
}

impl Default for SamplePayload {
    fn default() -> Self {
        Self::with_records(DEFAULT_RECORD_COUNT)
    }
}
