/// Identification of the host SDK, attached to outgoing events.
#[derive(Debug, Clone, Copy)]
pub struct SdkMetadata {
    /// The name of the SDK (e.g., language name).
    pub name: &'static str,
    /// Version of the SDK.
    pub version: &'static str,
}
