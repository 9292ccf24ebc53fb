use serde::Deserialize;

/// Provider configuration. Every field has a default, so hosts can load a
/// partial table from TOML or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Name of the top-level CRDT map holding `root` and `types`.
    pub document_key: String,
    /// Transaction origin tag; defaults to one derived from the CRDT
    /// document's client id.
    pub origin: Option<String>,
    /// Delete CRDT records of nodes that a batch made unreachable.
    pub collect_unreachable: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            document_key: "document".to_owned(),
            origin: None,
            collect_unreachable: true,
        }
    }
}
