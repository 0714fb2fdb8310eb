//! Helpers for constructing point ids and payloads.

use crate::qdrant::types::IndexRecord;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload keys owned by the pipeline; extension metadata never overrides them.
pub const RESERVED_KEYS: [&str; 3] = ["text", "doc_id", "chunk_id"];

/// Deterministic point id derived from `"{doc_id}_{chunk_index}"`.
///
/// Re-running EmbedAndIndex for the same chunk produces the same id, so
/// upserts overwrite instead of duplicating.
pub fn point_id(doc_id: &str, chunk_index: usize) -> String {
    let name = format!("{doc_id}_{chunk_index}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Build the payload object stored alongside each indexed chunk.
///
/// Extension metadata is inserted first; reserved keys are written last so
/// they always win on collision.
pub(crate) fn build_payload(record: &IndexRecord) -> Value {
    let mut payload = Map::new();

    for (key, value) in &record.metadata {
        payload.insert(key.clone(), value.clone());
    }

    payload.insert("text".into(), Value::String(record.text.clone()));
    payload.insert("doc_id".into(), Value::String(record.doc_id.clone()));
    payload.insert("chunk_id".into(), Value::from(record.chunk_index as u64));
    payload.insert("char_length".into(), Value::from(record.text.len() as u64));

    Value::Object(payload)
}

/// Remove reserved keys from a payload map, leaving extension metadata only.
pub fn strip_reserved(mut payload: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_KEYS {
        payload.remove(key);
    }
    payload.remove("char_length");
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record(metadata: Map<String, Value>) -> IndexRecord {
        IndexRecord {
            doc_id: "doc-1".into(),
            chunk_index: 4,
            text: "chunk body".into(),
            vector: vec![0.1, 0.2],
            metadata,
        }
    }

    #[test]
    fn point_id_is_deterministic_and_namespaced() {
        assert_eq!(point_id("doc-1", 0), point_id("doc-1", 0));
        assert_ne!(point_id("doc-1", 0), point_id("doc-1", 1));
        assert_ne!(point_id("doc-1", 0), point_id("doc-2", 0));
    }

    #[test]
    fn reserved_keys_win_over_metadata() {
        let mut metadata = Map::new();
        metadata.insert("text".into(), json!("spoofed"));
        metadata.insert("doc_id".into(), json!("spoofed"));
        metadata.insert("file_type".into(), json!("pdf"));

        let payload = build_payload(&sample_record(metadata));
        assert_eq!(payload["text"], "chunk body");
        assert_eq!(payload["doc_id"], "doc-1");
        assert_eq!(payload["chunk_id"], 4);
        assert_eq!(payload["file_type"], "pdf");
        assert_eq!(payload["char_length"], 10);
    }

    #[test]
    fn strip_reserved_keeps_extension_metadata_only() {
        let mut metadata = Map::new();
        metadata.insert("file_type".into(), json!("pdf"));
        let payload = build_payload(&sample_record(metadata));
        let Value::Object(map) = payload else {
            panic!("payload should be an object");
        };

        let stripped = strip_reserved(map);
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped["file_type"], "pdf");
    }
}
