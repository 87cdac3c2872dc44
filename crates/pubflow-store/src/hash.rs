//! Blake3 hashing for record keys and change detection

use pubflow_core::Record;

/// File-safe key for a record id.
///
/// Ids come from remote listings and citation data, so they are hashed
/// rather than trusted as path components.
pub fn key_for(id: &str) -> String {
    blake3::hash(id.as_bytes()).to_hex().to_string()
}

/// Hash of a record's canonical JSON form.
///
/// `serde_json::Map` is ordered by key, so equal records hash equal.
pub fn content_hash(record: &Record) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for (key, value) in record {
        hasher.update(key.as_bytes());
        hasher.update(&[0]);
        hasher.update(value.to_string().as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn key_is_deterministic_and_path_safe() {
        let k1 = key_for("pubmed24n1219.xml.gz");
        assert_eq!(k1, key_for("pubmed24n1219.xml.gz"));
        assert_ne!(k1, key_for("pubmed24n1220.xml.gz"));
        assert!(k1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key_for("../etc/passwd").len(), 64);
    }

    #[test]
    fn content_hash_ignores_insertion_order() {
        let a = record(json!({"id": "1", "title": "t"}));
        let mut b = Record::new();
        b.insert("title".into(), json!("t"));
        b.insert("id".into(), json!("1"));
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn content_hash_sees_value_changes() {
        let a = record(json!({"id": "1", "probability": 0.5}));
        let b = record(json!({"id": "1", "probability": 0.6}));
        assert_ne!(content_hash(&a), content_hash(&b));
    }
}
