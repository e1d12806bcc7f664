/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `tasks`: task:{task_id} -> ValidationTask (JSON)
/// - `reports`: report:{report_id} -> ValidationReport (JSON)
/// - `metadata`: meta:{key} -> value (string)
///
/// Task ids are UUIDv7 and report ids embed the run's start time, so key
/// order within each partition is creation order.

/// Encode a task key: task:{task_id}
pub fn encode_task_key(task_id: &str) -> Vec<u8> {
    format!("task:{}", task_id).into_bytes()
}

/// Decode a task key: task:{task_id} -> task_id
pub fn decode_task_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("task:").map(String::from)
}

/// Encode a report key: report:{report_id}
pub fn encode_report_key(report_id: &str) -> Vec<u8> {
    format!("report:{}", report_id).into_bytes()
}

/// Decode a report key: report:{report_id} -> report_id
pub fn decode_report_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("report:").map(String::from)
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_key_encoding() {
        let key = encode_task_key("0190a1b2");
        assert_eq!(key, b"task:0190a1b2");
        assert_eq!(decode_task_key(&key).unwrap(), "0190a1b2");
    }

    #[test]
    fn test_report_key_encoding() {
        let key = encode_report_key("report-20240309T140507.000Z");
        assert_eq!(key, b"report:report-20240309T140507.000Z");
        assert_eq!(
            decode_report_key(&key).unwrap(),
            "report-20240309T140507.000Z"
        );
        assert_eq!(decode_report_key(b"task:x"), None);
    }

    #[test]
    fn test_meta_key_encoding() {
        let key = encode_meta_key("last_prune_tasks");
        assert_eq!(key, b"meta:last_prune_tasks");
    }
}
