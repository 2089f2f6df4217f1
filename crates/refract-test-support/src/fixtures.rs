//! Payload builders and canned endpoint bodies.

use serde_json::{Value, json};

/// Deterministic JPEG-flavoured payload of the requested length.
///
/// The first bytes carry the JFIF magic so the payload looks like a real
/// image to anything sniffing content; the rest is a repeating pattern.
#[must_use]
pub fn jpeg_payload(len: usize) -> Vec<u8> {
    const MAGIC: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];
    let mut payload = Vec::with_capacity(len);
    for index in 0..len {
        if index < MAGIC.len() {
            payload.push(MAGIC[index]);
        } else {
            payload.push(u8::try_from(index % 251).unwrap_or(0));
        }
    }
    payload
}

/// Successful control-endpoint response body.
#[must_use]
pub fn negotiation_success_body(upload_url: &str, key: &str) -> Value {
    json!({
        "uploadUrl": upload_url,
        "key": key,
        "expiresIn": 300,
    })
}

/// Failed control-endpoint response body.
#[must_use]
pub fn negotiation_failure_body(message: &str) -> Value {
    json!({ "message": message })
}

/// Successful record-store save response body.
#[must_use]
pub fn history_saved_body(timestamp: &str) -> Value {
    json!({
        "message": "Image history saved successfully",
        "timestamp": timestamp,
    })
}

/// Single record-store item in the list response shape.
#[must_use]
pub fn history_item_body(user_id: &str, original_key: &str, processed_key: &str) -> Value {
    json!({
        "userId": user_id,
        "timestamp": "2024-05-01T12:00:00",
        "originalKey": original_key,
        "processedKey": processed_key,
        "metadata": {
            "width": 800,
            "height": 600,
            "quality": 85,
            "format": "jpeg",
            "watermark": "",
        },
    })
}

/// Record-store list response body wrapping the provided items.
#[must_use]
pub fn history_page_body(user_id: &str, items: Vec<Value>) -> Value {
    json!({
        "count": items.len(),
        "items": items,
        "userId": user_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_payload_starts_with_magic() {
        let payload = jpeg_payload(16);
        assert_eq!(&payload[..4], &[0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(payload.len(), 16);
    }

    #[test]
    fn jpeg_payload_supports_tiny_lengths() {
        assert_eq!(jpeg_payload(2), vec![0xFF, 0xD8]);
        assert!(jpeg_payload(0).is_empty());
    }

    #[test]
    fn history_page_counts_items() {
        let page = history_page_body(
            "user-1",
            vec![history_item_body("user-1", "uploads/a.jpg", "processed/a.jpg")],
        );
        assert_eq!(page["count"], 1);
        assert_eq!(page["userId"], "user-1");
        assert_eq!(page["items"][0]["processedKey"], "processed/a.jpg");
    }
}
