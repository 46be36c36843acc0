// Adapter between decoded real-time control events and the completion
// registry. Framing, decryption and reconnection of the real-time socket
// belong to the listener; it hands the decoded event body to this module.

use serde_json::Value;

use super::completion_registry::{CompletionPush, CompletionRegistry};

const FILE_DONE: &str = "file_done";

/// Server ids arrive as JSON numbers or strings depending on the endpoint.
pub fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract every `file_done` control from an event body of the form
/// `{"controls": [{"content": {"act_type": "file_done", "fileId": .., "data": {"url": ..}}}]}`.
pub fn parse_file_done(event: &Value) -> Vec<CompletionPush> {
    let Some(controls) = event.get("controls").and_then(Value::as_array) else {
        return Vec::new();
    };

    controls
        .iter()
        .filter_map(|control| control.get("content"))
        .filter(|content| content.get("act_type").and_then(Value::as_str) == Some(FILE_DONE))
        .filter_map(|content| {
            let file_id = content.get("fileId").and_then(id_to_string)?;
            let file_url = content
                .get("data")
                .and_then(|data| data.get("url"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(CompletionPush { file_id, file_url })
        })
        .collect()
}

/// Resolve every upload finished by `event`. Returns how many waiters
/// were woken.
pub fn dispatch_control_event(registry: &CompletionRegistry, event: &Value) -> usize {
    parse_file_done(event)
        .into_iter()
        .filter(|push| registry.resolve(&push.file_id, push.clone()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn event() -> Value {
        json!({
            "controls": [
                { "content": { "act_type": "typing", "fileId": 1 } },
                { "content": { "act_type": "file_done", "fileId": 12345,
                               "data": { "url": "https://x/y" } } },
                { "content": { "act_type": "file_done", "fileId": "777",
                               "data": { "url": "https://x/z" } } },
                { "content": { "act_type": "file_done" } }
            ]
        })
    }

    #[test]
    fn test_parse_only_file_done() {
        let pushes = parse_file_done(&event());
        assert_eq!(
            pushes,
            vec![
                CompletionPush {
                    file_id: "12345".to_string(),
                    file_url: "https://x/y".to_string()
                },
                CompletionPush {
                    file_id: "777".to_string(),
                    file_url: "https://x/z".to_string()
                },
            ]
        );
        assert!(parse_file_done(&json!({ "msgs": [] })).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_resolves_registered_ids() {
        let registry = Arc::new(CompletionRegistry::new());
        let pending = registry.register("12345").unwrap();

        assert_eq!(dispatch_control_event(&registry, &event()), 1);

        let push = pending.wait(None, &CancellationToken::new()).await.unwrap();
        assert_eq!(push.file_url, "https://x/y");
    }
}
