use crate::transport::{TargetMessage, Transport, TransportResponse, next_id};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::sync::Arc;

/// Parses the JSON message string wrapped by a `TargetMessage`.
pub(crate) fn serde_msg(msg: &TargetMessage) -> Result<Value> {
    let str_msg = msg.params["message"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid message format"))?;
    let value: Value = serde_json::from_str(str_msg)?;
    if let Some(err) = value.get("error") {
        return Err(anyhow!("CDP error: {err}"));
    }
    Ok(value)
}

/// Sends a message to a target session and waits for the matching reply.
pub(crate) async fn send_and_get_msg(
    transport: Arc<Transport>,
    msg_id: usize,
    session_id: &str,
    msg: String,
) -> Result<TargetMessage> {
    let send_fut = transport.send(json!({
        "id": next_id(),
        "method": "Target.sendMessageToTarget",
        "params": { "sessionId": session_id, "message": msg }
    }));
    let recv_fut = transport.get_target_msg(msg_id);

    let (_, target_msg) = futures_util::try_join!(send_fut, recv_fut)?;

    match target_msg {
        TransportResponse::Target(res) => Ok(res),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_msg_unwraps_inner_result() {
        let msg = TargetMessage {
            params: json!({ "message": r#"{"id":3,"result":{"frameId":"F1"}}"# }),
        };
        let value = serde_msg(&msg).unwrap();
        assert_eq!(value["result"]["frameId"], "F1");
    }

    #[test]
    fn serde_msg_surfaces_protocol_errors() {
        let msg = TargetMessage {
            params: json!({ "message": r#"{"id":3,"error":{"code":-32000,"message":"No target"}}"# }),
        };
        let err = serde_msg(&msg).unwrap_err();
        assert!(err.to_string().contains("No target"));
    }

    #[test]
    fn serde_msg_rejects_missing_message() {
        let msg = TargetMessage {
            params: json!({ "sessionId": "S" }),
        };
        assert!(serde_msg(&msg).is_err());
    }
}
