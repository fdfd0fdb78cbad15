//! Client side of the control socket, used by every one-shot subcommand.

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Send one request to the daemon and return its `result`.
pub(crate) async fn rpc_call(socket_path: &str, method: &str, params: Value) -> anyhow::Result<Value> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| {
        anyhow::anyhow!("no daemon at {socket_path} ({e}); start one with `avctl daemon` or pass --direct")
    })?;
    let (reader, mut writer) = stream.into_split();

    let mut request = serde_json::to_vec(&json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    }))?;
    request.push(b'\n');
    writer.write_all(&request).await?;
    writer.shutdown().await?;

    let mut line = String::new();
    if BufReader::new(reader).read_line(&mut line).await? == 0 {
        anyhow::bail!("daemon hung up without answering {method}");
    }

    let mut response: Value = serde_json::from_str(line.trim())?;
    match response.get("error") {
        Some(error) => Err(anyhow::anyhow!(
            "{method}: {}",
            error["message"].as_str().unwrap_or("unknown error")
        )),
        None => Ok(response["result"].take()),
    }
}
