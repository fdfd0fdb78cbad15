//! Daemon side of the control socket: one newline-terminated JSON-RPC
//! request per connection, one response line back.
//!
//! [`handle_request`] is the method table; the CLI's `--direct` mode calls
//! it in-process so both paths share one implementation.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use avctl_control::{Device, DeviceError};
use avctl_core::{ControlError, PulseKey, RemoteKey, VolumeDirection, wire};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

// ─── Errors ──────────────────────────────────────────────────────

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const PARSE_ERROR: i64 = -32700;
    /// A device or channel operation failed.
    pub const OPERATION_FAILED: i64 = -32000;

    fn method_not_found(method: &str) -> Self {
        Self {
            code: Self::METHOD_NOT_FOUND,
            message: format!("method not found: {method}"),
            data: None,
        }
    }

    fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self {
            code: Self::INVALID_PARAMS,
            message: format!("invalid params: {detail}"),
            data: None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut obj = json!({"code": self.code, "message": self.message});
        if let Some(data) = &self.data {
            obj["data"] = data.clone();
        }
        obj
    }
}

impl From<ControlError> for RpcError {
    fn from(e: ControlError) -> Self {
        Self {
            code: Self::OPERATION_FAILED,
            message: e.to_string(),
            data: serde_json::to_value(&e).ok(),
        }
    }
}

impl From<DeviceError> for RpcError {
    fn from(e: DeviceError) -> Self {
        Self::invalid_params(e)
    }
}

// ─── Method table ────────────────────────────────────────────────

#[derive(Deserialize)]
struct SwitchParams {
    on: bool,
}

#[derive(Deserialize)]
struct VolumeParams {
    direction: VolumeDirection,
}

#[derive(Deserialize)]
struct InputParams {
    index: usize,
}

#[derive(Deserialize)]
struct KeyParams {
    key: String,
}

#[derive(Deserialize)]
struct StatusParams {
    #[serde(default)]
    property: Option<String>,
}

#[derive(Deserialize)]
struct SendLineParams {
    channel: String,
    command: String,
}

#[derive(Deserialize)]
struct SendKeysParams {
    channel: String,
    keys: Vec<String>,
}

fn params<T: DeserializeOwned>(value: &Value) -> Result<T, RpcError> {
    let value = if value.is_null() { json!({}) } else { value.clone() };
    serde_json::from_value(value).map_err(RpcError::invalid_params)
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError {
        code: RpcError::OPERATION_FAILED,
        message: format!("cannot encode result: {e}"),
        data: None,
    })
}

/// Execute one method against `device`.
pub async fn handle_request(device: &Device, method: &str, params_value: &Value) -> Result<Value, RpcError> {
    tracing::debug!(method, "rpc request");

    match method {
        "set_power" => {
            let p: SwitchParams = params(params_value)?;
            to_value(&device.set_power(p.on).await?)
        }
        "set_mute" => {
            let p: SwitchParams = params(params_value)?;
            to_value(&device.set_mute(p.on).await?)
        }
        "change_volume" => {
            let p: VolumeParams = params(params_value)?;
            to_value(&device.change_volume(p.direction).await?)
        }
        "select_input" => {
            let p: InputParams = params(params_value)?;
            to_value(&device.select_input(p.index).await?)
        }
        "press_key" => {
            let p: KeyParams = params(params_value)?;
            let key = RemoteKey::parse(&p.key)
                .ok_or_else(|| RpcError::invalid_params(format!("unknown key {:?}", p.key)))?;
            to_value(&device.press_key(key).await?)
        }
        "get_status" => {
            let p: StatusParams = params(params_value)?;
            match p.property.as_deref() {
                None | Some("all") => to_value(&device.status().await),
                Some("power") => Ok(json!({"power": device.power().await})),
                Some("mute") => Ok(json!({"mute": device.mute().await})),
                Some("input") => {
                    let index = device.input().await;
                    let name = device.inputs().get(index).map(|s| s.to_string());
                    Ok(json!({"input": index, "input_name": name}))
                }
                Some(other) => Err(RpcError::invalid_params(format!("unknown property {other:?}"))),
            }
        }
        "send_line" => {
            let p: SendLineParams = params(params_value)?;
            let response = device.send_line(&p.channel, &p.command).await?;
            Ok(json!({"response": response}))
        }
        "send_keys" => {
            let p: SendKeysParams = params(params_value)?;
            let keys: Vec<PulseKey> = wire::parse_keys(&p.keys).map_err(RpcError::invalid_params)?;
            let sent = device.send_keys(&p.channel, &keys).await?;
            Ok(json!({"sent": sent}))
        }
        "list_channels" => Ok(json!({
            "device": device.name(),
            "channels": to_value(&device.channels())?,
            "inputs": device.inputs(),
        })),
        _ => Err(RpcError::method_not_found(method)),
    }
}

// ─── Socket ──────────────────────────────────────────────────────

/// Serve `device` on `socket_path` until the task is dropped.
pub async fn run_server(socket_path: &str, device: Arc<Device>) -> anyhow::Result<()> {
    let listener = bind_socket(Path::new(socket_path)).await?;
    tracing::info!(socket = socket_path, device = device.name(), "rpc server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let device = Arc::clone(&device);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, device).await {
                tracing::debug!(error = %e, "rpc connection dropped");
            }
        });
    }
}

/// Bind the daemon socket inside an owner-only directory. A socket file
/// nobody answers on is left over from a dead daemon and is replaced.
async fn bind_socket(path: &Path) -> anyhow::Result<UnixListener> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
        std::fs::set_permissions(dir, Permissions::from_mode(0o700))?;
    }

    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            anyhow::bail!("a daemon is already serving {}", path.display());
        }
        std::fs::remove_file(path)?;
        tracing::info!(socket = %path.display(), "replaced leftover socket");
    }

    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, Permissions::from_mode(0o600))?;
    Ok(listener)
}

async fn handle_connection(stream: UnixStream, device: Arc<Device>) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response = match serde_json::from_str::<Value>(line.trim()) {
        Ok(request) => {
            let method = request["method"].as_str().unwrap_or("");
            let id = request["id"].clone();
            match handle_request(&device, method, &request["params"]).await {
                Ok(result) => json!({"jsonrpc": "2.0", "result": result, "id": id}),
                Err(e) => {
                    tracing::debug!(method, error = %e, "rpc error");
                    json!({"jsonrpc": "2.0", "error": e.to_json(), "id": id})
                }
            }
        }
        Err(e) => {
            let err = RpcError {
                code: RpcError::PARSE_ERROR,
                message: format!("parse error: {e}"),
                data: None,
            };
            json!({"jsonrpc": "2.0", "error": err.to_json(), "id": null})
        }
    };

    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}
