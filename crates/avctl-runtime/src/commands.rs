//! One-shot CLI commands: build the request, send it to the daemon (or run
//! it in-process with `--direct`), print the result.

use std::path::Path;

use avctl_control::Device;
use avctl_core::DeviceProfile;
use serde_json::{Value, json};

use crate::cli::{Command, Direction};
use crate::{client, server};

/// Where requests go.
pub enum Backend {
    Daemon(String),
    Direct(Device),
}

impl Backend {
    pub fn direct(config_path: &Path) -> anyhow::Result<Self> {
        let profile = DeviceProfile::load(config_path)
            .map_err(|e| anyhow::anyhow!("{}: {e}", config_path.display()))?;
        Ok(Backend::Direct(Device::open(profile)))
    }

    pub async fn call(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        match self {
            Backend::Daemon(socket_path) => client::rpc_call(socket_path, method, params).await,
            Backend::Direct(device) => server::handle_request(device, method, &params)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.message)),
        }
    }

    pub fn shutdown(&self) {
        if let Backend::Direct(device) = self {
            device.shutdown();
        }
    }
}

/// Map a client subcommand to its JSON-RPC method and params.
///
/// Returns `None` for commands that are not requests (`daemon`, `check`).
pub fn request_for(command: &Command) -> Option<(&'static str, Value)> {
    let request = match command {
        Command::Power { state } => ("set_power", json!({"on": state.is_on()})),
        Command::Mute { state } => ("set_mute", json!({"on": state.is_on()})),
        Command::Volume { direction } => {
            let direction = match direction {
                Direction::Up => "up",
                Direction::Down => "down",
            };
            ("change_volume", json!({"direction": direction}))
        }
        Command::Input { index } => ("select_input", json!({"index": index})),
        Command::Key { key } => ("press_key", json!({"key": key.as_str()})),
        Command::Status { property } => ("get_status", json!({"property": property.property()})),
        Command::Send { channel, command } => {
            ("send_line", json!({"channel": channel, "command": command}))
        }
        Command::Keys { channel, keys } => ("send_keys", json!({"channel": channel, "keys": keys})),
        Command::Channels => ("list_channels", Value::Null),
        Command::Daemon | Command::Check => return None,
    };
    Some(request)
}

/// Run a client subcommand and print its result.
pub async fn run(backend: &Backend, command: &Command) -> anyhow::Result<()> {
    let Some((method, params)) = request_for(command) else {
        anyhow::bail!("not a client command");
    };
    let result = backend.call(method, params).await?;

    match method {
        "set_power" | "set_mute" | "change_volume" | "select_input" | "press_key" => {
            print!("{}", format_report(&result));
            if result["succeeded"] == false {
                anyhow::bail!("{method} failed");
            }
        }
        "get_status" => print!("{}", format_status(&result)),
        "send_line" => println!("{}", result["response"].as_str().unwrap_or_default()),
        "send_keys" => println!("sent {} entries", result["sent"]),
        "list_channels" => print!("{}", format_channels(&result)),
        _ => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

/// `avctl check`: validate the profile and summarize it.
pub fn check(config_path: &Path) -> anyhow::Result<()> {
    let profile = DeviceProfile::load(config_path)
        .map_err(|e| anyhow::anyhow!("{}: {e}", config_path.display()))?;
    print!("{}", format_profile(&profile));
    Ok(())
}

// ─── Formatting ──────────────────────────────────────────────────

/// One line per leaf outcome, then nothing else; an empty report prints
/// "nothing to do".
pub(crate) fn format_report(report: &Value) -> String {
    let outcomes = report["outcomes"]["outcomes"].as_array().cloned().unwrap_or_default();
    if outcomes.is_empty() {
        return "nothing to do\n".to_string();
    }

    let mut out = String::new();
    for o in &outcomes {
        let channel = o["channel"].as_str().unwrap_or("?");
        let line = if let Some(ok) = o["result"].get("Ok") {
            match ok["type"].as_str() {
                Some("response") => format!("{channel:<10} ok     {}", ok["value"].as_str().unwrap_or("")),
                Some("sent") => format!("{channel:<10} ok     {} keys", ok["value"]),
                _ => format!("{channel:<10} ok"),
            }
        } else {
            let err = &o["result"]["Err"];
            format!("{channel:<10} {:<6} {}", err["error"].as_str().unwrap_or("error"), describe_error(err))
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn describe_error(err: &Value) -> String {
    match err["error"].as_str() {
        Some("timeout") => format!("no response within {}ms", err["window_ms"]),
        Some("protocol_mismatch") => format!("unexpected response {}", err["response"]),
        Some("connection") => err["detail"].as_str().unwrap_or("").to_string(),
        Some("configuration") => format!("no such {} channel", err["kind"].as_str().unwrap_or("")),
        _ => err.to_string(),
    }
}

pub(crate) fn format_status(status: &Value) -> String {
    let on_off = |v: &Value| if v.as_bool() == Some(true) { "on" } else { "off" };
    let mut out = String::new();
    if let Some(power) = status.get("power") {
        out.push_str(&format!("power: {}\n", on_off(power)));
    }
    if let Some(mute) = status.get("mute") {
        out.push_str(&format!("mute:  {}\n", on_off(mute)));
    }
    if let Some(input) = status.get("input") {
        match status["input_name"].as_str() {
            Some(name) => out.push_str(&format!("input: {input} ({name})\n")),
            None => out.push_str(&format!("input: {input}\n")),
        }
    }
    out
}

pub(crate) fn format_channels(listing: &Value) -> String {
    let mut out = format!("device: {}\n", listing["device"].as_str().unwrap_or("?"));
    for ch in listing["channels"].as_array().into_iter().flatten() {
        out.push_str(&format!(
            "  {:<10} {:<6} queued={}\n",
            ch["name"].as_str().unwrap_or("?"),
            ch["kind"].as_str().unwrap_or("?"),
            ch["queue_depth"],
        ));
    }
    for (i, name) in listing["inputs"].as_array().into_iter().flatten().enumerate() {
        out.push_str(&format!("  input {i}: {}\n", name.as_str().unwrap_or("?")));
    }
    out
}

pub(crate) fn format_profile(profile: &DeviceProfile) -> String {
    let mut out = format!("device: {} (dispatch: {:?})\n", profile.name, profile.dispatch_policy);
    for (name, p) in &profile.serial {
        out.push_str(&format!(
            "  serial {name}: {} @ {} baud, window {}ms\n",
            p.path.display(),
            p.baud_rate,
            p.response_window.as_millis()
        ));
    }
    for (name, p) in &profile.lirc {
        out.push_str(&format!(
            "  lirc   {name}: remote {} via {}:{}, settle {}ms\n",
            p.remote,
            p.host,
            p.port,
            p.settle.as_millis()
        ));
    }

    let mut actions: Vec<String> = profile.actions.keys().map(|k| k.to_string()).collect();
    actions.sort();
    out.push_str(&format!("  actions: {}\n", if actions.is_empty() { "none".to_string() } else { actions.join(", ") }));

    for (i, input) in profile.inputs.iter().enumerate() {
        out.push_str(&format!("  input {i}: {}\n", input.name));
    }
    out
}
