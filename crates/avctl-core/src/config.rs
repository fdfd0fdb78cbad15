//! Declarative device configuration loaded from TOML.
//!
//! [`Config`] mirrors the file one-to-one. [`Config::into_profile`] validates
//! every channel reference eagerly and resolves the file into a
//! [`DeviceProfile`]: escape-expanded commands, parsed pulse keys, typed
//! channel names. Nothing downstream re-parses configuration strings.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::action::{Action, ActionKind, CommandGroup, DispatchPolicy};
use crate::error::ConfigError;
use crate::reduce::ReducePolicy;
use crate::types::{ChannelKind, ChannelName, Property, RemoteKey};
use crate::wire::{DEFAULT_DELIMITER, PulseKey, expand_escapes};

// ─── Raw file model ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_device_name")]
    pub name: String,
    #[serde(default)]
    pub dispatch_policy: DispatchPolicy,
    #[serde(default)]
    pub serial: Vec<SerialDef>,
    #[serde(default)]
    pub lirc: Vec<LircDef>,
    #[serde(default)]
    pub actions: ActionsDef,
    #[serde(default)]
    pub status: StatusDef,
    #[serde(default)]
    pub inputs: Vec<InputDef>,
}

fn default_device_name() -> String {
    "avctl".into()
}

/// A line channel on a serial device node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialDef {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Response window in milliseconds.
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.into()
}

fn default_serial_timeout_ms() -> u64 {
    50
}

/// A pulse channel: a remote registered with a LIRC daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LircDef {
    pub name: String,
    #[serde(default = "default_lirc_host")]
    pub host: String,
    #[serde(default = "default_lirc_port")]
    pub port: u16,
    /// Remote identifier as registered with lircd.
    pub remote: String,
    /// Pause after each key so the physical action completes.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_lirc_host() -> String {
    "127.0.0.1".into()
}

fn default_lirc_port() -> u16 {
    8765
}

fn default_settle_ms() -> u64 {
    300
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

/// One command group as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDef {
    /// serial channel name -> raw commands
    #[serde(default)]
    pub serial: BTreeMap<String, Vec<String>>,
    /// lirc channel name -> key tokens
    #[serde(default)]
    pub lirc: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionsDef {
    pub power_on: Option<Vec<GroupDef>>,
    pub power_off: Option<Vec<GroupDef>>,
    pub mute_on: Option<Vec<GroupDef>>,
    pub mute_off: Option<Vec<GroupDef>>,
    pub volume_up: Option<Vec<GroupDef>>,
    pub volume_down: Option<Vec<GroupDef>>,
    /// remote key name (see [`RemoteKey::as_str`]) -> action
    #[serde(default)]
    pub remote_keys: BTreeMap<String, Vec<GroupDef>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusDef {
    pub power: Option<BooleanStatusDef>,
    pub mute: Option<BooleanStatusDef>,
    pub input: Option<InputStatusDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BooleanStatusDef {
    /// Overrides the property's default reduction policy.
    pub policy: Option<ReducePolicy>,
    #[serde(default)]
    pub channels: BTreeMap<String, BooleanQueryDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BooleanQueryDef {
    pub query: String,
    pub on: String,
    pub off: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputStatusDef {
    #[serde(default)]
    pub channels: BTreeMap<String, InputQueryDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputQueryDef {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputDef {
    pub name: String,
    #[serde(default)]
    pub action: Vec<GroupDef>,
    /// status channel name -> expected response substring
    #[serde(default)]
    pub expect: BTreeMap<String, String>,
}

// ─── Resolved profile ────────────────────────────────────────────

/// Connection parameters of a line channel, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialParams {
    pub path: PathBuf,
    pub baud_rate: u32,
    /// Escape-expanded delimiter.
    pub delimiter: String,
    pub response_window: Duration,
}

/// Connection parameters of a pulse channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LircParams {
    pub host: String,
    pub port: u16,
    pub remote: String,
    pub settle: Duration,
    pub connect_timeout: Duration,
}

/// One line channel queried for a boolean property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanQuery {
    pub channel: ChannelName,
    /// Escape-expanded query command.
    pub query: String,
    pub on: String,
    pub off: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanStatus {
    pub policy: ReducePolicy,
    pub queries: Vec<BooleanQuery>,
}

/// One line channel queried for the input property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputQuery {
    pub channel: ChannelName,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputProfile {
    pub name: String,
    pub action: Action,
    pub expect: BTreeMap<ChannelName, String>,
}

/// Validated, fully resolved configuration.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: String,
    pub dispatch_policy: DispatchPolicy,
    pub serial: Vec<(ChannelName, SerialParams)>,
    pub lirc: Vec<(ChannelName, LircParams)>,
    pub actions: HashMap<ActionKind, Action>,
    pub power_status: Option<BooleanStatus>,
    pub mute_status: Option<BooleanStatus>,
    pub input_status: Vec<InputQuery>,
    pub inputs: Vec<InputProfile>,
}

impl DeviceProfile {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Config::load(path)?.into_profile()
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Config::from_toml(s)?.into_profile()
    }

    /// Action configured for `kind`, if any. Input selection resolves to the
    /// input's own action.
    pub fn action(&self, kind: ActionKind) -> Option<&Action> {
        match kind {
            ActionKind::SelectInput(i) => self.inputs.get(i).map(|input| &input.action),
            other => self.actions.get(&other),
        }
    }

    pub fn boolean_status(&self, property: Property) -> Option<&BooleanStatus> {
        match property {
            Property::Power => self.power_status.as_ref(),
            Property::Mute => self.mute_status.as_ref(),
            Property::Input => None,
        }
    }

    pub fn channel_kind(&self, name: &str) -> Option<ChannelKind> {
        if self.serial.iter().any(|(n, _)| n.as_str() == name) {
            Some(ChannelKind::Line)
        } else if self.lirc.iter().any(|(n, _)| n.as_str() == name) {
            Some(ChannelKind::Pulse)
        } else {
            None
        }
    }
}

// ─── Loading & validation ────────────────────────────────────────

impl Config {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Validate every reference and resolve into a [`DeviceProfile`].
    pub fn into_profile(self) -> Result<DeviceProfile, ConfigError> {
        let kinds = self.channel_kinds()?;
        let resolver = Refs { kinds: &kinds };

        let serial = self
            .serial
            .iter()
            .map(|def| Ok((ChannelName::new(&def.name), serial_params(def)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let lirc = self
            .lirc
            .iter()
            .map(|def| Ok((ChannelName::new(&def.name), lirc_params(def)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut actions = HashMap::new();
        let named = [
            (ActionKind::PowerOn, &self.actions.power_on),
            (ActionKind::PowerOff, &self.actions.power_off),
            (ActionKind::MuteOn, &self.actions.mute_on),
            (ActionKind::MuteOff, &self.actions.mute_off),
            (ActionKind::VolumeUp, &self.actions.volume_up),
            (ActionKind::VolumeDown, &self.actions.volume_down),
        ];
        for (kind, groups) in named {
            if let Some(groups) = groups {
                let action = resolver.action(&format!("actions.{kind}"), groups)?;
                actions.insert(kind, action);
            }
        }
        for (name, groups) in &self.actions.remote_keys {
            let context = format!("actions.remote_keys.{name}");
            let key = RemoteKey::parse(name).ok_or_else(|| ConfigError::Invalid {
                context: context.clone(),
                detail: format!("unknown remote key {name:?}"),
            })?;
            let action = resolver.action(&context, groups)?;
            actions.insert(ActionKind::RemoteKey(key), action);
        }

        let power_status = self
            .status
            .power
            .as_ref()
            .map(|def| resolver.boolean_status("status.power", Property::Power, def))
            .transpose()?;
        let mute_status = self
            .status
            .mute
            .as_ref()
            .map(|def| resolver.boolean_status("status.mute", Property::Mute, def))
            .transpose()?;

        let mut input_status = Vec::new();
        if let Some(def) = &self.status.input {
            for (channel, query) in &def.channels {
                let context = format!("status.input.channels.{channel}");
                resolver.expect_kind(&context, channel, ChannelKind::Line)?;
                non_empty(&context, "query", &query.query)?;
                input_status.push(InputQuery {
                    channel: ChannelName::new(channel),
                    query: expand_escapes(&query.query),
                });
            }
        }

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (i, def) in self.inputs.iter().enumerate() {
            let context = format!("inputs[{i}]");
            non_empty(&context, "name", &def.name)?;
            let action = resolver.action(&format!("{context}.action"), &def.action)?;
            let mut expect = BTreeMap::new();
            for (channel, needle) in &def.expect {
                let ctx = format!("{context}.expect.{channel}");
                resolver.expect_kind(&ctx, channel, ChannelKind::Line)?;
                if !input_status.iter().any(|q| q.channel.as_str() == channel) {
                    return Err(ConfigError::Invalid {
                        context: ctx,
                        detail: format!("channel {channel:?} is not queried by status.input"),
                    });
                }
                non_empty(&ctx, "expected response", needle)?;
                expect.insert(ChannelName::new(channel), needle.clone());
            }
            inputs.push(InputProfile {
                name: def.name.clone(),
                action,
                expect,
            });
        }

        Ok(DeviceProfile {
            name: self.name,
            dispatch_policy: self.dispatch_policy,
            serial,
            lirc,
            actions,
            power_status,
            mute_status,
            input_status,
            inputs,
        })
    }

    /// Name -> kind map; rejects empty and duplicate names.
    fn channel_kinds(&self) -> Result<HashMap<String, ChannelKind>, ConfigError> {
        let mut kinds = HashMap::new();
        let declared = self
            .serial
            .iter()
            .map(|d| (&d.name, ChannelKind::Line))
            .chain(self.lirc.iter().map(|d| (&d.name, ChannelKind::Pulse)));

        for (name, kind) in declared {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    context: format!("{kind} channel"),
                    detail: "channel name must not be empty".into(),
                });
            }
            if kinds.insert(name.clone(), kind).is_some() {
                return Err(ConfigError::DuplicateChannel(name.clone()));
            }
        }
        Ok(kinds)
    }
}

fn serial_params(def: &SerialDef) -> Result<SerialParams, ConfigError> {
    let context = format!("serial.{}", def.name);
    let delimiter = expand_escapes(&def.delimiter);
    non_empty(&context, "delimiter", &delimiter)?;
    non_empty(&context, "path", &def.path.to_string_lossy())?;
    if def.timeout_ms == 0 {
        return Err(ConfigError::Invalid {
            context,
            detail: "timeout_ms must be greater than zero".into(),
        });
    }
    Ok(SerialParams {
        path: def.path.clone(),
        baud_rate: def.baud_rate,
        delimiter,
        response_window: Duration::from_millis(def.timeout_ms),
    })
}

fn lirc_params(def: &LircDef) -> Result<LircParams, ConfigError> {
    let context = format!("lirc.{}", def.name);
    non_empty(&context, "host", &def.host)?;
    non_empty(&context, "remote", &def.remote)?;
    if def.remote.contains(char::is_whitespace) {
        return Err(ConfigError::Invalid {
            context,
            detail: format!("remote {:?} must not contain whitespace", def.remote),
        });
    }
    Ok(LircParams {
        host: def.host.clone(),
        port: def.port,
        remote: def.remote.clone(),
        settle: Duration::from_millis(def.settle_ms),
        connect_timeout: Duration::from_millis(def.connect_timeout_ms),
    })
}

fn non_empty(context: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Invalid {
            context: context.to_owned(),
            detail: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

/// Channel reference checks against the declared name -> kind map.
struct Refs<'a> {
    kinds: &'a HashMap<String, ChannelKind>,
}

impl Refs<'_> {
    fn expect_kind(&self, context: &str, channel: &str, expected: ChannelKind) -> Result<(), ConfigError> {
        match self.kinds.get(channel) {
            None => Err(ConfigError::UnknownChannel {
                context: context.to_owned(),
                channel: channel.to_owned(),
            }),
            Some(&actual) if actual != expected => Err(ConfigError::WrongKind {
                context: context.to_owned(),
                channel: channel.to_owned(),
                expected,
                actual,
            }),
            Some(_) => Ok(()),
        }
    }

    fn action(&self, context: &str, groups: &[GroupDef]) -> Result<Action, ConfigError> {
        let mut resolved = Vec::with_capacity(groups.len());
        for (i, group) in groups.iter().enumerate() {
            let mut out = CommandGroup::default();
            for (channel, commands) in &group.serial {
                let ctx = format!("{context}[{i}].serial.{channel}");
                self.expect_kind(&ctx, channel, ChannelKind::Line)?;
                let commands = commands.iter().map(|c| expand_escapes(c)).collect();
                out.line.push((ChannelName::new(channel), commands));
            }
            for (channel, tokens) in &group.lirc {
                let ctx = format!("{context}[{i}].lirc.{channel}");
                self.expect_kind(&ctx, channel, ChannelKind::Pulse)?;
                let keys = tokens
                    .iter()
                    .map(|t| PulseKey::parse(t))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| ConfigError::Invalid {
                        context: ctx.clone(),
                        detail: e.to_string(),
                    })?;
                out.pulse.push((ChannelName::new(channel), keys));
            }
            resolved.push(out);
        }
        Ok(Action::new(resolved))
    }

    fn boolean_status(
        &self,
        context: &str,
        property: Property,
        def: &BooleanStatusDef,
    ) -> Result<BooleanStatus, ConfigError> {
        let mut queries = Vec::with_capacity(def.channels.len());
        for (channel, q) in &def.channels {
            let ctx = format!("{context}.channels.{channel}");
            self.expect_kind(&ctx, channel, ChannelKind::Line)?;
            non_empty(&ctx, "query", &q.query)?;
            non_empty(&ctx, "on", &q.on)?;
            non_empty(&ctx, "off", &q.off)?;
            queries.push(BooleanQuery {
                channel: ChannelName::new(channel),
                query: expand_escapes(&q.query),
                on: q.on.clone(),
                off: q.off.clone(),
            });
        }
        Ok(BooleanStatus {
            policy: def.policy.unwrap_or_else(|| ReducePolicy::default_for(property)),
            queries,
        })
    }
}
