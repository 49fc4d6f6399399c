use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer};
use serde_derive::Deserialize;

use crate::{
    isa::Reg,
    port::{ArgsExit, Null, Terminal},
    Port, Vm,
};

/// What to plug into a port register.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Terminal,
    Args,
    Null,
}

/// Machine description for the emulator, usually read from TOML.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Step limit. Zero or negative runs forever.
    #[serde(default)]
    pub max: Option<i64>,

    #[serde(default = "default_ports", deserialize_with = "deserialize_ports")]
    pub ports: IndexMap<Reg, Device>,
}

fn default_ports() -> IndexMap<Reg, Device> {
    IndexMap::from([(Reg::F, Device::Terminal), (Reg::G, Device::Args)])
}

fn deserialize_ports<'de, D>(deserializer: D) -> Result<IndexMap<Reg, Device>, D::Error>
where
    D: Deserializer<'de>,
{
    let named = IndexMap::<String, Device>::deserialize(deserializer)?;
    let mut ports = IndexMap::new();
    for (name, device) in named {
        let reg = match Reg::from_name(&name) {
            Some(reg @ (Reg::E | Reg::F | Reg::G)) => reg,
            _ => {
                return Err(de::Error::custom(format!(
                    "{name} is not a port register (expected e, f or g)"
                )))
            }
        };
        if ports.insert(reg, device).is_some() {
            return Err(de::Error::custom(format!("port {reg} is configured twice")));
        }
    }
    Ok(ports)
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max: None,
            ports: default_ports(),
        }
    }
}

impl MachineConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Plug the configured devices into `vm`. `args` feeds any `args` device.
    pub fn attach(&self, vm: &mut Vm, args: &[String]) {
        for (reg, device) in &self.ports {
            let port: Box<dyn Port> = match device {
                Device::Terminal => Box::new(Terminal::stdio()),
                Device::Args => Box::new(ArgsExit::new(args)),
                Device::Null => Box::new(Null),
            };
            tracing::debug!("port {reg}: {device:?}");
            match reg {
                Reg::E => vm.e = Some(port),
                Reg::F => vm.f = Some(port),
                _ => vm.g = Some(port),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_machine() {
        let config = MachineConfig::default();
        assert_eq!(config.max, None);
        assert_eq!(
            config.ports.into_iter().collect::<Vec<_>>(),
            vec![(Reg::F, Device::Terminal), (Reg::G, Device::Args)]
        );
        assert_eq!(MachineConfig::from_toml("").unwrap(), MachineConfig::default());
    }

    #[test]
    fn parses_ports_in_order() {
        let config = MachineConfig::from_toml(
            r#"
            max = 500

            [ports]
            G = "null"
            e = "terminal"
            "#,
        )
        .unwrap();
        assert_eq!(config.max, Some(500));
        assert_eq!(
            config.ports.into_iter().collect::<Vec<_>>(),
            vec![(Reg::G, Device::Null), (Reg::E, Device::Terminal)]
        );
    }

    #[test]
    fn rejects_bad_ports() {
        assert!(MachineConfig::from_toml("[ports]\na = \"null\"\n").is_err());
        assert!(MachineConfig::from_toml("[ports]\nq = \"null\"\n").is_err());
        assert!(MachineConfig::from_toml("[ports]\nf = \"printer\"\n").is_err());
        assert!(MachineConfig::from_toml("[ports]\nf = \"null\"\nF = \"args\"\n").is_err());
    }

    #[test]
    fn attach_fills_registers() {
        let config = MachineConfig::from_toml("[ports]\ne = \"null\"\n").unwrap();
        let mut vm = Vm::new();
        config.attach(&mut vm, &[]);
        assert!(vm.e.is_some());
        assert!(vm.f.is_none());
        assert!(vm.g.is_none());
    }
}
