use anyhow::{Context, Result};

/// A one-shot command given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Charge {
        device: String,
        power_w: u32,
        target_soc: Option<u8>,
    },
    Discharge {
        device: String,
        power_w: u32,
        emergency_soc: Option<u8>,
    },
    Stop {
        device: String,
    },
    ChangeMode {
        device: String,
        mode: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<String>,
    /// `None` runs the polling service until interrupted.
    pub action: Option<Action>,
}

pub const USAGE: &str = "usage: indevolt-app [--config PATH] \
[charge DEVICE POWER [SOC] | discharge DEVICE POWER [SOC] | stop DEVICE | change-mode DEVICE MODE]";

impl CliArgs {
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config_path = None;
        let mut positional = Vec::new();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--config" {
                config_path = Some(args.next().context("--config needs a path")?);
            } else if let Some(path) = arg.strip_prefix("--config=") {
                config_path = Some(path.to_string());
            } else {
                positional.push(arg);
            }
        }

        Ok(Self {
            config_path,
            action: parse_action(&positional)?,
        })
    }
}

fn parse_action(args: &[String]) -> Result<Option<Action>> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(None);
    };

    let action = match (name.as_str(), rest) {
        ("charge", [device, power, soc @ ..]) if soc.len() <= 1 => Action::Charge {
            device: device.clone(),
            power_w: parse_power(power)?,
            target_soc: soc.first().map(|soc| parse_soc(soc)).transpose()?,
        },
        ("discharge", [device, power, soc @ ..]) if soc.len() <= 1 => Action::Discharge {
            device: device.clone(),
            power_w: parse_power(power)?,
            emergency_soc: soc.first().map(|soc| parse_soc(soc)).transpose()?,
        },
        ("stop", [device]) => Action::Stop {
            device: device.clone(),
        },
        ("change-mode", [device, mode]) => Action::ChangeMode {
            device: device.clone(),
            mode: mode.clone(),
        },
        _ => anyhow::bail!("unrecognized arguments '{}'\n{USAGE}", args.join(" ")),
    };
    Ok(Some(action))
}

fn parse_power(value: &str) -> Result<u32> {
    value
        .parse()
        .with_context(|| format!("power must be a non-negative number of watts, got '{value}'"))
}

fn parse_soc(value: &str) -> Result<u8> {
    value
        .parse()
        .with_context(|| format!("state of charge must be a percentage, got '{value}'"))
}
