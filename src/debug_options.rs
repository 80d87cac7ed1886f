//! `--debug` channel selection and logger setup.

use std::collections::BTreeSet;

use log::LevelFilter;

/// Debug channels. Each is a `log` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugChannel {
    /// Report actions without changing files.
    Dry,
    Network,
    /// Shell equivalents of filesystem operations.
    Cmd,
    Vars,
    Config,
}

impl DebugChannel {
    pub fn target(self) -> &'static str {
        match self {
            Self::Dry => "dry",
            Self::Network => "network",
            Self::Cmd => "cmd",
            Self::Vars => "vars",
            Self::Config => "config",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "dry" => Some(Self::Dry),
            "network" => Some(Self::Network),
            "cmd" => Some(Self::Cmd),
            "vars" => Some(Self::Vars),
            "config" => Some(Self::Config),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugOptions {
    pub channels: BTreeSet<DebugChannel>,
}

impl DebugOptions {
    pub fn is_dry_run(&self) -> bool {
        self.channels.contains(&DebugChannel::Dry)
    }
}

/// Parses the `--debug` value. `None` (flag without value) means a dry run;
/// `all` selects every channel except `dry`, so it is a live run.
pub fn parse_debug_option(value: Option<&str>) -> Result<DebugOptions, String> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(DebugOptions {
            channels: BTreeSet::from([DebugChannel::Dry]),
        });
    };

    let mut channels = BTreeSet::new();
    for name in value.split(',').map(|name| name.trim().to_ascii_lowercase()) {
        if name.is_empty() {
            continue;
        }
        if name == "all" {
            channels.extend([
                DebugChannel::Network,
                DebugChannel::Cmd,
                DebugChannel::Vars,
                DebugChannel::Config,
            ]);
            continue;
        }
        let channel = DebugChannel::parse(&name).ok_or_else(|| {
            format!("unknown debug option '{name}'; expected dry, network, cmd, vars, config or all")
        })?;
        channels.insert(channel);
    }
    Ok(DebugOptions { channels })
}

/// Initialises `colog` at `Warn` and raises the selected channels to `Debug`.
pub fn init_logging(options: &DebugOptions) {
    let mut clog = colog::default_builder();
    clog.filter(None, LevelFilter::Warn);
    for channel in &options.channels {
        clog.filter(Some(channel.target()), LevelFilter::Debug);
    }
    clog.init();
}
