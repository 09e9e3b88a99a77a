use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Default, Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub connection: Connection,
    pub files: Files,
    pub messages: Messages,
    pub simulation: Simulation,
}

/// Credentials and target for the chat connection. Only checked for blankness.
#[derive(Default, Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Connection {
    pub active: bool,
    pub channel: String,
    pub bot_name: String,
    pub oauth: String,
}

impl Connection {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("oauth", &self.oauth),
            ("bot_name", &self.bot_name),
            ("channel", &self.channel),
        ];

        fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Files {
    pub viewers: PathBuf,
    pub roles: PathBuf,
}

impl Default for Files {
    fn default() -> Self {
        Self {
            viewers: PathBuf::from("viewers.json"),
            roles: PathBuf::from("roles.toml"),
        }
    }
}

/// Chat texts. `{name}` is replaced with the viewer's name.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Messages {
    pub welcome: String,
    pub returned: String,
    pub left: String,
    pub test: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            welcome: "is listening to chat! type !help to see what you can do".into(),
            returned: "welcome back, {name}!".into(),
            left: "{name} has left the colony".into(),
            test: "crowd_link is connected".into(),
        }
    }
}

impl Messages {
    pub fn render(template: &str, name: &str) -> String {
        template.replace("{name}", name)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Simulation {
    pub tick_millis: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self { tick_millis: 50 }
    }
}

impl Config {
    pub const FILE: &'static str = "crowd_link.toml";
    pub const OAUTH_ENV_VAR: &'static str = "CROWD_LINK_OAUTH_TOKEN";

    /// Loads `crowd_link.toml`, writing an example next to it if it can't be read.
    pub fn load() -> anyhow::Result<Self> {
        match Self::load_from(Self::FILE) {
            Ok(config) => Ok(config.with_env_token()),
            Err(err) => {
                let example = Path::new(Self::FILE).with_extension("toml.example");
                Self::write_example(&example)?;
                log::error!(
                    "cannot load config. created a default at '{}'. copy it to '{}', edit it and rerun",
                    example.display(),
                    Self::FILE
                );
                Err(err)
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        toml::from_str(&data).with_context(|| format!("cannot parse '{}'", path.display()))
    }

    /// A blank `oauth` field is filled in from the environment.
    pub fn with_env_token(mut self) -> Self {
        if self.connection.oauth.trim().is_empty() {
            if let Ok(token) = std::env::var(Self::OAUTH_ENV_VAR) {
                self.connection.oauth = token;
            }
        }
        self
    }

    fn write_example(path: &Path) -> anyhow::Result<()> {
        let mut config = Self::default();
        config.connection = Connection {
            active: true,
            channel: "museun".into(),
            bot_name: "shaken_bot".into(),
            oauth: String::new(),
        };

        let data = toml::to_string_pretty(&config)?;
        std::fs::write(path, data).with_context(|| format!("cannot write '{}'", path.display()))
    }
}
