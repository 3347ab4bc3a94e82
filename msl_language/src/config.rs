use crate::util::fixed::MAX_FIXED_WIDTH;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Settings for one compilation, typically loaded from a `msl.toml` file next to the model.
/// Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CompileSettings {
    /// Width of real signals that do not specify one themselves.
    pub real_width: u64,
    pub default_clock: String,
    pub default_reset: String,
    pub default_ce: String,
    pub timescale: String,
    pub includes: Vec<String>,
}

impl Default for CompileSettings {
    fn default() -> Self {
        CompileSettings {
            real_width: 25,
            default_clock: "`CLK_MSDSL".to_owned(),
            default_reset: "`RST_MSDSL".to_owned(),
            default_ce: "1'b1".to_owned(),
            timescale: "1ns/1ps".to_owned(),
            includes: vec!["svreal.sv".to_owned(), "msdsl.sv".to_owned()],
        }
    }
}

#[derive(Debug)]
pub enum SettingsError {
    Parse(toml::de::Error),
    Io { path: PathBuf, error: std::io::Error },
    /// Fixed-point reals need at least a sign bit and one magnitude bit, and fit in 64 bits.
    RealWidth(u64),
}

impl CompileSettings {
    pub fn from_toml(src: &str) -> Result<CompileSettings, SettingsError> {
        let settings: CompileSettings = toml::from_str(src).map_err(SettingsError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(2..=MAX_FIXED_WIDTH).contains(&self.real_width) {
            return Err(SettingsError::RealWidth(self.real_width));
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<CompileSettings, SettingsError> {
        let src = std::fs::read_to_string(path).map_err(|error| SettingsError::Io {
            path: path.to_owned(),
            error,
        })?;
        Self::from_toml(&src)
    }
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Parse(e) => write!(f, "{e}"),
            SettingsError::Io { path, error } => write!(f, "failed to read {}: {error}", path.display()),
            SettingsError::RealWidth(width) => write!(
                f,
                "real_width must be between 2 and {MAX_FIXED_WIDTH}, got {width}"
            ),
        }
    }
}
