use crate::back::lower_verilog::EmitError;
use crate::config::SettingsError;
use crate::front::expr::ConstructionError;
use crate::mid::extract::ExtractError;
use crate::model::FormatError;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[must_use]
#[derive(Debug)]
pub enum CompileError {
    Construction(ConstructionError),
    Extract(ExtractError),
    Format(FormatError),
    Emit(EmitError),
    Settings(SettingsError),
    Io { path: PathBuf, error: std::io::Error },
}

pub type CompileResult<T> = Result<T, CompileError>;

impl From<ConstructionError> for CompileError {
    fn from(value: ConstructionError) -> Self {
        CompileError::Construction(value)
    }
}

impl From<ExtractError> for CompileError {
    fn from(value: ExtractError) -> Self {
        CompileError::Extract(value)
    }
}

impl From<FormatError> for CompileError {
    fn from(value: FormatError) -> Self {
        CompileError::Format(value)
    }
}

impl From<EmitError> for CompileError {
    fn from(value: EmitError) -> Self {
        CompileError::Emit(value)
    }
}

impl From<SettingsError> for CompileError {
    fn from(value: SettingsError) -> Self {
        CompileError::Settings(value)
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Construction(e) => write!(f, "invalid expression: {e}"),
            CompileError::Extract(e) => write!(f, "invalid equation system: {e}"),
            CompileError::Format(e) => write!(f, "format mismatch: {e}"),
            CompileError::Emit(e) => write!(f, "code generation failed: {e}"),
            CompileError::Settings(e) => write!(f, "invalid settings: {e}"),
            CompileError::Io { path, error } => write!(f, "failed to write {}: {error}", path.display()),
        }
    }
}

impl std::error::Error for CompileError {}
