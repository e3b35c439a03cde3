use std::fmt;

use thiserror::Error;

/// Category of a fatal renderer error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InitWindow,
    InitVulkan,
    InitShader,
    InitPipeline,
    InitBuffer,
    UpdateRender,
    UpdateMemory,
}

impl ErrorKind {
    pub fn stage(self) -> &'static str {
        match self {
            ErrorKind::UpdateRender | ErrorKind::UpdateMemory => "UPDATE",
            _ => "INIT",
        }
    }

    pub fn subsystem(self) -> &'static str {
        match self {
            ErrorKind::InitWindow => "WINDOW",
            ErrorKind::InitVulkan => "VULKAN",
            ErrorKind::InitShader => "SHADER",
            ErrorKind::InitPipeline => "PIPELINE",
            ErrorKind::InitBuffer => "BUFFER",
            ErrorKind::UpdateRender => "RENDER",
            ErrorKind::UpdateMemory => "MEMORY",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({})", self.stage(), self.subsystem())
    }
}

/// A fatal error raised by the renderer. It is never recovered from below the
/// top-level handler.
#[derive(Debug, Error)]
#[error("{kind} {message}")]
pub struct RenderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RenderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn caused_by(kind: ErrorKind, message: &str, cause: impl fmt::Display) -> Self {
        Self::new(kind, format!("{}: {}", message, cause))
    }
}

/// Tags a failed driver or library call with an [`ErrorKind`] at the call site.
pub trait Fatal<T> {
    fn fatal(self, kind: ErrorKind, message: &str) -> Result<T, RenderError>;
}

impl<T, E: fmt::Display> Fatal<T> for Result<T, E> {
    fn fatal(self, kind: ErrorKind, message: &str) -> Result<T, RenderError> {
        self.map_err(|e| RenderError::caused_by(kind, message, e))
    }
}

impl<T> Fatal<T> for Option<T> {
    fn fatal(self, kind: ErrorKind, message: &str) -> Result<T, RenderError> {
        self.ok_or_else(|| RenderError::new(kind, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulkanalia::vk;

    #[test]
    fn test_display_carries_category() {
        let error = RenderError::new(ErrorKind::InitShader, "Failed to open bin/shaders/vert.spv");
        assert_eq!(
            error.to_string(),
            "[INIT] (SHADER) Failed to open bin/shaders/vert.spv"
        );

        let error = RenderError::new(ErrorKind::UpdateMemory, "oom");
        assert_eq!(error.to_string(), "[UPDATE] (MEMORY) oom");
    }

    #[test]
    fn test_fatal_wraps_driver_error() {
        let result: Result<(), vk::ErrorCode> = Err(vk::ErrorCode::DEVICE_LOST);
        let error = result
            .fatal(ErrorKind::UpdateRender, "Failed to submit draw command buffer")
            .unwrap_err();

        assert_eq!(error.kind, ErrorKind::UpdateRender);
        assert!(error.message.starts_with("Failed to submit draw command buffer: "));
    }

    #[test]
    fn test_fatal_on_none() {
        let error = None::<u32>
            .fatal(ErrorKind::UpdateMemory, "Failed to find suitable memory type")
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::UpdateMemory);
        assert_eq!(error.message, "Failed to find suitable memory type");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let error: anyhow::Error = RenderError::new(ErrorKind::InitVulkan, "no GPU").into();
        let render_error = error.downcast_ref::<RenderError>().unwrap();
        assert_eq!(render_error.kind, ErrorKind::InitVulkan);
    }
}
