use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use log::*;
use vulkanalia::bytecode::Bytecode;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::device::VulkanDevice;
use crate::config::Config;
use crate::error::{ErrorKind, Fatal, RenderError};

#[derive(Debug)]
pub struct VulkanShader;

impl VulkanShader {
    /// Runs the configured compiler over both shader sources. A failing
    /// compiler is not fatal: binaries from an earlier run may still exist.
    pub fn compile(config: &Config) {
        if let Err(error) = fs::create_dir_all(&config.shader_output_dir) {
            warn!(
                "Failed to create shader output directory `{}`: {}",
                config.shader_output_dir.display(),
                error
            );
            return;
        }

        let jobs = [
            (config.vertex_shader_source(), config.vertex_shader_binary()),
            (config.fragment_shader_source(), config.fragment_shader_binary()),
        ];
        for (source, binary) in jobs {
            VulkanShader::compile_one(&config.shader_compiler, &source, &binary);
        }
    }

    fn compile_one(compiler: &str, source: &Path, binary: &Path) {
        match Command::new(compiler).arg(source).arg("-o").arg(binary).output() {
            Ok(output) if output.status.success() => {
                debug!("Compiled `{}` to `{}`.", source.display(), binary.display());
            }
            Ok(output) => warn!(
                "`{}` failed on `{}` ({}): {}",
                compiler,
                source.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(error) => warn!("Failed to run shader compiler `{}`: {}", compiler, error),
        }
    }

    pub fn read(path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path).fatal(
            ErrorKind::InitShader,
            &format!("Failed to open `{}`", path.display()),
        )?)
    }

    pub unsafe fn create_module(device: &VulkanDevice, bytecode: &[u8]) -> Result<vk::ShaderModule> {
        let bytecode = Bytecode::new(bytecode)
            .map_err(|e| RenderError::caused_by(ErrorKind::InitShader, "Invalid SPIR-V bytecode", e))?;
        let info = vk::ShaderModuleCreateInfo::builder()
            .code_size(bytecode.code_size())
            .code(bytecode.code());

        Ok(device
            .vk_device
            .create_shader_module(&info, None)
            .fatal(ErrorKind::InitShader, "Failed to create shader module")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_binary_is_shader_error() {
        let error = VulkanShader::read(Path::new("missing/vert.spv")).unwrap_err();
        let error = error.downcast_ref::<RenderError>().unwrap();
        assert_eq!(error.kind, ErrorKind::InitShader);
        assert!(error.message.contains("missing/vert.spv"));
    }

    #[test]
    fn test_missing_compiler_is_not_fatal() {
        let output = std::env::temp_dir().join("ember-shader-test");
        let config = Config {
            shader_compiler: "ember-no-such-compiler".to_string(),
            shader_source_dir: PathBuf::from("shaders"),
            shader_output_dir: output.clone(),
            ..Config::default()
        };

        VulkanShader::compile(&config);
        assert!(output.is_dir());
    }
}
