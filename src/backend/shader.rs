// Shader loading and compilation
//
// Vulkan consumes SPIR-V. Shaders ship as GLSL (built in, or files on disk
// for hot-reload) and are compiled at runtime with shaderc. Files ending in
// `.spv` are taken as already-compiled SPIR-V.

use anyhow::{Context, Result};
use ash::vk;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use super::VulkanDevice;

pub const BUILTIN_VERTEX: &str = include_str!("../../shaders/triangle.vert");
pub const BUILTIN_FRAGMENT: &str = include_str!("../../shaders/triangle.frag");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Guess the stage from a file name: `x.vert`, `x.frag`, `x.vert.glsl`, `x.frag.spv`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        name.split('.').skip(1).find_map(|part| match part {
            "vert" => Some(Self::Vertex),
            "frag" => Some(Self::Fragment),
            _ => None,
        })
    }

    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    fn shaderc_kind(self) -> shaderc::ShaderKind {
        match self {
            Self::Vertex => shaderc::ShaderKind::Vertex,
            Self::Fragment => shaderc::ShaderKind::Fragment,
        }
    }
}

/// Where a shader's code comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    Embedded(&'static str),
    File(PathBuf),
}

impl ShaderSource {
    /// File path if set, else the built-in source
    pub fn or_builtin(path: Option<&Path>, builtin: &'static str) -> Self {
        match path {
            Some(path) => Self::File(path.to_path_buf()),
            None => Self::Embedded(builtin),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Embedded(_) => None,
        }
    }

    fn is_spirv(&self) -> bool {
        self.path()
            .and_then(|p| p.extension())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("spv"))
    }
}

impl fmt::Display for ShaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded(_) => f.write_str("<built-in>"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// GLSL -> SPIR-V compiler
pub struct ShaderCompiler {
    compiler: shaderc::Compiler,
}

impl ShaderCompiler {
    pub fn new() -> Result<Self> {
        let compiler = shaderc::Compiler::new().context("Failed to initialize shaderc")?;
        Ok(Self { compiler })
    }

    /// Compile GLSL source to SPIR-V words
    pub fn compile_glsl(&self, source: &str, stage: ShaderStage, name: &str) -> Result<Vec<u32>> {
        let mut options = shaderc::CompileOptions::new().context("Failed to create shaderc options")?;
        options.set_target_env(shaderc::TargetEnv::Vulkan, shaderc::EnvVersion::Vulkan1_0 as u32);

        let artifact = self
            .compiler
            .compile_into_spirv(source, stage.shaderc_kind(), name, "main", Some(&options))
            .with_context(|| format!("Failed to compile {:?} shader {}", stage, name))?;

        if artifact.get_num_warnings() > 0 {
            log::warn!("{}: {}", name, artifact.get_warning_messages());
        }

        Ok(artifact.as_binary().to_vec())
    }

    /// Load (and compile, unless already SPIR-V) a shader
    pub fn load(&self, source: &ShaderSource, stage: ShaderStage) -> Result<Vec<u32>> {
        let name = source.to_string();
        let code: Cow<'_, str> = match source {
            ShaderSource::Embedded(code) => Cow::Borrowed(*code),
            ShaderSource::File(path) if source.is_spirv() => {
                let mut file = std::fs::File::open(path)
                    .with_context(|| format!("Failed to open shader {}", path.display()))?;
                return ash::util::read_spv(&mut file)
                    .with_context(|| format!("Invalid SPIR-V in {}", path.display()));
            }
            ShaderSource::File(path) => Cow::Owned(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read shader {}", path.display()))?,
            ),
        };

        if let Some(detected) = source.path().and_then(ShaderStage::from_path) {
            if detected != stage {
                log::warn!("{} looks like a {:?} shader but is used as {:?}", name, detected, stage);
            }
        }

        self.compile_glsl(&code, stage, &name)
    }
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe {
        device.device.create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn stage_from_file_name() {
        assert_eq!(ShaderStage::from_path(Path::new("a/tri.vert")), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_path(Path::new("tri.frag.glsl")), Some(ShaderStage::Fragment));
        assert_eq!(ShaderStage::from_path(Path::new("tri.vert.spv")), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_path(Path::new("vert")), None);
        assert_eq!(ShaderStage::from_path(Path::new("shader.glsl")), None);
    }

    #[test]
    fn source_picks_file_over_builtin() {
        let builtin = ShaderSource::or_builtin(None, BUILTIN_VERTEX);
        assert_eq!(builtin.path(), None);
        assert_eq!(builtin.to_string(), "<built-in>");

        let file = ShaderSource::or_builtin(Some(Path::new("x.vert.spv")), BUILTIN_VERTEX);
        assert_eq!(file.path(), Some(Path::new("x.vert.spv")));
        assert!(file.is_spirv());
    }

    #[test]
    fn builtin_shaders_compile() {
        let compiler = ShaderCompiler::new().unwrap();
        let vert = compiler
            .load(&ShaderSource::Embedded(BUILTIN_VERTEX), ShaderStage::Vertex)
            .unwrap();
        let frag = compiler
            .load(&ShaderSource::Embedded(BUILTIN_FRAGMENT), ShaderStage::Fragment)
            .unwrap();
        assert_eq!(vert[0], SPIRV_MAGIC);
        assert_eq!(frag[0], SPIRV_MAGIC);
    }

    #[test]
    fn syntax_error_reports_shader_name() {
        let compiler = ShaderCompiler::new().unwrap();
        let err = compiler
            .compile_glsl("#version 450\nvoid main() { oops }", ShaderStage::Fragment, "broken.frag")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("broken.frag"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let compiler = ShaderCompiler::new().unwrap();
        let source = ShaderSource::File(PathBuf::from("no/such/shader.frag"));
        assert!(compiler.load(&source, ShaderStage::Fragment).is_err());
    }
}
