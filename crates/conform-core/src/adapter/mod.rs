//! Model adapters: turn a (codec, action, file) request into a concrete
//! decoder invocation.
//!
//! Each decoder family is one variant of [`Adapter`]; all of them implement
//! [`ModelAdapter`]. Adding a family adds a variant here and never touches
//! the case runner.
//!
//! # Modules
//!
//! - [`libvpx`]: `vpxdec`
//! - [`ffmpeg`]: `ffmpeg` command line
//! - [`jm`]: JM reference decoder family (generated parameter file)
//! - [`template`]: fully data-driven argument template

pub mod ffmpeg;
pub mod jm;
pub mod libvpx;
pub mod template;

use std::path::{Path, PathBuf};

use crate::digest::FrameLayout;
use crate::domain::{
    Action, AdapterKind, ExecutionResult, Invocation, Model, OutputFormat, Result,
};

pub use ffmpeg::FfmpegAdapter;
pub use jm::JmAdapter;
pub use libvpx::LibvpxAdapter;
pub use template::TemplateAdapter;

/// Per-invocation settings that are not part of the model binding.
#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    /// Reference sequence for decoders that compute PSNR themselves.
    pub reference_file: Option<PathBuf>,

    /// Where generated parameter files are written.
    pub artifact_dir: PathBuf,

    /// Keep generated parameter files after the invocation.
    pub keep_artifacts: bool,

    /// Output will be digested frame by frame.
    pub per_frame: bool,
}

/// Capability set shared by every decoder family.
pub trait ModelAdapter {
    /// Binding this adapter was built from.
    fn model(&self) -> &Model;

    /// Container the decoder is asked to write. Per-frame digests prefer
    /// self-describing Y4M.
    fn output_format(&self, per_frame: bool) -> OutputFormat {
        if per_frame {
            OutputFormat::Y4m
        } else {
            OutputFormat::Raw
        }
    }

    /// Build the process invocation. Support has already been checked.
    fn build_invocation(
        &self,
        codec: &str,
        action: Action,
        source_file: &Path,
        output_file: &Path,
        options: &InvocationOptions,
    ) -> Result<Invocation>;

    /// Raw frame geometry learned from the decoder's own output.
    fn frame_layout(&self, _result: &ExecutionResult) -> Option<FrameLayout> {
        None
    }
}

/// Closed set of decoder families.
#[derive(Debug, Clone)]
pub enum Adapter {
    Libvpx(LibvpxAdapter),
    Ffmpeg(FfmpegAdapter),
    Jm(JmAdapter),
    Template(TemplateAdapter),
}

impl Adapter {
    /// Bind `model` to its adapter, locating the decoder executable.
    ///
    /// Fails with `MissingExecutable` if the decoder cannot be found.
    pub fn for_model(model: &Model) -> Result<Self> {
        let executable = model.resolve_executable()?;
        let model = model.clone();
        Ok(match model.adapter {
            AdapterKind::Libvpx => Adapter::Libvpx(LibvpxAdapter::new(model, executable)),
            AdapterKind::Ffmpeg => Adapter::Ffmpeg(FfmpegAdapter::new(model, executable)),
            AdapterKind::Jm => Adapter::Jm(JmAdapter::new(model, executable)),
            AdapterKind::Template => Adapter::Template(TemplateAdapter::new(model, executable)),
        })
    }

    fn inner(&self) -> &dyn ModelAdapter {
        match self {
            Adapter::Libvpx(a) => a,
            Adapter::Ffmpeg(a) => a,
            Adapter::Jm(a) => a,
            Adapter::Template(a) => a,
        }
    }
}

impl ModelAdapter for Adapter {
    fn model(&self) -> &Model {
        self.inner().model()
    }

    fn output_format(&self, per_frame: bool) -> OutputFormat {
        self.inner().output_format(per_frame)
    }

    /// Checks the model's declared support before delegating; an
    /// unsupported pair fails with `UnsupportedCombination`.
    fn build_invocation(
        &self,
        codec: &str,
        action: Action,
        source_file: &Path,
        output_file: &Path,
        options: &InvocationOptions,
    ) -> Result<Invocation> {
        self.model().check_support(codec, action)?;
        self.inner()
            .build_invocation(codec, action, source_file, output_file, options)
    }

    fn frame_layout(&self, result: &ExecutionResult) -> Option<FrameLayout> {
        self.inner().frame_layout(result)
    }
}

/// Substitute `{name}` placeholders in `template` in one pass.
///
/// Substituted values are never scanned again, and unknown placeholders
/// are left as written.
pub(crate) fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let known = tail[1..].find('}').and_then(|close| {
            let name = &tail[1..=close];
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| (close + 2, *value))
        });
        match known {
            Some((end, value)) => {
                out.push_str(value);
                rest = &tail[end..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}


#[cfg(test)]
mod tests {
    use super::test_support::model;
    use super::*;
    use crate::domain::ConformError;

    #[test]
    fn test_render_placeholders() {
        let out = render(
            "{input} -> {output} ({input})",
            &[("input", "a.ivf"), ("output", "a.yuv")],
        );
        assert_eq!(out, "a.ivf -> a.yuv (a.ivf)");
    }

    #[test]
    fn test_render_does_not_expand_values() {
        let out = render(
            "-i {input} -o {output}",
            &[("input", "/streams/{output}.ivf"), ("output", "a.yuv")],
        );
        assert_eq!(out, "-i /streams/{output}.ivf -o a.yuv");
    }

    #[test]
    fn test_render_leaves_unknown_braces() {
        let out = render("{input} {x} {{input}} {", &[("input", "a.ivf")]);
        assert_eq!(out, "a.ivf {x} {a.ivf} {");
    }

    #[test]
    fn test_for_model_selects_variant() {
        let adapter = Adapter::for_model(&model("libvpx", AdapterKind::Libvpx, &["vp8"])).unwrap();
        assert!(matches!(adapter, Adapter::Libvpx(_)));
        assert_eq!(adapter.model().name, "libvpx");
    }

    #[test]
    fn test_for_model_missing_executable() {
        let mut m = model("ffmpeg", AdapterKind::Ffmpeg, &["vp8"]);
        m.executable_path = PathBuf::from("/nonexistent/ffmpeg");
        assert!(matches!(
            Adapter::for_model(&m),
            Err(ConformError::MissingExecutable { .. })
        ));
    }

    #[test]
    fn test_build_invocation_rejects_unsupported_codec() {
        let adapter = Adapter::for_model(&model("libvpx", AdapterKind::Libvpx, &["vp8"])).unwrap();
        let err = adapter
            .build_invocation(
                "h264",
                Action::Decode,
                Path::new("a.264"),
                Path::new("a.yuv"),
                &InvocationOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ConformError::UnsupportedCombination { .. }));
    }

    #[test]
    fn test_default_output_format() {
        let adapter = Adapter::for_model(&model("ffmpeg", AdapterKind::Ffmpeg, &["vp8"])).unwrap();
        assert_eq!(adapter.output_format(false), OutputFormat::Raw);
        assert_eq!(adapter.output_format(true), OutputFormat::Y4m);
    }
}
