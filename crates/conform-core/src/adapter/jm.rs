//! JM reference decoder family.
//!
//! JM-derived decoders (the reference `ldecod` and vendor builds of it) read
//! their inputs from a parameter file. The model's `config_template` is
//! rendered per invocation with `{input}`, `{output}` and `{reference}`
//! and the file path is passed through `args` (default `-d {config}`).
//! These decoders write raw planar output only; the frame geometry is
//! parsed from the decoder's stdout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tempfile::Builder;

use super::{path_arg, render, InvocationOptions, ModelAdapter};
use crate::digest::{ChromaFormat, FrameLayout};
use crate::domain::{
    Action, ConfigArtifact, ExecutionResult, Invocation, Model, OutputFormat, Result,
};

const DEFAULT_ARGS: [&str; 2] = ["-d", "{config}"];

/// Stands in for `{reference}` when no reference sequence is supplied.
const NO_REFERENCE: &str = "none";

#[derive(Debug, Clone)]
pub struct JmAdapter {
    model: Model,
    executable: PathBuf,
}

impl JmAdapter {
    pub fn new(model: Model, executable: PathBuf) -> Self {
        Self { model, executable }
    }

    fn write_config(
        &self,
        source_file: &Path,
        output_file: &Path,
        options: &InvocationOptions,
    ) -> Result<ConfigArtifact> {
        let template = self.model.config_template.as_deref().unwrap_or_default();
        let reference = reference_arg(options);
        let input = path_arg(source_file);
        let output = path_arg(output_file);
        let content = render(
            template,
            &[
                ("input", input.as_str()),
                ("output", output.as_str()),
                ("reference", reference.as_str()),
            ],
        );

        std::fs::create_dir_all(&options.artifact_dir)?;
        let stem = source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());

        if options.keep_artifacts {
            let path = options.artifact_dir.join(format!("{stem}.cfg"));
            std::fs::write(&path, content)?;
            return Ok(ConfigArtifact::kept(path));
        }

        let mut file = Builder::new()
            .prefix(&format!("{stem}."))
            .suffix(".cfg")
            .tempfile_in(&options.artifact_dir)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(ConfigArtifact::scoped(file))
    }
}

impl ModelAdapter for JmAdapter {
    fn model(&self) -> &Model {
        &self.model
    }

    fn output_format(&self, _per_frame: bool) -> OutputFormat {
        OutputFormat::Raw
    }

    fn build_invocation(
        &self,
        codec: &str,
        _action: Action,
        source_file: &Path,
        output_file: &Path,
        options: &InvocationOptions,
    ) -> Result<Invocation> {
        let config = self.write_config(source_file, output_file, options)?;
        let config_arg = path_arg(config.path());
        let input = path_arg(source_file);
        let output = path_arg(output_file);
        let reference = reference_arg(options);
        let vars = [
            ("config", config_arg.as_str()),
            ("input", input.as_str()),
            ("output", output.as_str()),
            ("reference", reference.as_str()),
            ("codec", codec),
        ];

        let mut args: Vec<String> = if self.model.args.is_empty() {
            DEFAULT_ARGS.iter().map(|a| render(a, &vars)).collect()
        } else {
            self.model.args.iter().map(|a| render(a, &vars)).collect()
        };
        args.extend(self.model.extra_args.iter().cloned());

        Ok(Invocation {
            model: self.model.name.clone(),
            executable: self.executable.clone(),
            args,
            source_file: source_file.to_path_buf(),
            output_file: output_file.to_path_buf(),
            output_format: self.output_format(options.per_frame),
            reference_file: options.reference_file.clone(),
            config: Some(config),
        })
    }

    fn frame_layout(&self, result: &ExecutionResult) -> Option<FrameLayout> {
        parse_frame_layout(&result.stdout)
    }
}

fn reference_arg(options: &InvocationOptions) -> String {
    options
        .reference_file
        .as_deref()
        .map(path_arg)
        .unwrap_or_else(|| NO_REFERENCE.to_string())
}

fn image_format_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Image Format\s*:\s*(\d+)x(\d+)").ok())
        .as_ref()
}

fn color_format_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Color Format\s*:\s*4:(\d):(\d)(?:\s*\((\d+):)?").ok())
        .as_ref()
}

/// Parse the `Image Format : WxH` and `Color Format : 4:x:y (d:d:d)` lines
/// JM decoders print on start-up.
pub fn parse_frame_layout(stdout: &str) -> Option<FrameLayout> {
    let image = image_format_re()?.captures(stdout)?;
    let width: usize = image[1].parse().ok()?;
    let height: usize = image[2].parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }

    let mut layout = FrameLayout::yuv420(width, height);
    if let Some(color) = color_format_re().and_then(|re| re.captures(stdout)) {
        layout.chroma = match (&color[1], &color[2]) {
            ("4", "4") => ChromaFormat::Yuv444,
            ("2", "2") => ChromaFormat::Yuv422,
            // 4:0:0 streams are written with 4:2:0 chroma planes.
            _ => ChromaFormat::Yuv420,
        };
        let depth: usize = color
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(8);
        if depth > 8 {
            layout.bytes_per_sample = 2;
        }
    }
    Some(layout)
}
