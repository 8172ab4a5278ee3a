//! `ffmpeg` used as a plain decoder.

use std::path::{Path, PathBuf};

use super::{path_arg, InvocationOptions, ModelAdapter};
use crate::domain::{Action, Invocation, Model, OutputFormat, Result};

#[derive(Debug, Clone)]
pub struct FfmpegAdapter {
    model: Model,
    executable: PathBuf,
}

impl FfmpegAdapter {
    pub fn new(model: Model, executable: PathBuf) -> Self {
        Self { model, executable }
    }
}

impl ModelAdapter for FfmpegAdapter {
    fn model(&self) -> &Model {
        &self.model
    }

    fn build_invocation(
        &self,
        _codec: &str,
        _action: Action,
        source_file: &Path,
        output_file: &Path,
        options: &InvocationOptions,
    ) -> Result<Invocation> {
        let output_format = self.output_format(options.per_frame);
        let muxer = match output_format {
            OutputFormat::Raw => "rawvideo",
            OutputFormat::Y4m => "yuv4mpegpipe",
        };

        // Pixel format is left to the decoder so high bit depth survives.
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(path_arg(source_file));
        args.extend(self.model.extra_args.iter().cloned());
        args.extend(["-f".to_string(), muxer.to_string()]);
        args.push(path_arg(output_file));

        Ok(Invocation {
            model: self.model.name.clone(),
            executable: self.executable.clone(),
            args,
            source_file: source_file.to_path_buf(),
            output_file: output_file.to_path_buf(),
            output_format,
            reference_file: options.reference_file.clone(),
            config: None,
        })
    }
}
