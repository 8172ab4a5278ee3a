//! libvpx `vpxdec`.

use std::path::{Path, PathBuf};

use super::{path_arg, InvocationOptions, ModelAdapter};
use crate::domain::{Action, Invocation, Model, OutputFormat, Result};

#[derive(Debug, Clone)]
pub struct LibvpxAdapter {
    model: Model,
    executable: PathBuf,
}

impl LibvpxAdapter {
    pub fn new(model: Model, executable: PathBuf) -> Self {
        Self { model, executable }
    }
}

impl ModelAdapter for LibvpxAdapter {
    fn model(&self) -> &Model {
        &self.model
    }

    fn build_invocation(
        &self,
        codec: &str,
        _action: Action,
        source_file: &Path,
        output_file: &Path,
        options: &InvocationOptions,
    ) -> Result<Invocation> {
        let output_format = self.output_format(options.per_frame);

        let mut args = vec![format!("--codec={codec}")];
        if output_format == OutputFormat::Raw {
            args.push("--i420".to_string());
        }
        args.extend(self.model.extra_args.iter().cloned());
        args.push("-o".to_string());
        args.push(path_arg(output_file));
        args.push(path_arg(source_file));

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
