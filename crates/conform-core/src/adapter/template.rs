//! Data-driven decoder binding.
//!
//! The model's `args` are rendered with `{input}`, `{output}`,
//! `{reference}` and `{codec}`; nothing else is assumed about the decoder.

use std::path::{Path, PathBuf};

use super::{path_arg, render, InvocationOptions, ModelAdapter};
use crate::domain::{Action, Invocation, Model, Result};

#[derive(Debug, Clone)]
pub struct TemplateAdapter {
    model: Model,
    executable: PathBuf,
}

impl TemplateAdapter {
    pub fn new(model: Model, executable: PathBuf) -> Self {
        Self { model, executable }
    }
}

impl ModelAdapter for TemplateAdapter {
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
        let input = path_arg(source_file);
        let output = path_arg(output_file);
        let reference = options
            .reference_file
            .as_deref()
            .map(path_arg)
            .unwrap_or_default();
        let vars = [
            ("input", input.as_str()),
            ("output", output.as_str()),
            ("reference", reference.as_str()),
            ("codec", codec),
        ];

        let mut args: Vec<String> = self.model.args.iter().map(|a| render(a, &vars)).collect();
        args.extend(self.model.extra_args.iter().cloned());

        Ok(Invocation {
            model: self.model.name.clone(),
            executable: self.executable.clone(),
            args,
            source_file: source_file.to_path_buf(),
            output_file: output_file.to_path_buf(),
            output_format: self.output_format(options.per_frame),
            reference_file: options.reference_file.clone(),
            config: None,
        })
    }
}
