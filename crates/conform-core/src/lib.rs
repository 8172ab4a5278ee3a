//! Codec Conformance Core Library
//!
//! Domain types, case registry, input enumeration, decoder adapters and
//! digests for the conformance harness. Process execution and case
//! orchestration live in `conform-exec`.

pub mod adapter;
pub mod config;
pub mod digest;
pub mod domain;
pub mod enumerate;
pub mod obs;
pub mod registry;
pub mod telemetry;

pub use domain::{
    Action, AdapterKind, CaseResult, CaseState, ConfigArtifact, ConformError, ExecutionResult,
    FileOutcome, FileVerdict, Invocation, Model, OutputFormat, RegistryError, Result, TestCase,
    SYNTHETIC_EXIT_CODE,
};

pub use adapter::{
    Adapter, FfmpegAdapter, InvocationOptions, JmAdapter, LibvpxAdapter, ModelAdapter,
    TemplateAdapter,
};
pub use config::HarnessConfig;
pub use digest::{
    ChromaFormat, Digest, DigestEngine, DigestError, DigestMode, DigestRecord, DigestStore,
    FrameLayout,
};
pub use enumerate::{enumerate, relative_key, FileEnumerator, GlobPattern};
pub use registry::{CaseFilter, CaseRegistry};

pub use obs::{
    case_span, emit_case_aborted, emit_case_finished, emit_case_started, emit_file_finished,
    CaseSpan,
};
pub use telemetry::init_tracing;
