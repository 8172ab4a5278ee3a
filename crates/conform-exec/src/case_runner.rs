//! Case orchestration.
//!
//! One case moves `Pending -> Enumerating -> Running -> Aggregating -> Done`.
//! `Failed` is reached from `Enumerating` (bad binding, missing directory)
//! or from `Running` when a worker hits a case-level error. Per-file
//! decoder problems only ever become file verdicts.
//!
//! Files are processed by a bounded pool of tokio tasks. Each task owns
//! one file end to end (build invocation, execute, digest) and pushes its
//! outcome to a shared collector; the aggregate is sorted by path so it
//! does not depend on completion order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, info, warn, Instrument};

use conform_core::{
    case_span, emit_case_aborted, emit_case_finished, emit_case_started, emit_file_finished,
    relative_key, Action, Adapter, CaseRegistry, CaseResult, CaseState, ConformError,
    DigestEngine, DigestError, DigestMode, DigestRecord, FileEnumerator, FileOutcome,
    FileVerdict, HarnessConfig, InvocationOptions, ModelAdapter, Result, TestCase,
};

use crate::executor::{cancelled, Executor};
use crate::report::{append_case_log, CaseReport};

/// Lines of decoder stderr kept for a failed file.
const STDERR_EXCERPT_LINES: usize = 20;

/// Runs cases from one registry under one set of harness settings.
pub struct CaseRunner {
    registry: Arc<CaseRegistry>,
    config: HarnessConfig,
    cancel: watch::Receiver<bool>,
}

impl CaseRunner {
    pub fn new(registry: Arc<CaseRegistry>, config: HarnessConfig) -> Self {
        Self {
            registry,
            config,
            cancel: watch::channel(false).1,
        }
    }

    /// Abort in-flight work once `cancel` holds `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `cases` one after another.
    ///
    /// A failing case never stops the next one unless `fail_fast` is set.
    /// Cases not started because of cancellation or `fail_fast` get no
    /// report.
    pub async fn run_all(&self, cases: &[&TestCase]) -> Vec<CaseReport> {
        let mut reports = Vec::with_capacity(cases.len());
        for case in cases {
            let aborted = *self.cancel.borrow();
            if aborted {
                warn!(case = %case.name, "run cancelled; skipping remaining cases");
                break;
            }
            let report = self.run_case(case).await;
            let stop = self.config.fail_fast && !report.passed();
            reports.push(report);
            if stop {
                info!(case = %case.name, "fail_fast set; skipping remaining cases");
                break;
            }
        }
        reports
    }

    /// Run one case to a terminal state and append its block to the case log.
    pub async fn run_case(&self, case: &TestCase) -> CaseReport {
        self.run_case_inner(case)
            .instrument(case_span(&case.name, &case.model))
            .await
    }

    async fn run_case_inner(&self, case: &TestCase) -> CaseReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut tracker = StateTracker::new(&case.name);

        tracker.advance(CaseState::Enumerating);
        let (ctx, files) = match self.prepare(case) {
            Ok(prepared) => prepared,
            Err(e) => {
                emit_case_aborted(&case.name, &e);
                tracker.advance(CaseState::Failed);
                return finish(case, tracker.state, None, Some(e.to_string()), started_at);
            }
        };

        tracker.advance(CaseState::Running);
        emit_case_started(&case.name, &case.codec, case.action, files.len());
        let (outcomes, error) = self.run_files(Arc::new(ctx), files).await;
        let result = CaseResult::from_outcomes(outcomes, start.elapsed());

        if let Some(e) = error {
            emit_case_aborted(&case.name, &e);
            tracker.advance(CaseState::Failed);
            return finish(case, tracker.state, Some(result), Some(e.to_string()), started_at);
        }

        tracker.advance(CaseState::Aggregating);
        emit_case_finished(&case.name, &result);
        let mut report = CaseReport {
            case: case.name.clone(),
            model: case.model.clone(),
            codec: case.codec.clone(),
            action: case.action,
            state: CaseState::Done,
            result: Some(result),
            error: None,
            started_at,
            log_path: case.stdout_log.clone(),
        };
        if let Err(e) = append_case_log(&report) {
            emit_case_aborted(&case.name, &e);
            tracker.advance(CaseState::Failed);
            report.state = tracker.state;
            report.error = Some(format!("cannot write case log: {e}"));
            return report;
        }
        tracker.advance(CaseState::Done);
        report
    }

    /// Case-level checks done before any decoder runs.
    fn prepare(&self, case: &TestCase) -> Result<(CaseContext, Vec<PathBuf>)> {
        let model = self.registry.bind(case)?;
        model.check_support(&case.codec, case.action)?;
        let adapter = Adapter::for_model(model)?;

        let reference = match (&case.reference_model, case.action) {
            (Some(name), Action::Compare) => {
                let reference = self.registry.model_for(case, name)?;
                reference.check_support(&case.codec, Action::Compare)?;
                Some(Adapter::for_model(reference)?)
            }
            (Some(name), action) => {
                warn!(
                    case = %case.name,
                    reference_model = %name,
                    action = %action,
                    "reference_model only applies to compare; ignored"
                );
                None
            }
            (None, _) => None,
        };

        let enumerator = FileEnumerator::new(&case.include_patterns, &case.exclude_patterns)?;
        let files = enumerator.enumerate(&case.source_dir)?;

        std::fs::create_dir_all(&case.output_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix(".conform-")
            .tempdir_in(&case.output_dir)?;

        Ok((
            CaseContext {
                case: case.clone(),
                adapter,
                reference,
                engine: DigestEngine::new(&case.output_dir),
                timeout: self.config.timeout_for(case),
                keep_artifacts: self.config.keep_artifacts,
                scratch,
            },
            files,
        ))
    }

    /// Process every file on the bounded pool.
    ///
    /// Returns outcomes in completion order and the first case-level error.
    async fn run_files(
        &self,
        ctx: Arc<CaseContext>,
        files: Vec<PathBuf>,
    ) -> (Vec<FileOutcome>, Option<ConformError>) {
        let outcomes: Arc<Mutex<Vec<FileOutcome>>> = Arc::new(Mutex::new(Vec::new()));
        let first_error: Arc<Mutex<Option<ConformError>>> = Arc::new(Mutex::new(None));

        // Case-local abort flag: set by the operator's cancel or by a
        // worker's case-level error.
        let (abort_tx, _abort_rx) = watch::channel(false);
        let abort_tx = Arc::new(abort_tx);

        let forward = {
            let abort_tx = Arc::clone(&abort_tx);
            let mut outer = self.cancel.clone();
            tokio::spawn(async move {
                cancelled(&mut outer).await;
                let _ = abort_tx.send(true);
            })
        };

        let sem = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = Vec::with_capacity(files.len());

        for file in files {
            let ctx = Arc::clone(&ctx);
            let outcomes = Arc::clone(&outcomes);
            let first_error = Arc::clone(&first_error);
            let abort_tx = Arc::clone(&abort_tx);
            let abort_rx = abort_tx.subscribe();
            let sem = Arc::clone(&sem);

            let task = tokio::spawn(
                async move {
                    let _permit = sem.acquire_owned().await.ok();

                    let aborted = *abort_rx.borrow();
                    if aborted {
                        let outcome = FileOutcome::new(
                            file,
                            FileVerdict::Errored {
                                reason: "cancelled".to_string(),
                            },
                        );
                        outcomes.lock().await.push(outcome);
                        return;
                    }

                    match process_file(&ctx, &file, abort_rx).await {
                        Ok(outcome) => {
                            emit_file_finished(
                                &ctx.case.name,
                                &relative_key(&outcome.file),
                                &outcome.verdict,
                                outcome.wall_time_ms,
                            );
                            outcomes.lock().await.push(outcome);
                        }
                        Err(e) => {
                            warn!(file = %file.display(), error = %e, "case-level error in worker");
                            let _ = abort_tx.send(true);
                            first_error.lock().await.get_or_insert(e);
                        }
                    }
                }
                .in_current_span(),
            );
            tasks.push(task);
        }

        for task in tasks {
            if let Err(e) = task.await {
                first_error
                    .lock()
                    .await
                    .get_or_insert(ConformError::Worker(e.to_string()));
            }
        }
        forward.abort();

        let outcomes = std::mem::take(&mut *outcomes.lock().await);
        let mut error = first_error.lock().await.take();
        if error.is_none() && *self.cancel.borrow() {
            error = Some(ConformError::Cancelled);
        }
        (outcomes, error)
    }
}

/// State shared read-only by every worker of one case.
struct CaseContext {
    case: TestCase,
    adapter: Adapter,
    reference: Option<Adapter>,
    engine: DigestEngine,
    timeout: Duration,
    keep_artifacts: bool,
    /// Decoder output that is only hashed, never kept. Removed on drop.
    scratch: TempDir,
}

impl CaseContext {
    /// Where decoded output for `key` goes, with parent directories created.
    ///
    /// Only `decode` keeps its output; anything else is hashed and removed
    /// when the returned guard drops.
    fn output_path(&self, key: &str, suffix: &str) -> Result<OutputFile> {
        let keep = self.case.action == Action::Decode;
        let root = if keep {
            self.case.output_dir.as_path()
        } else {
            self.scratch.path()
        };
        let path = root.join(format!("{key}.{suffix}"));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OutputFile { path, keep })
    }

    /// Kept parameter files land beside the case output, mirroring the
    /// input's relative directory.
    fn options(&self, key: &str, per_frame: bool) -> InvocationOptions {
        let artifact_dir = if self.keep_artifacts {
            match Path::new(key).parent() {
                Some(parent) => self.case.output_dir.join(parent),
                None => self.case.output_dir.clone(),
            }
        } else {
            self.scratch.path().to_path_buf()
        };
        InvocationOptions {
            reference_file: None,
            artifact_dir,
            keep_artifacts: self.keep_artifacts,
            per_frame,
        }
    }
}

/// Decoder output for one file, removed on drop unless kept.
struct OutputFile {
    path: PathBuf,
    keep: bool,
}

impl OutputFile {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "cannot remove decoder output");
            }
        }
    }
}

/// Tracks the case state and rejects illegal transitions in debug builds.
struct StateTracker<'a> {
    case: &'a str,
    state: CaseState,
}

impl<'a> StateTracker<'a> {
    fn new(case: &'a str) -> Self {
        Self {
            case,
            state: CaseState::Pending,
        }
    }

    fn advance(&mut self, next: CaseState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal case transition {} -> {}",
            self.state,
            next
        );
        debug!(case = %self.case, from = %self.state, to = %next, "case state");
        self.state = next;
    }
}

fn finish(
    case: &TestCase,
    state: CaseState,
    result: Option<CaseResult>,
    error: Option<String>,
    started_at: chrono::DateTime<Utc>,
) -> CaseReport {
    let mut report = CaseReport {
        case: case.name.clone(),
        model: case.model.clone(),
        codec: case.codec.clone(),
        action: case.action,
        state,
        result,
        error,
        started_at,
        log_path: case.stdout_log.clone(),
    };
    if let Err(e) = append_case_log(&report) {
        warn!(case = %case.name, error = %e, "cannot write case log");
        let previous = report.error.take().unwrap_or_default();
        report.error = Some(format!("{previous}; cannot write case log: {e}"));
    }
    report
}

/// The per-file pipeline: build, execute, digest.
///
/// `Err` is reserved for case-level problems; everything the decoder does
/// wrong ends up in the returned outcome's verdict.
async fn process_file(
    ctx: &CaseContext,
    relative: &Path,
    cancel: watch::Receiver<bool>,
) -> Result<FileOutcome> {
    let case = &ctx.case;
    let key = relative_key(relative);
    let source = case.source_dir.join(relative);
    let started = Instant::now();

    // Compare against a golden record decodes the same way the record
    // was produced.
    let golden = match (case.action, &ctx.reference) {
        (Action::Compare, None) => match ctx.engine.reference(&key) {
            Ok(record) => Some(record),
            Err(e @ DigestError::MissingReference { .. }) => {
                return Ok(FileOutcome::new(
                    relative.to_path_buf(),
                    FileVerdict::Failed {
                        reason: e.to_string(),
                    },
                ));
            }
            Err(e) => {
                return Ok(FileOutcome::new(
                    relative.to_path_buf(),
                    FileVerdict::Errored {
                        reason: format!("unreadable golden digest: {e}"),
                    },
                ));
            }
        },
        _ => None,
    };
    let mode = match (&golden, case.action) {
        (Some(record), _) => record.mode,
        (None, Action::DigestByFrames) => DigestMode::Frames,
        _ => DigestMode::Whole,
    };
    let per_frame = mode == DigestMode::Frames;

    let format = ctx.adapter.output_format(per_frame);
    let output_file = ctx.output_path(&key, format.extension())?;
    let output = output_file.path();
    let invocation = ctx.adapter.build_invocation(
        &case.codec,
        case.action,
        &source,
        output,
        &ctx.options(&key, per_frame),
    )?;
    let result = Executor::run(&invocation, ctx.timeout, cancel.clone()).await?;
    // Releases the generated parameter file.
    drop(invocation);

    let mut outcome = FileOutcome::new(relative.to_path_buf(), FileVerdict::Passed);
    outcome.exit_code = Some(result.exit_code);

    if !result.succeeded() {
        outcome.verdict = if result.cancelled {
            FileVerdict::Errored {
                reason: result.failure_reason(),
            }
        } else {
            FileVerdict::Failed {
                reason: result.failure_reason(),
            }
        };
        outcome.stderr_excerpt = stderr_excerpt(&result.stderr);
        outcome.wall_time_ms = started.elapsed().as_millis() as u64;
        return Ok(outcome);
    }

    let layout = ctx.adapter.frame_layout(&result);
    outcome.verdict = match case.action {
        Action::Decode => {
            if output.exists() {
                FileVerdict::Passed
            } else {
                FileVerdict::Failed {
                    reason: DigestError::MissingOutput(output.to_path_buf()).to_string(),
                }
            }
        }
        Action::Digest | Action::DigestByFrames => {
            match DigestEngine::compute(&key, output, mode, layout) {
                Ok(record) => {
                    let path = ctx.engine.persist(&record)?;
                    debug!(file = %key, record = %path.display(), "stored digest");
                    outcome.digest = Some(record);
                    FileVerdict::Passed
                }
                Err(e) => digest_failure(e),
            }
        }
        Action::Compare => {
            let baseline = match (&golden, &ctx.reference) {
                (Some(record), _) => Ok(record.clone()),
                (None, Some(reference)) => {
                    reference_digest(ctx, reference, &key, &source, cancel).await?
                }
                (None, None) => Err(FileVerdict::Errored {
                    reason: "no baseline digest".to_string(),
                }),
            };
            match baseline {
                Ok(baseline) => match DigestEngine::compute(&key, output, mode, layout) {
                    Ok(record) => {
                        let checked = DigestEngine::check(record, &baseline);
                        let verdict = comparison_verdict(&checked);
                        outcome.digest = Some(checked);
                        verdict
                    }
                    Err(e) => digest_failure(e),
                },
                Err(verdict) => verdict,
            }
        }
    };

    if !outcome.verdict.is_passed() {
        outcome.stderr_excerpt = stderr_excerpt(&result.stderr);
    }
    outcome.wall_time_ms = started.elapsed().as_millis() as u64;
    Ok(outcome)
}

/// Decode `source` with the reference model and digest its output.
///
/// The inner `Err` is the verdict for the file when the reference decoder
/// itself cannot produce a baseline.
async fn reference_digest(
    ctx: &CaseContext,
    reference: &Adapter,
    key: &str,
    source: &Path,
    cancel: watch::Receiver<bool>,
) -> Result<std::result::Result<DigestRecord, FileVerdict>> {
    let format = reference.output_format(false);
    let output_file = ctx.output_path(key, &format!("ref.{}", format.extension()))?;
    let invocation = reference.build_invocation(
        &ctx.case.codec,
        Action::Compare,
        source,
        output_file.path(),
        &ctx.options(key, false),
    )?;
    let result = Executor::run(&invocation, ctx.timeout, cancel).await?;
    drop(invocation);

    if !result.succeeded() {
        return Ok(Err(FileVerdict::Errored {
            reason: format!(
                "reference model {}: {}",
                reference.model().name,
                result.failure_reason()
            ),
        }));
    }

    Ok(
        DigestEngine::compute(key, output_file.path(), DigestMode::Whole, None).map_err(|e| {
            FileVerdict::Errored {
                reason: format!("reference model {}: {}", reference.model().name, e),
            }
        }),
    )
}

fn comparison_verdict(record: &DigestRecord) -> FileVerdict {
    if record.matched_reference == Some(true) {
        return FileVerdict::Passed;
    }
    let reason = match (record.mode, record.first_mismatch()) {
        (DigestMode::Frames, Some(frame)) => format!("digest mismatch at frame {frame}"),
        _ => "digest mismatch".to_string(),
    };
    FileVerdict::Failed { reason }
}

/// Digest problems are decoder faults only when the decoder left nothing
/// behind or the golden record is absent.
fn digest_failure(error: DigestError) -> FileVerdict {
    match error {
        DigestError::MissingOutput(_) | DigestError::MissingReference { .. } => {
            FileVerdict::Failed {
                reason: error.to_string(),
            }
        }
        other => FileVerdict::Errored {
            reason: other.to_string(),
        },
    }
}

fn stderr_excerpt(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(STDERR_EXCERPT_LINES);
    Some(lines[start..].join("\n"))
}
