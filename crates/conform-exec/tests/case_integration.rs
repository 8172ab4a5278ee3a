//! Integration tests for case execution with shell stand-ins for decoders.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conform_core::{
    CaseRegistry, CaseState, Digest, DigestMode, DigestStore, FileVerdict, HarnessConfig,
    SYNTHETIC_EXIT_CODE,
};
use conform_exec::{CaseReport, CaseRunner, RunGate};
use tokio::sync::watch;

const REGISTRY: &str = r#"
[[model]]
name = "copy"
adapter = "template"
executable = "sh"
codecs = ["vp8"]
actions = ["decode", "digest", "digest_by_frames", "compare"]
args = ["-c", 'cat "$0" > "$1"', "{input}", "{output}"]

[[model]]
name = "corrupt"
adapter = "template"
executable = "sh"
codecs = ["vp8"]
actions = ["decode", "digest", "compare"]
args = ["-c", 'cat "$0" > "$1"; printf x >> "$1"', "{input}", "{output}"]

# Writes the listing of its own output directory, taken before the output
# file exists, as its output.
[[model]]
name = "lister"
adapter = "template"
executable = "sh"
codecs = ["vp8"]
actions = ["digest"]
args = ["-c", 'seen=$(ls -A "$(dirname "$1")"); printf "%s" "$seen" > "$1"', "{input}", "{output}"]

[[model]]
name = "hang"
adapter = "template"
executable = "sh"
codecs = ["vp8"]
actions = ["digest"]
args = ["-c", "exec sleep 30", "{input}", "{output}"]

[[model]]
name = "crash"
adapter = "template"
executable = "sh"
codecs = ["vp8"]
actions = ["decode"]
args = ["-c", 'echo "bad partition" >&2; exit 2', "{input}", "{output}"]

[[model]]
name = "absent"
adapter = "template"
executable = "/nonexistent/decoder"
codecs = ["vp8"]
actions = ["digest"]
args = ["{input}"]

[[case]]
case = "copy-vp8-digest"
model = "copy"
codec = "vp8"
action = "digest"
stdout = "logs/vp8-copy.log"
srcdir = "streams"
outdir = "out"
includes = ["*.ivf"]

[[case]]
case = "copy-vp8-compare"
model = "copy"
codec = "vp8"
action = "compare"
stdout = "logs/vp8-copy.log"
srcdir = "streams"
outdir = "out"
includes = ["*.ivf"]

[[case]]
case = "copy-vp8-digest-a"
model = "copy"
codec = "vp8"
action = "digest"
stdout = "logs/vp8-copy.log"
srcdir = "streams"
outdir = "out"
includes = ["a.ivf"]

[[case]]
case = "corrupt-vp8-compare"
model = "corrupt"
codec = "vp8"
action = "compare"
stdout = "logs/vp8-corrupt.log"
srcdir = "streams"
outdir = "out"
includes = ["*.ivf"]

[[case]]
case = "corrupt-vs-copy-vp8-compare"
model = "corrupt"
codec = "vp8"
action = "compare"
stdout = "logs/vp8-cross.log"
srcdir = "streams"
outdir = "cross"
includes = ["*.ivf"]
reference_model = "copy"

[[case]]
case = "copy-vs-copy-vp8-compare"
model = "copy"
codec = "vp8"
action = "compare"
stdout = "logs/vp8-cross.log"
srcdir = "streams"
outdir = "cross"
includes = ["*.ivf"]
reference_model = "copy"

[[case]]
case = "copy-y4m-digest-frames"
model = "copy"
codec = "vp8"
action = "digest_by_frames"
stdout = "logs/y4m.log"
srcdir = "y4m"
outdir = "out-y4m"
includes = ["*.y4m"]

[[case]]
case = "copy-y4m-compare"
model = "copy"
codec = "vp8"
action = "compare"
stdout = "logs/y4m.log"
srcdir = "y4m-changed"
outdir = "out-y4m"
includes = ["*.y4m"]

[[case]]
case = "copy-vp8-decode"
model = "copy"
codec = "vp8"
action = "decode"
stdout = "logs/decode.log"
srcdir = "streams"
outdir = "decoded"

[[case]]
case = "crash-vp8-decode"
model = "crash"
codec = "vp8"
action = "decode"
stdout = "logs/crash.log"
srcdir = "streams"
outdir = "decoded"
includes = ["a.ivf"]

[[case]]
case = "lister-vp8-digest"
model = "lister"
codec = "vp8"
action = "digest"
stdout = "logs/lister.log"
srcdir = "streams"
outdir = "out-lister"
includes = ["*.ivf"]

[[case]]
case = "hang-vp8-digest"
model = "hang"
codec = "vp8"
action = "digest"
stdout = "logs/hang.log"
srcdir = "streams"
outdir = "out-hang"
includes = ["a.ivf"]
timeout_secs = 1

[[case]]
case = "missing-srcdir"
model = "copy"
codec = "vp8"
action = "digest"
stdout = "logs/missing.log"
srcdir = "no-such-streams"
outdir = "out"

[[case]]
case = "unbound-model"
model = "coda960"
codec = "vp8"
action = "compare"
stdout = "logs/unbound.log"
srcdir = "streams"
outdir = "out"

[[case]]
case = "unsupported-codec"
model = "copy"
codec = "h264"
action = "digest"
stdout = "logs/unsupported.log"
srcdir = "streams"
outdir = "out"

[[case]]
case = "absent-executable"
model = "absent"
codec = "vp8"
action = "digest"
stdout = "logs/absent.log"
srcdir = "streams"
outdir = "out"
"#;

struct Fixture {
    dir: tempfile::TempDir,
    registry: Arc<CaseRegistry>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();

        write(root, "streams/a.ivf", b"DKIF vp8 stream a");
        write(root, "streams/b.ivf", b"DKIF vp8 stream b");
        write(root, "streams/notes.txt", b"not a bitstream");

        write(root, "y4m/clip.y4m", &y4m(&[b"AAAAAA", b"BBBBBB", b"CCCCCC"]));
        write(root, "y4m-changed/clip.y4m", &y4m(&[b"AAAAAA", b"BBBBBX", b"CCCCCC"]));

        let registry = CaseRegistry::from_toml_str(REGISTRY, root).expect("registry parses");
        Self {
            dir,
            registry: Arc::new(registry),
        }
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }

    fn runner(&self, concurrency: usize) -> CaseRunner {
        CaseRunner::new(
            Arc::clone(&self.registry),
            HarnessConfig::default().with_concurrency(concurrency),
        )
    }

    async fn run(&self, case: &str) -> CaseReport {
        let case = self.registry.case(case).expect("case exists");
        self.runner(4).run_case(case).await
    }
}

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// 2x2 4:2:0 stream: six bytes per frame.
fn y4m(frames: &[&[u8]]) -> Vec<u8> {
    let mut out = b"YUV4MPEG2 W2 H2 F25:1 C420jpeg\n".to_vec();
    for frame in frames {
        out.extend_from_slice(b"FRAME\n");
        out.extend_from_slice(frame);
    }
    out
}

fn verdicts(report: &CaseReport) -> Vec<(String, FileVerdict)> {
    report
        .result
        .as_ref()
        .expect("case has a result")
        .outcomes
        .iter()
        .map(|o| (o.file.display().to_string(), o.verdict.clone()))
        .collect()
}

/// Test: digest writes one record per selected file; compare on unchanged
/// output then matches every file
#[tokio::test]
async fn test_digest_then_compare_matches() {
    let fx = Fixture::new();

    let digest = fx.run("copy-vp8-digest").await;
    assert_eq!(digest.state, CaseState::Done, "{:?}", digest.error);
    assert!(digest.passed());
    let result = digest.result.as_ref().unwrap();
    assert_eq!(result.passed, 2);
    assert_eq!(result.total(), 2);

    let store = DigestStore::new(fx.path("out"));
    assert!(store.record_path("a.ivf").is_file());
    assert!(store.record_path("b.ivf").is_file());
    assert!(!store.record_path("notes.txt").is_file());
    let record = store.get("a.ivf").unwrap();
    assert_eq!(record.mode, DigestMode::Whole);
    assert_eq!(record.digests.len(), 1);

    let compare = fx.run("copy-vp8-compare").await;
    assert!(compare.passed(), "{:?}", verdicts(&compare));
    for outcome in &compare.result.as_ref().unwrap().outcomes {
        let digest = outcome.digest.as_ref().expect("compare records digest");
        assert_eq!(digest.matched_reference, Some(true));
    }

    // Scratch output is gone once the case finishes.
    let leftovers: Vec<_> = std::fs::read_dir(fx.path("out"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".conform-"))
        .collect();
    assert!(leftovers.is_empty());
}

/// Test: hashed output is removed before the next file is decoded
#[tokio::test]
async fn test_scratch_output_removed_between_files() {
    let fx = Fixture::new();
    let case = fx.registry.case("lister-vp8-digest").unwrap();

    let report = fx.runner(1).run_case(case).await;
    assert!(report.passed(), "{:?}", verdicts(&report));

    // Every decoder saw an empty output directory.
    let store = DigestStore::new(fx.path("out-lister"));
    for file in ["a.ivf", "b.ivf"] {
        let record = store.get(file).unwrap();
        assert_eq!(record.digests, vec![Digest::compute(b"")], "{file}");
    }
}

/// Test: stored digests are byte-stable across runs
#[tokio::test]
async fn test_digest_records_are_stable() {
    let fx = Fixture::new();

    fx.run("copy-vp8-digest").await;
    let first = std::fs::read(fx.path("out/a.ivf.digest.json")).unwrap();
    fx.run("copy-vp8-digest").await;
    let second = std::fs::read(fx.path("out/a.ivf.digest.json")).unwrap();
    assert_eq!(first, second);
}

/// Test: a missing golden digest fails that file only
#[tokio::test]
async fn test_missing_reference_is_file_failure() {
    let fx = Fixture::new();

    assert!(fx.run("copy-vp8-digest-a").await.passed());
    let compare = fx.run("copy-vp8-compare").await;

    assert_eq!(compare.state, CaseState::Done);
    assert!(!compare.passed());
    let v = verdicts(&compare);
    assert_eq!(v.len(), 2);
    assert_eq!(v[0], ("a.ivf".to_string(), FileVerdict::Passed));
    match &v[1] {
        (file, FileVerdict::Failed { reason }) => {
            assert_eq!(file, "b.ivf");
            assert!(reason.contains("no stored digest"), "{reason}");
        }
        other => panic!("expected failed b.ivf, got {other:?}"),
    }
}

/// Test: changed decoder output is a mismatch
#[tokio::test]
async fn test_changed_output_mismatches() {
    let fx = Fixture::new();

    fx.run("copy-vp8-digest").await;
    let compare = fx.run("corrupt-vp8-compare").await;

    assert_eq!(compare.state, CaseState::Done);
    let result = compare.result.as_ref().unwrap();
    assert_eq!(result.failed, 2);
    for (_, verdict) in verdicts(&compare) {
        assert_eq!(
            verdict,
            FileVerdict::Failed {
                reason: "digest mismatch".to_string()
            }
        );
    }
}

/// Test: per-frame digests pinpoint the first differing frame
#[tokio::test]
async fn test_frame_digests_report_first_mismatch() {
    let fx = Fixture::new();

    let digest = fx.run("copy-y4m-digest-frames").await;
    assert!(digest.passed(), "{:?}", verdicts(&digest));
    let record = DigestStore::new(fx.path("out-y4m")).get("clip.y4m").unwrap();
    assert_eq!(record.mode, DigestMode::Frames);
    assert_eq!(record.digests.len(), 3);

    let compare = fx.run("copy-y4m-compare").await;
    assert_eq!(
        verdicts(&compare),
        vec![(
            "clip.y4m".to_string(),
            FileVerdict::Failed {
                reason: "digest mismatch at frame 1".to_string()
            }
        )]
    );
}

/// Test: cross-model compare uses the reference model's fresh digest
#[tokio::test]
async fn test_cross_model_compare() {
    let fx = Fixture::new();

    let same = fx.run("copy-vs-copy-vp8-compare").await;
    assert!(same.passed(), "{:?}", verdicts(&same));

    let differ = fx.run("corrupt-vs-copy-vp8-compare").await;
    assert_eq!(differ.state, CaseState::Done);
    assert_eq!(differ.result.as_ref().unwrap().failed, 2);

    // Nothing is persisted as golden by a compare.
    assert!(!DigestStore::new(fx.path("cross")).record_path("a.ivf").is_file());
}

/// Test: decode keeps the output under outdir
#[tokio::test]
async fn test_decode_keeps_output() {
    let fx = Fixture::new();

    let decode = fx.run("copy-vp8-decode").await;
    assert!(decode.passed(), "{:?}", verdicts(&decode));
    assert_eq!(decode.result.as_ref().unwrap().total(), 3);
    assert_eq!(
        std::fs::read(fx.path("decoded/a.ivf.yuv")).unwrap(),
        b"DKIF vp8 stream a"
    );
}

/// Test: non-zero exit fails the file and keeps stderr
#[tokio::test]
async fn test_decoder_failure_recorded_with_stderr() {
    let fx = Fixture::new();

    let report = fx.run("crash-vp8-decode").await;
    assert_eq!(report.state, CaseState::Done);
    let outcome = &report.result.as_ref().unwrap().outcomes[0];
    assert_eq!(outcome.exit_code, Some(2));
    assert_eq!(
        outcome.verdict,
        FileVerdict::Failed {
            reason: "decoder exited with code 2".to_string()
        }
    );
    assert_eq!(outcome.stderr_excerpt.as_deref(), Some("bad partition"));

    let log = std::fs::read_to_string(fx.path("logs/crash.log")).unwrap();
    assert!(log.contains("FAIL  a.ivf exit=2"));
    assert!(log.contains("-- stderr a.ivf"));
    assert!(log.contains("   | bad partition"));
}

/// Test: a decoder that never terminates is killed at the timeout
#[tokio::test]
async fn test_timeout_kills_decoder() {
    let fx = Fixture::new();

    let started = Instant::now();
    let report = fx.run("hang-vp8-digest").await;
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(report.state, CaseState::Done);
    let outcome = &report.result.as_ref().unwrap().outcomes[0];
    assert_eq!(outcome.exit_code, Some(SYNTHETIC_EXIT_CODE));
    match &outcome.verdict {
        FileVerdict::Failed { reason } => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("expected timeout failure, got {other:?}"),
    }
}

/// Test: pool size does not change the aggregated result
#[tokio::test]
async fn test_pool_size_does_not_change_result() {
    let fx = Fixture::new();
    fx.run("copy-vp8-digest-a").await;

    let case = fx.registry.case("copy-vp8-compare").unwrap();
    let serial = fx.runner(1).run_case(case).await;
    let parallel = fx.runner(8).run_case(case).await;

    let strip = |r: &CaseReport| {
        let result = r.result.as_ref().unwrap();
        (
            result.passed,
            result.failed,
            result.errored,
            result
                .outcomes
                .iter()
                .map(|o| (o.file.clone(), o.verdict.clone(), o.exit_code, o.digest.clone()))
                .collect::<Vec<_>>(),
        )
    };
    assert_eq!(strip(&serial), strip(&parallel));
}

/// Test: configuration errors fail the case before any decoder runs
#[tokio::test]
async fn test_configuration_errors_fail_case() {
    let fx = Fixture::new();

    for (case, needle) in [
        ("missing-srcdir", "source directory not found"),
        ("unbound-model", "unbound model: coda960"),
        ("unsupported-codec", "does not support codec h264"),
        ("absent-executable", "executable not found"),
    ] {
        let report = fx.run(case).await;
        assert_eq!(report.state, CaseState::Failed, "{case}");
        assert!(report.result.is_none(), "{case}");
        let error = report.error.as_deref().unwrap_or_default();
        assert!(error.contains(needle), "{case}: {error}");

        let log = std::fs::read_to_string(&report.log_path).unwrap();
        assert!(log.contains("!! "), "{case}");
    }
}

/// Test: one failing case does not stop the next; the gate sees both
#[tokio::test]
async fn test_run_all_continues_after_failure() {
    let fx = Fixture::new();

    let cases: Vec<_> = ["missing-srcdir", "copy-vp8-digest"]
        .iter()
        .map(|n| fx.registry.case(n).unwrap())
        .collect();
    let reports = fx.runner(2).run_all(&cases).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].state, CaseState::Failed);
    assert!(reports[1].passed());

    let verdict = RunGate::evaluate(&reports);
    assert!(!verdict.passed);
    assert_eq!(verdict.cases_passed, 1);
    assert_eq!(verdict.exit_code(), 1);
}

/// Test: fail_fast stops after the first case that does not pass
#[tokio::test]
async fn test_fail_fast_stops_run() {
    let fx = Fixture::new();

    let cases: Vec<_> = ["missing-srcdir", "copy-vp8-digest"]
        .iter()
        .map(|n| fx.registry.case(n).unwrap())
        .collect();
    let runner = CaseRunner::new(
        Arc::clone(&fx.registry),
        HarnessConfig::default().with_fail_fast(true),
    );
    let reports = runner.run_all(&cases).await;
    assert_eq!(reports.len(), 1);
}

/// Test: cancelling a case kills in-flight decoders
#[tokio::test]
async fn test_cancel_propagates_to_workers() {
    let fx = Fixture::new();
    let (tx, rx) = watch::channel(false);
    let runner = CaseRunner::new(
        Arc::clone(&fx.registry),
        HarnessConfig::default().with_timeout(Duration::from_secs(60)),
    )
    .with_cancel(rx);

    let mut case = fx.registry.case("hang-vp8-digest").unwrap().clone();
    case.timeout_secs = None;

    let started = Instant::now();
    let run = tokio::spawn(async move { runner.run_case(&case).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    tx.send(true).unwrap();

    let report = run.await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.state, CaseState::Failed);
    assert_eq!(report.error.as_deref(), Some("case cancelled"));
    let outcome = &report.result.as_ref().unwrap().outcomes[0];
    assert_eq!(
        outcome.verdict,
        FileVerdict::Errored {
            reason: "cancelled".to_string()
        }
    );
}
