//! JSONL span tracing into the app data dir.
//!
//! Every bridge command and window action opens a `Span`; spans end with
//! ok/err, and a dropped span records itself as aborted. Writing is
//! best-effort: tracing must never take the shell down.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use anyhow::Error as AnyhowError;
use serde::Serialize;
use serde_json::Value;

const DEFAULT_TRACE_MAX_BYTES: u64 = 10_000_000; // 10MB
const DEFAULT_TRACE_MAX_FILES: usize = 5;

// Best-effort stderr logging that never panics. On Windows GUI-subsystem
// builds stderr writes can fail; ignoring the failure beats aborting.
#[macro_export]
macro_rules! safe_eprintln {
    ($($arg:tt)*) => {{
        use std::io::Write;
        let _ = writeln!(std::io::stderr(), $($arg)*);
    }};
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn env_bool_default_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(v) => {
            let t = v.trim().to_ascii_lowercase();
            !(t == "0" || t == "false" || t == "no" || t == "off")
        }
        Err(_) => true,
    }
}

pub fn enabled() -> bool {
    // Default: enabled. Users can set MURMUR_TRACE_ENABLED=0 to disable.
    env_bool_default_true("MURMUR_TRACE_ENABLED")
}

fn max_bytes() -> u64 {
    std::env::var("MURMUR_TRACE_MAX_BYTES")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_TRACE_MAX_BYTES)
}

fn max_files() -> usize {
    std::env::var("MURMUR_TRACE_MAX_FILES")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_TRACE_MAX_FILES)
}

pub fn trace_path(data_dir: &Path) -> PathBuf {
    data_dir.join("trace.jsonl")
}

fn rotate_if_needed_best_effort(data_dir: &Path) {
    let p = trace_path(data_dir);
    let max_b = max_bytes();
    let max_f = max_files();
    if max_f == 0 {
        return;
    }
    let len = match std::fs::metadata(&p) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if len <= max_b {
        return;
    }

    // Remove the oldest first so Windows renames won't fail due to existing dest files.
    let oldest = data_dir.join(format!("trace.jsonl.{max_f}"));
    if oldest.exists() {
        let _ = std::fs::remove_file(&oldest);
    }
    for i in (1..max_f).rev() {
        let src = data_dir.join(format!("trace.jsonl.{i}"));
        let dst = data_dir.join(format!("trace.jsonl.{}", i + 1));
        if src.exists() {
            let _ = std::fs::rename(&src, &dst);
        }
    }
    let _ = std::fs::rename(&p, data_dir.join("trace.jsonl.1"));
}

fn trace_write_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceError {
    pub kind: String,    // bridge|window|io|logic|parse|unknown
    pub code: String,    // E_*
    pub message: String, // short
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub ts_ms: i64,
    pub task_id: Option<String>,
    pub stage: String,
    pub step_id: String,
    pub op: String,     // start|end|event
    pub status: String, // ok|err|aborted
    pub duration_ms: Option<u128>,
    pub error: Option<TraceError>,
    pub ctx: Option<Value>,
}

pub fn emit_best_effort(data_dir: &Path, ev: &TraceEvent) {
    if !enabled() {
        return;
    }
    let _guard = trace_write_lock().lock().unwrap();
    let _ = std::fs::create_dir_all(data_dir);
    rotate_if_needed_best_effort(data_dir);

    let p = trace_path(data_dir);
    let mut f = match OpenOptions::new().create(true).append(true).open(&p) {
        Ok(f) => f,
        Err(e) => {
            safe_eprintln!("trace: open failed: {}: {e}", p.display());
            return;
        }
    };
    let mut line = match serde_json::to_string(ev) {
        Ok(s) => s,
        Err(e) => {
            safe_eprintln!("trace: serialize failed: {e}");
            return;
        }
    };
    line.push('\n');
    if let Err(e) = f.write_all(line.as_bytes()) {
        safe_eprintln!("trace: write failed: {e}");
    }
}

pub fn event(
    data_dir: &Path,
    task_id: Option<&str>,
    stage: &str,
    step_id: &str,
    status: &str,
    ctx: Option<Value>,
) {
    emit_best_effort(
        data_dir,
        &TraceEvent {
            ts_ms: now_ms(),
            task_id: task_id.map(|s| s.to_string()),
            stage: stage.to_string(),
            step_id: step_id.to_string(),
            op: "event".to_string(),
            status: status.to_string(),
            duration_ms: None,
            error: None,
            ctx,
        },
    );
}

fn anyhow_chain(err: &AnyhowError) -> Vec<String> {
    err.chain().map(|e| e.to_string()).collect()
}

pub struct Span {
    data_dir: PathBuf,
    task_id: Option<String>,
    stage: String,
    step_id: String,
    t0: Instant,
    finished: bool,
}

impl Span {
    pub fn start(
        data_dir: &Path,
        task_id: Option<&str>,
        stage: &str,
        step_id: &str,
        ctx: Option<Value>,
    ) -> Self {
        emit_best_effort(
            data_dir,
            &TraceEvent {
                ts_ms: now_ms(),
                task_id: task_id.map(|s| s.to_string()),
                stage: stage.to_string(),
                step_id: step_id.to_string(),
                op: "start".to_string(),
                status: "ok".to_string(),
                duration_ms: None,
                error: None,
                ctx,
            },
        );
        Self {
            data_dir: data_dir.to_path_buf(),
            task_id: task_id.map(|s| s.to_string()),
            stage: stage.to_string(),
            step_id: step_id.to_string(),
            t0: Instant::now(),
            finished: false,
        }
    }

    fn end(&mut self, status: &str, error: Option<TraceError>, ctx: Option<Value>) {
        self.finished = true;
        emit_best_effort(
            &self.data_dir,
            &TraceEvent {
                ts_ms: now_ms(),
                task_id: self.task_id.clone(),
                stage: self.stage.clone(),
                step_id: self.step_id.clone(),
                op: "end".to_string(),
                status: status.to_string(),
                duration_ms: Some(self.t0.elapsed().as_millis()),
                error,
                ctx,
            },
        );
    }

    pub fn ok(mut self, ctx: Option<Value>) {
        self.end("ok", None, ctx);
    }

    pub fn err(mut self, kind: &str, code: &str, message: &str, ctx: Option<Value>) {
        self.end(
            "err",
            Some(TraceError {
                kind: kind.to_string(),
                code: code.to_string(),
                message: message.to_string(),
            }),
            ctx,
        );
    }

    pub fn err_anyhow(mut self, kind: &str, code: &str, err: &AnyhowError, ctx: Option<Value>) {
        let mut m = serde_json::Map::new();
        m.insert(
            "err_chain".to_string(),
            serde_json::json!(anyhow_chain(err)),
        );
        if let Some(Value::Object(extra)) = ctx {
            for (k, v) in extra {
                m.insert(k, v);
            }
        }
        self.end(
            "err",
            Some(TraceError {
                kind: kind.to_string(),
                code: code.to_string(),
                message: err.to_string(),
            }),
            Some(Value::Object(m)),
        );
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.end(
            "aborted",
            Some(TraceError {
                kind: "logic".to_string(),
                code: "ABORTED".to_string(),
                message: "span dropped without explicit ok/err".to_string(),
            }),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, thread};

    #[test]
    fn concurrent_emit_keeps_jsonl_lines_parseable() {
        let td = tempfile::tempdir().expect("tempdir");
        let dir = td.path().to_path_buf();
        let threads = 4;
        let per_thread = 50;

        let mut joins = Vec::new();
        for _ in 0..threads {
            let dir2 = dir.clone();
            joins.push(thread::spawn(move || {
                for _ in 0..per_thread {
                    event(&dir2, Some("task-c"), "TraceTest", "TRACE.emit", "ok", None);
                }
            }));
        }
        for j in joins {
            j.join().expect("join");
        }

        let raw = fs::read_to_string(trace_path(&dir)).expect("read trace");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), threads * per_thread);
        for line in lines {
            let _: serde_json::Value = serde_json::from_str(line).expect("valid json line");
        }
    }

    #[test]
    fn dropped_span_records_aborted_end() {
        let td = tempfile::tempdir().expect("tempdir");
        {
            let _span = Span::start(td.path(), None, "TraceTest", "TRACE.dropped", None);
        }
        let raw = fs::read_to_string(trace_path(td.path())).expect("read trace");
        let last: serde_json::Value =
            serde_json::from_str(raw.lines().last().expect("line")).expect("json");
        assert_eq!(last["status"], "aborted");
        assert_eq!(last["error"]["code"], "ABORTED");
    }

    #[test]
    fn err_anyhow_captures_error_chain() {
        let td = tempfile::tempdir().expect("tempdir");
        let span = Span::start(td.path(), Some("t1"), "TraceTest", "TRACE.chain", None);
        let err = anyhow::anyhow!("root cause").context("outer context");
        span.err_anyhow("bridge", "E_TEST", &err, None);

        let raw = fs::read_to_string(trace_path(td.path())).expect("read trace");
        let last: serde_json::Value =
            serde_json::from_str(raw.lines().last().expect("line")).expect("json");
        assert_eq!(last["error"]["code"], "E_TEST");
        let chain = last["ctx"]["err_chain"].as_array().expect("chain");
        assert_eq!(chain.len(), 2);
    }
}
