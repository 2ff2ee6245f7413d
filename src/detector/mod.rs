//! Anomaly detector bridge
//!
//! ## Responsibilities
//!
//! - Run the external Python anomaly detector against one image
//! - Scrape its stdout for the JSON anomaly payload
//! - Preserve failing inputs under the failed-detections directory and
//!   degrade to a partial-failure outcome instead of erroring
//!
//! The detector is a black box invoked as
//! `<python> <script> --image <tmpfile>`. Its stdout may carry free-form
//! log lines before the JSON payload; the payload is either a bare array
//! of anomalies or an object with an `anomalies` field.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;

use crate::models::Anomaly;

/// Default subprocess ceiling. An unbounded detector would stall the
/// calling request task indefinitely.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Bridge configuration, threaded in at construction
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Explicit python executable; falls back to `PYTHON_EXEC`, then `python3`
    pub python_exec: Option<String>,
    /// Candidate script locations relative to the working directory.
    /// The first that exists wins; the last is used unconditionally.
    pub script_candidates: Vec<PathBuf>,
    /// Durable directory for preserved failing inputs
    pub failed_dir: PathBuf,
    /// Subprocess ceiling; `None` disables the timeout
    pub timeout: Option<Duration>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            python_exec: None,
            script_candidates: vec![
                PathBuf::from("python/anomaly_detection.py"),
                PathBuf::from("backend/python/anomaly_detection.py"),
            ],
            failed_dir: PathBuf::from("failed-detections"),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

/// Result of one detection call
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    /// Detector ran and its output parsed
    Success(Vec<Anomaly>),
    /// Detector failed (non-zero exit, timeout, or unparseable output)
    /// but the failing input was handled; `preserved` names the durable
    /// copy when one could be made
    PartialFailure {
        reason: String,
        preserved: Option<PathBuf>,
    },
    /// Nothing useful could be produced or preserved
    Fatal(String),
}

/// Subprocess bridge to the external anomaly detector
pub struct AnomalyDetector {
    python_exec: String,
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let python_exec = resolve_python_exec(
            config.python_exec.as_deref(),
            std::env::var("PYTHON_EXEC").ok().as_deref(),
        );
        Self {
            python_exec,
            config,
        }
    }

    pub fn failed_dir(&self) -> &Path {
        &self.config.failed_dir
    }

    /// Run the detector against one image. Never returns an error:
    /// every failure mode degrades to `PartialFailure` or `Fatal`.
    pub async fn detect(&self, image: &[u8]) -> DetectionOutcome {
        let temp = match tempfile::Builder::new()
            .prefix("inspection-")
            .suffix(".jpg")
            .tempfile()
        {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(error = %e, "Failed to allocate temp file for detection");
                return DetectionOutcome::Fatal(format!("temp file allocation failed: {}", e));
            }
        };
        if let Err(e) = tokio::fs::write(temp.path(), image).await {
            tracing::error!(error = %e, "Failed to write detection input");
            return DetectionOutcome::Fatal(format!("temp file write failed: {}", e));
        }

        let script = self.resolve_script();
        tracing::debug!(
            python = %self.python_exec,
            script = %script.display(),
            input = %temp.path().display(),
            "Invoking anomaly detector"
        );

        let child = Command::new(&self.python_exec)
            .arg(&script)
            .arg("--image")
            .arg(temp.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("detector spawn failed: {}", e);
                return self.preserve_and_degrade(temp.path(), "failed", reason).await;
            }
        };

        // On timeout the future is cancelled, the Child is dropped, and
        // kill_on_drop sends SIGKILL to the detector process.
        let output = match self.config.timeout {
            Some(ceiling) => {
                match tokio::time::timeout(ceiling, child.wait_with_output()).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            timeout_sec = ceiling.as_secs(),
                            "Detector timeout, process killed via kill_on_drop"
                        );
                        let reason =
                            format!("detector timed out after {}s", ceiling.as_secs());
                        return self
                            .preserve_and_degrade(temp.path(), "failed", reason)
                            .await;
                    }
                }
            }
            None => child.wait_with_output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                let reason = format!("detector execution failed: {}", e);
                return self.preserve_and_degrade(temp.path(), "failed", reason).await;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = if stderr.trim().is_empty() {
                format!("detector exited with status {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            return self.preserve_and_degrade(temp.path(), "failed", reason).await;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match extract_json_payload(&stdout) {
            Some(payload) => match parse_anomalies(payload) {
                Ok(anomalies) => {
                    tracing::info!(count = anomalies.len(), "Detection completed");
                    // temp file deleted on drop
                    DetectionOutcome::Success(anomalies)
                }
                Err(e) => {
                    let reason = format!("detector output parse failed: {}", e);
                    self.preserve_and_degrade(temp.path(), "failed_parse", reason)
                        .await
                }
            },
            None => {
                let reason = "detector stdout contained no JSON payload".to_string();
                self.preserve_and_degrade(temp.path(), "failed_parse", reason)
                    .await
            }
        }
    }

    /// Copy the failing input into the failed-detections directory
    /// before the temp file is dropped. A failed copy degrades further
    /// to `Fatal` rather than crashing.
    async fn preserve_and_degrade(
        &self,
        input: &Path,
        prefix: &str,
        reason: String,
    ) -> DetectionOutcome {
        tracing::warn!(reason = %reason, "Detection failed, preserving input image");

        if let Err(e) = tokio::fs::create_dir_all(&self.config.failed_dir).await {
            tracing::error!(error = %e, "Failed to create failed-detections directory");
            return DetectionOutcome::Fatal(reason);
        }

        // Millisecond timestamps keep concurrent writers apart
        let name = format!("{}_{}.jpg", prefix, Utc::now().timestamp_millis());
        let preserved = self.config.failed_dir.join(name);

        match tokio::fs::copy(input, &preserved).await {
            Ok(_) => {
                tracing::info!(path = %preserved.display(), "Preserved failing detection input");
                DetectionOutcome::PartialFailure {
                    reason,
                    preserved: Some(preserved),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to preserve detection input");
                DetectionOutcome::Fatal(reason)
            }
        }
    }

    fn resolve_script(&self) -> PathBuf {
        for candidate in &self.config.script_candidates {
            if candidate.exists() {
                return candidate.clone();
            }
        }
        // Best-effort: last candidate even if it does not exist
        self.config
            .script_candidates
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("python/anomaly_detection.py"))
    }
}

/// Executable resolution order: explicit config, then environment
/// override, then the hard-coded default.
fn resolve_python_exec(explicit: Option<&str>, env_override: Option<&str>) -> String {
    if let Some(exec) = explicit.filter(|s| !s.trim().is_empty()) {
        return exec.to_string();
    }
    if let Some(exec) = env_override.filter(|s| !s.trim().is_empty()) {
        return exec.to_string();
    }
    "python3".to_string()
}

/// Slice stdout from the first `[` or `{`, whichever appears earlier.
/// Log lines printed before the payload are discarded.
fn extract_json_payload(stdout: &str) -> Option<&str> {
    let array_start = stdout.find('[');
    let object_start = stdout.find('{');
    let start = match (array_start, object_start) {
        (Some(a), Some(o)) => a.min(o),
        (Some(a), None) => a,
        (None, Some(o)) => o,
        (None, None) => return None,
    };
    Some(stdout[start..].trim_end())
}

/// Decode the payload: a bare array decodes directly; an object decodes
/// its `anomalies` field, absent meaning zero anomalies.
fn parse_anomalies(payload: &str) -> serde_json::Result<Vec<Anomaly>> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    match value {
        serde_json::Value::Array(_) => serde_json::from_value(value),
        serde_json::Value::Object(mut map) => match map.remove("anomalies") {
            Some(anomalies) => serde_json::from_value(anomalies),
            None => Ok(Vec::new()),
        },
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_python_exec_resolution_order() {
        assert_eq!(
            resolve_python_exec(Some("/usr/bin/python3.10"), Some("/opt/py")),
            "/usr/bin/python3.10"
        );
        assert_eq!(resolve_python_exec(None, Some("/opt/py")), "/opt/py");
        assert_eq!(resolve_python_exec(Some("  "), None), "python3");
        assert_eq!(resolve_python_exec(None, None), "python3");
    }

    #[test]
    fn test_extract_payload_skips_log_lines() {
        let stdout = "loading model\nwarmup done\n[{\"class\":\"hotspot\"}]";
        assert_eq!(
            extract_json_payload(stdout),
            Some("[{\"class\":\"hotspot\"}]")
        );
    }

    #[test]
    fn test_extract_payload_prefers_earlier_token() {
        assert_eq!(
            extract_json_payload("{\"anomalies\":[]}"),
            Some("{\"anomalies\":[]}")
        );
        // The array token comes first even though an object follows
        assert_eq!(
            extract_json_payload("log [1] then {\"x\":2}"),
            Some("[1] then {\"x\":2}")
        );
    }

    #[test]
    fn test_extract_payload_none_without_json() {
        assert_eq!(extract_json_payload("no json here\njust logs"), None);
        assert_eq!(extract_json_payload(""), None);
    }

    #[test]
    fn test_parse_bare_array() {
        let anomalies =
            parse_anomalies(r#"[{"class":"hotspot","confidence":0.9,"box":[1,2,3,4]}]"#).unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].class_name, "hotspot");
        assert_eq!(anomalies[0].confidence, 0.9);
        assert_eq!(anomalies[0].box_coords, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_parse_object_with_anomalies_field() {
        let anomalies = parse_anomalies(
            r#"{"anomalies":[{"class":"loose-joint","confidence":0.5,"box":[0,0,1,1]}]}"#,
        )
        .unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].class_name, "loose-joint");
    }

    #[test]
    fn test_parse_object_without_anomalies_field() {
        let anomalies = parse_anomalies(r#"{"status":"ok"}"#).unwrap();
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_parse_malformed_payload_errors() {
        assert!(parse_anomalies("[{\"class\":").is_err());
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("detector.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{}", body).unwrap();
        path
    }

    fn detector_with_script(dir: &Path, body: &str) -> AnomalyDetector {
        let script = write_script(dir, body);
        AnomalyDetector::new(DetectorConfig {
            python_exec: Some("sh".to_string()),
            script_candidates: vec![script],
            failed_dir: dir.join("failed-detections"),
            timeout: Some(Duration::from_secs(10)),
        })
    }

    #[tokio::test]
    async fn test_detect_parses_stdout_after_log_line() {
        let dir = tempfile::tempdir().unwrap();
        let detector = detector_with_script(
            dir.path(),
            r#"echo 'logline'; echo '[{"class":"hotspot","confidence":0.9,"box":[1,2,3,4]}]'"#,
        );

        match detector.detect(b"fake image bytes").await {
            DetectionOutcome::Success(anomalies) => {
                assert_eq!(anomalies.len(), 1);
                assert_eq!(anomalies[0].class_name, "hotspot");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_nonzero_exit_preserves_input() {
        let dir = tempfile::tempdir().unwrap();
        let detector =
            detector_with_script(dir.path(), "echo 'model load failed' >&2; exit 1");

        match detector.detect(b"fake image bytes").await {
            DetectionOutcome::PartialFailure { reason, preserved } => {
                assert!(reason.contains("model load failed"));
                let preserved = preserved.expect("input should be preserved");
                assert!(preserved.exists());
                assert_eq!(std::fs::read(&preserved).unwrap(), b"fake image bytes");
                let name = preserved.file_name().unwrap().to_string_lossy().to_string();
                assert!(name.starts_with("failed_"));
                assert!(!name.starts_with("failed_parse_"));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_non_json_stdout_preserves_as_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let detector = detector_with_script(dir.path(), "echo 'all good, no payload'");

        match detector.detect(b"fake image bytes").await {
            DetectionOutcome::PartialFailure { preserved, .. } => {
                let name = preserved
                    .expect("input should be preserved")
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .to_string();
                assert!(name.starts_with("failed_parse_"));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_timeout_is_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "sleep 30");
        let detector = AnomalyDetector::new(DetectorConfig {
            python_exec: Some("sh".to_string()),
            script_candidates: vec![script],
            failed_dir: dir.path().join("failed-detections"),
            timeout: Some(Duration::from_millis(200)),
        });

        match detector.detect(b"fake image bytes").await {
            DetectionOutcome::PartialFailure { reason, .. } => {
                assert!(reason.contains("timed out"));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[test]
    fn test_script_resolution_falls_back_to_last_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let missing_a = dir.path().join("a.py");
        let missing_b = dir.path().join("b.py");
        let detector = AnomalyDetector::new(DetectorConfig {
            python_exec: Some("python3".to_string()),
            script_candidates: vec![missing_a, missing_b.clone()],
            failed_dir: dir.path().join("failed-detections"),
            timeout: None,
        });
        assert_eq!(detector.resolve_script(), missing_b);
    }
}
