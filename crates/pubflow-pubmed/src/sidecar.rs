//! Classifier sidecar process
//!
//! The relevance model lives in a separate process. We talk to it over its
//! stdin/stdout, one JSON object per line in each direction:
//!
//! ```text
//! -> {"op":"predict","threshold":0.99,"documents":[{...}, ...]}
//! <- {"predictions":[{"classification":1,"probability":0.997}, ...]}
//! -> {"op":"explain","threshold":0.99,"documents":[...]}
//! <- {"explanations":[{"classification":1,"probability":0.997,"sentences":[{"text":"...","score":0.4}]}]}
//! <- {"error":"message"}
//! ```
//!
//! The process's stderr is forwarded to the log at debug level.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::Result;
use pubflow_core::Record;
use serde::{Deserialize, Serialize};

use crate::classify::{Classifier, Explanation, Prediction, Sentence};

/// How long a sidecar gets to exit after stdin closes before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);
const EXIT_POLL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub enum SidecarError {
    Spawn {
        command: String,
        source: std::io::Error,
    },
    Io(std::io::Error),
    /// Malformed or unexpected response line
    Protocol(String),
    /// The sidecar reported an error
    Remote(String),
    CountMismatch {
        expected: usize,
        got: usize,
    },
}

impl std::fmt::Display for SidecarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn { command, source } => {
                write!(f, "failed to start classifier '{command}': {source}")
            }
            Self::Io(e) => write!(f, "classifier I/O error: {e}"),
            Self::Protocol(msg) => write!(f, "classifier protocol error: {msg}"),
            Self::Remote(msg) => write!(f, "classifier error: {msg}"),
            Self::CountMismatch { expected, got } => {
                write!(f, "classifier returned {got} results for {expected} documents")
            }
        }
    }
}

impl std::error::Error for SidecarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SidecarError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    op: &'static str,
    threshold: f64,
    documents: &'a [Record],
}

#[derive(Debug, Deserialize)]
struct Verdict {
    classification: u8,
    probability: f64,
    #[serde(default)]
    sentences: Vec<Sentence>,
}

#[derive(Debug, Default, Deserialize)]
struct Response {
    #[serde(default)]
    predictions: Option<Vec<Verdict>>,
    #[serde(default)]
    explanations: Option<Vec<Verdict>>,
    #[serde(default)]
    error: Option<String>,
}

/// Classifier backed by a long-running child process.
pub struct SidecarClassifier {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    threshold: f64,
}

impl SidecarClassifier {
    /// Start `command args...`. Documents scoring at or above `threshold`
    /// are classified positive by the sidecar.
    pub fn spawn(command: &str, args: &[String], threshold: f64) -> Result<Self, SidecarError> {
        log::info!("Starting classifier: {command} {}", args.join(" "));
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SidecarError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if let Some(stderr) = child.stderr.take() {
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    log::debug!(target: "sidecar::stderr", "{line}");
                }
            });
        }

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SidecarError::Protocol("child pipes unavailable".into()));
        };

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            threshold,
        })
    }

    fn call(&mut self, op: &'static str, documents: &[Record]) -> Result<Vec<Verdict>, SidecarError> {
        let request = Request {
            op,
            threshold: self.threshold,
            documents,
        };
        let line = serde_json::to_string(&request)
            .map_err(|e| SidecarError::Protocol(format!("encode request: {e}")))?;

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SidecarError::Protocol("stdin closed".into()))?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;

        let mut reply = String::new();
        if self.stdout.read_line(&mut reply)? == 0 {
            return Err(SidecarError::Protocol("classifier closed its output".into()));
        }

        decode(op, &reply, documents.len())
    }
}

fn decode(op: &str, reply: &str, expected: usize) -> Result<Vec<Verdict>, SidecarError> {
    let response: Response = serde_json::from_str(reply.trim())
        .map_err(|e| SidecarError::Protocol(format!("decode response: {e}")))?;
    if let Some(message) = response.error {
        return Err(SidecarError::Remote(message));
    }

    let verdicts = match op {
        "explain" => response.explanations,
        _ => response.predictions,
    }
    .ok_or_else(|| SidecarError::Protocol(format!("response has no {op} results")))?;

    if verdicts.len() != expected {
        return Err(SidecarError::CountMismatch {
            expected,
            got: verdicts.len(),
        });
    }
    for v in &verdicts {
        if v.classification > 1 || !(0.0..=1.0).contains(&v.probability) {
            return Err(SidecarError::Protocol(format!(
                "invalid verdict: classification={} probability={}",
                v.classification, v.probability
            )));
        }
    }
    Ok(verdicts)
}

impl Classifier for SidecarClassifier {
    fn predict(&mut self, documents: Vec<Record>) -> Result<Vec<Prediction>> {
        let verdicts = self.call("predict", &documents)?;
        Ok(documents
            .into_iter()
            .zip(verdicts)
            .map(|(document, v)| Prediction {
                document,
                classification: v.classification,
                probability: v.probability,
            })
            .collect())
    }

    fn explain(&mut self, documents: Vec<Record>) -> Result<Vec<Explanation>> {
        let verdicts = self.call("explain", &documents)?;
        Ok(documents
            .into_iter()
            .zip(verdicts)
            .map(|(document, v)| Explanation {
                document,
                classification: v.classification,
                probability: v.probability,
                sentences: v.sentences,
            })
            .collect())
    }
}

impl SidecarClassifier {
    /// Close stdin and wait up to `grace` for the process to exit on its
    /// own; kill it after that. Returns the exit status when one was reaped.
    fn shutdown(&mut self, grace: Duration) -> Option<ExitStatus> {
        // EOF on stdin asks the sidecar to exit
        drop(self.stdin.take());
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!("Classifier exited: {status}");
                    return Some(status);
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(EXIT_POLL),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Failed to poll classifier: {e}");
                    break;
                }
            }
        }
        log::warn!("Classifier did not exit within {grace:?}; killing it");
        let _ = self.child.kill();
        self.child.wait().ok()
    }
}

impl Drop for SidecarClassifier {
    fn drop(&mut self) {
        self.shutdown(EXIT_GRACE);
    }
}
