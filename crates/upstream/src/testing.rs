//! Scripted transport for tests.
//!
//! Replays a fixed sequence of responses (repeating the last one once the
//! script runs out) or answers through a closure, and counts every call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::models::{RetryAfter, UpstreamRequest, UpstreamResponse};
use crate::transport::{HttpTransport, TransportError};

/// One scripted reaction to a request.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Respond {
        response: UpstreamResponse,
        delay: Duration,
    },
    Fail {
        error: TransportError,
        delay: Duration,
    },
    /// Never answers; exercises the attempt timeout.
    Hang,
}

impl ScriptStep {
    pub fn ok(body: &str) -> Self {
        Self::respond(UpstreamResponse::new(200, body))
    }

    pub fn status(status: u16) -> Self {
        Self::respond(UpstreamResponse::new(status, format!("status {}", status)))
    }

    pub fn throttled(retry_after_secs: Option<u64>) -> Self {
        let mut response = UpstreamResponse::new(429, "rate limited");
        if let Some(secs) = retry_after_secs {
            response = response.with_retry_after(RetryAfter::Delay(Duration::from_secs(secs)));
        }
        Self::respond(response)
    }

    pub fn fail(error: TransportError) -> Self {
        Self::Fail {
            error,
            delay: Duration::ZERO,
        }
    }

    pub fn respond(response: UpstreamResponse) -> Self {
        Self::Respond {
            response,
            delay: Duration::ZERO,
        }
    }

    /// Delay the reaction, e.g. to keep a request in flight.
    pub fn after(self, wait: Duration) -> Self {
        match self {
            Self::Respond { response, .. } => Self::Respond {
                response,
                delay: wait,
            },
            Self::Fail { error, .. } => Self::Fail { error, delay: wait },
            Self::Hang => Self::Hang,
        }
    }
}

type Responder = Box<dyn Fn(&UpstreamRequest) -> ScriptStep + Send + Sync>;

enum Script {
    Sequence {
        steps: VecDeque<ScriptStep>,
        last: Option<ScriptStep>,
    },
    Responder(Responder),
}

/// [`HttpTransport`] driven by a script.
pub struct ScriptedTransport {
    script: Mutex<Script>,
    calls: AtomicUsize,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<ScriptStep>) -> Arc<Self> {
        Arc::new(Self::with_script(Script::Sequence {
            steps: steps.into(),
            last: None,
        }))
    }

    pub fn always(step: ScriptStep) -> Arc<Self> {
        Self::new(vec![step])
    }

    pub fn from_fn<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&UpstreamRequest) -> ScriptStep + Send + Sync + 'static,
    {
        Arc::new(Self::with_script(Script::Responder(Box::new(responder))))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replace the remaining script.
    pub fn set_steps(&self, steps: Vec<ScriptStep>) {
        *self.script.lock().unwrap() = Script::Sequence {
            steps: steps.into(),
            last: None,
        };
    }

    /// Number of requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self, request: &UpstreamRequest) -> ScriptStep {
        let mut script = self.script.lock().unwrap();
        match &mut *script {
            Script::Sequence { steps, last } => {
                if let Some(step) = steps.pop_front() {
                    *last = Some(step.clone());
                    step
                } else {
                    last.clone()
                        .unwrap_or_else(|| ScriptStep::status(599))
                }
            }
            Script::Responder(responder) => responder(request),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        match self.next_step(request) {
            ScriptStep::Respond { response, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(response)
            }
            ScriptStep::Fail { error, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(error)
            }
            ScriptStep::Hang => {
                futures::future::pending::<()>().await;
                Err(TransportError::Other("unreachable".to_string()))
            }
        }
    }
}
