use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use ocrbench_core::{MathRenderer, RenderError};

/// Per-expression render timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type Engine = fn(&str) -> Result<String, RenderError>;

struct Request {
    latex: String,
    reply: mpsc::Sender<Result<String, RenderError>>,
}

struct Worker {
    requests: mpsc::Sender<Request>,
    handle: JoinHandle<()>,
    /// A render timed out; the thread may never return.
    stuck: bool,
}

/// KaTeX running in an embedded JS engine on a dedicated worker thread.
///
/// The engine keeps its state in thread-local storage, so all rendering goes
/// through one long-lived thread. Callers take turns: the worker lock is held
/// for a whole request, so the timeout only runs while that expression is
/// being rendered. A worker that times out is abandoned and replaced by
/// [`restart`](MathRenderer::restart); it cannot be killed.
pub struct KatexRenderer {
    timeout: Duration,
    engine: Engine,
    worker: Mutex<Option<Worker>>,
    generation: AtomicU64,
}

impl Default for KatexRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl KatexRenderer {
    pub fn new(timeout: Duration) -> Self {
        Self::with_engine(timeout, render_katex)
    }

    fn with_engine(timeout: Duration, engine: Engine) -> Self {
        Self {
            timeout,
            engine,
            worker: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn spawn_worker(&self) -> Result<Worker, RenderError> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (requests, rx) = mpsc::channel::<Request>();
        let engine = self.engine;
        let handle = std::thread::Builder::new()
            .name(format!("katex-{generation}"))
            .spawn(move || worker_loop(rx, engine))
            .map_err(|e| RenderError::Unavailable(format!("cannot spawn katex worker: {e}")))?;
        tracing::debug!(generation, "katex worker spawned");
        Ok(Worker {
            requests,
            handle,
            stuck: false,
        })
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MathRenderer for KatexRenderer {
    fn name(&self) -> &str {
        "katex"
    }

    fn start(&self) -> Result<(), RenderError> {
        // A throwaway render loads the KaTeX bundle into the engine.
        match self.render_mathml("x") {
            Ok(_) => Ok(()),
            Err(e) => Err(RenderError::Unavailable(format!("katex failed to start: {e}"))),
        }
    }

    fn render_mathml(&self, latex: &str) -> Result<String, RenderError> {
        let mut guard = self.lock_worker();
        if guard.is_none() {
            *guard = Some(self.spawn_worker()?);
        }
        let Some(worker) = guard.as_mut() else {
            return Err(RenderError::Crashed("katex worker missing".to_string()));
        };
        if worker.stuck {
            return Err(RenderError::Crashed("katex worker is stuck".to_string()));
        }

        let (reply, rx) = mpsc::channel();
        let request = Request {
            latex: latex.to_string(),
            reply,
        };
        worker
            .requests
            .send(request)
            .map_err(|_| RenderError::Crashed("katex worker has exited".to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                worker.stuck = true;
                Err(RenderError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(RenderError::Crashed("katex worker exited mid-render".to_string()))
            }
        }
    }

    fn restart(&self) -> Result<(), RenderError> {
        let fresh = self.spawn_worker()?;
        let old = self.lock_worker().replace(fresh);
        if let Some(old) = old {
            tracing::warn!(stuck = old.stuck, "replacing katex worker");
            // Dropping the sender lets an idle worker exit; a stuck one is left detached.
            drop(old.requests);
            if !old.stuck {
                let _ = old.handle.join();
            }
        }
        Ok(())
    }
}

impl Drop for KatexRenderer {
    fn drop(&mut self) {
        let worker = self.worker.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            drop(worker.requests);
            if !worker.stuck {
                let _ = worker.handle.join();
            }
        }
    }
}

fn mathml_opts() -> Result<katex::Opts, RenderError> {
    katex::Opts::builder()
        .display_mode(true)
        .output_type(katex::OutputType::Mathml)
        .throw_on_error(true)
        .build()
        .map_err(|e| RenderError::Unavailable(format!("invalid katex options: {e}")))
}

fn classify(error: katex::Error) -> RenderError {
    let message = error.to_string();
    if message.to_lowercase().contains("parse error") {
        RenderError::InvalidLatex(message)
    } else {
        RenderError::Crashed(message)
    }
}

fn render_katex(latex: &str) -> Result<String, RenderError> {
    thread_local! {
        static OPTS: Result<katex::Opts, RenderError> = mathml_opts();
    }
    OPTS.with(|opts| {
        let opts = opts.as_ref().map_err(Clone::clone)?;
        katex::render_with_opts(latex, opts).map_err(classify)
    })
}

fn worker_loop(requests: mpsc::Receiver<Request>, engine: Engine) {
    for request in requests {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| engine(&request.latex)))
            .unwrap_or_else(|_| Err(RenderError::Crashed("katex panicked".to_string())));
        let _ = request.reply.send(result);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    fn slow_engine(latex: &str) -> Result<String, RenderError> {
        match latex {
            "slow" => {
                std::thread::sleep(Duration::from_millis(300));
                Ok("<math>slow</math>".to_string())
            }
            "hang" => {
                std::thread::sleep(Duration::from_secs(3));
                Ok(String::new())
            }
            "panic" => panic!("engine blew up"),
            other => Ok(format!("<math>{other}</math>")),
        }
    }

    #[test]
    fn test_queued_requests_do_not_time_out() {
        // Three 300ms renders queue for 900ms, each well inside its own 1s budget.
        let renderer = Arc::new(KatexRenderer::with_engine(
            Duration::from_millis(1000),
            slow_engine,
        ));
        let started = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let r = renderer.clone();
                std::thread::spawn(move || r.render_mathml("slow"))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().unwrap(), "<math>slow</math>");
        }
        assert!(started.elapsed() >= Duration::from_millis(900));
    }

    #[test]
    fn test_timeout_marks_worker_until_restart() {
        let renderer = KatexRenderer::with_engine(Duration::from_millis(100), slow_engine);
        assert!(matches!(renderer.render_mathml("hang"), Err(RenderError::Timeout(_))));
        assert!(matches!(renderer.render_mathml("x"), Err(RenderError::Crashed(_))));

        renderer.restart().unwrap();
        assert_eq!(renderer.render_mathml("x").unwrap(), "<math>x</math>");
    }

    #[test]
    fn test_panic_is_reported_as_crash() {
        let renderer = KatexRenderer::with_engine(Duration::from_secs(1), slow_engine);
        assert!(matches!(renderer.render_mathml("panic"), Err(RenderError::Crashed(_))));
        assert_eq!(renderer.render_mathml("y").unwrap(), "<math>y</math>");
    }
}
