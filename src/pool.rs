//! Worker pool: runs mesh builds on a fixed set of worker threads. The
//! coordinator keeps at most one build in flight per worker (requests are
//! serialised per worker, parallel across workers), owns the overflow
//! queue, and enforces the per-build deadline. Terrain snapshots move into
//! a worker with the request; mesh buffers move back with the response.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::build_wave_mesh;
use crate::config::Params;
use crate::error::BuildError;
use crate::mesh::MeshData;
use crate::terrain::TerrainData;
use crate::{BuildStats, WaveSource};

/// Hard ceiling on pool size regardless of core count.
pub const MAX_WORKERS: usize = 4;

const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which builder a request runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderKind {
    /// The wavefront-marching mesh builder.
    Marching,
    /// Test hook: stall before building.
    #[cfg(test)]
    Sleep(u64),
    /// Test hook: die mid-build.
    #[cfg(test)]
    Panic,
}

/// One build request. The terrain snapshot is owned by the request and
/// moves into the worker.
#[derive(Debug)]
pub struct BuildRequest {
    pub request_id: u64,
    pub source: WaveSource,
    pub terrain: TerrainData,
    pub tide_height: f32,
    pub builder: BuilderKind,
    pub params: Params,
}

/// Pool responses; mesh buffers transfer to the caller by move.
#[derive(Debug)]
pub enum PoolResponse {
    Result {
        request_id: u64,
        mesh: MeshData,
        stats: BuildStats,
        build_time_ms: f64,
    },
    Error {
        request_id: u64,
        error: BuildError,
    },
}

impl PoolResponse {
    pub fn request_id(&self) -> u64 {
        match self {
            PoolResponse::Result { request_id, .. } => *request_id,
            PoolResponse::Error { request_id, .. } => *request_id,
        }
    }
}

/// Pool sizing and deadlines; defaults match the production contract.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub workers: usize,
    pub build_timeout: Duration,
    pub init_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            init_timeout: DEFAULT_INIT_TIMEOUT,
        }
    }
}

/// min(MAX_WORKERS, cores - 1), at least one.
pub fn default_worker_count() -> usize {
    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    cores.saturating_sub(1).clamp(1, MAX_WORKERS)
}

enum WorkerMsg {
    Build(Box<BuildRequest>),
    Shutdown,
}

enum Envelope {
    Ready { token: u64 },
    Done { token: u64, response: PoolResponse },
}

struct Worker {
    token: u64,
    tx: Sender<WorkerMsg>,
    handle: Option<thread::JoinHandle<()>>,
    /// In-flight request and its deadline; None when idle.
    busy: Option<(u64, Instant)>,
}

/// The process-wide pool. `initialize` and `terminate` bracket its life;
/// there is no other global state in the core.
pub struct WorkerPool {
    workers: Vec<Worker>,
    resp_tx: Sender<Envelope>,
    resp_rx: Receiver<Envelope>,
    queue: VecDeque<Box<BuildRequest>>,
    /// Responses set aside while a caller waits on a specific request.
    stash: VecDeque<PoolResponse>,
    config: PoolConfig,
    next_token: u64,
}

impl WorkerPool {
    /// Spawn the workers and wait for every ready handshake.
    pub fn initialize(config: PoolConfig) -> Result<Self, BuildError> {
        let (resp_tx, resp_rx) = unbounded();
        let mut pool = Self {
            workers: Vec::with_capacity(config.workers),
            resp_tx,
            resp_rx,
            queue: VecDeque::new(),
            stash: VecDeque::new(),
            config,
            next_token: 0,
        };
        for _ in 0..pool.config.workers.max(1) {
            let worker = pool.spawn_worker();
            pool.workers.push(worker);
        }

        let deadline = Instant::now() + pool.config.init_timeout;
        let mut ready = 0;
        while ready < pool.workers.len() {
            match pool.resp_rx.recv_deadline(deadline) {
                Ok(Envelope::Ready { .. }) => ready += 1,
                Ok(Envelope::Done { .. }) => {}
                Err(_) => {
                    return Err(BuildError::WorkerCrashed(format!(
                        "{} of {} workers failed to initialise within {:?}",
                        pool.workers.len() - ready,
                        pool.workers.len(),
                        pool.config.init_timeout
                    )));
                }
            }
        }
        Ok(pool)
    }

    fn spawn_worker(&mut self) -> Worker {
        let token = self.next_token;
        self.next_token += 1;
        let (tx, rx) = unbounded::<WorkerMsg>();
        let resp_tx = self.resp_tx.clone();
        let handle = thread::Builder::new()
            .name(format!("wavemesh-worker-{token}"))
            .spawn(move || worker_loop(token, rx, resp_tx))
            .expect("failed to spawn worker thread");
        Worker {
            token,
            tx,
            handle: Some(handle),
            busy: None,
        }
    }

    /// Queue a build; it starts as soon as a worker is idle.
    pub fn submit(&mut self, request: BuildRequest) {
        self.queue.push_back(Box::new(request));
        self.pump();
    }

    /// Hand queued requests to idle workers, one in flight per worker.
    fn pump(&mut self) {
        let deadline = self.config.build_timeout;
        for worker in &mut self.workers {
            if worker.busy.is_some() {
                continue;
            }
            let Some(request) = self.queue.pop_front() else {
                break;
            };
            worker.busy = Some((request.request_id, Instant::now() + deadline));
            if worker.tx.send(WorkerMsg::Build(request)).is_err() {
                // Worker thread is gone; the deadline sweep will replace it
                // and fail the request.
                log::warn!("worker {} rejected a request; channel closed", worker.token);
            }
        }
    }

    /// True while any request is queued or in flight.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty() || self.workers.iter().any(|w| w.busy.is_some())
    }

    /// Block for the next response or deadline expiry. Returns None when
    /// nothing is pending.
    pub fn next_response(&mut self) -> Option<PoolResponse> {
        loop {
            if let Some(stashed) = self.stash.pop_front() {
                return Some(stashed);
            }
            if !self.has_pending() {
                return None;
            }
            let deadline = self
                .workers
                .iter()
                .filter_map(|w| w.busy.map(|(_, d)| d))
                .min()
                .unwrap_or_else(|| Instant::now() + self.config.build_timeout);

            match self.resp_rx.recv_deadline(deadline) {
                Ok(Envelope::Ready { .. }) => {}
                Ok(Envelope::Done { token, response }) => {
                    let Some(worker) = self.workers.iter_mut().find(|w| w.token == token) else {
                        // A replaced worker finishing late; its request was
                        // already failed.
                        continue;
                    };
                    worker.busy = None;
                    self.pump();
                    return Some(response);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let Some(idx) = self
                        .workers
                        .iter()
                        .position(|w| matches!(w.busy, Some((_, d)) if d <= now))
                    else {
                        continue;
                    };
                    let (request_id, _) = self.workers[idx].busy.take().unwrap();
                    log::warn!(
                        "build {} exceeded {:?}; replacing worker {}",
                        request_id,
                        self.config.build_timeout,
                        self.workers[idx].token
                    );
                    let replacement = self.spawn_worker();
                    let old = std::mem::replace(&mut self.workers[idx], replacement);
                    let _ = old.tx.send(WorkerMsg::Shutdown);
                    drop(old); // detach; a stale Done is discarded by token
                    self.pump();
                    return Some(PoolResponse::Error {
                        request_id,
                        error: BuildError::BudgetExceeded(format!(
                            "build did not finish within {:?}",
                            self.config.build_timeout
                        )),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Submit one request and block until its response arrives; responses
    /// for other requests stay queued for later `next_response` calls.
    pub fn build(&mut self, request: BuildRequest) -> PoolResponse {
        let id = request.request_id;
        self.submit(request);
        let mut aside = VecDeque::new();
        let response = loop {
            match self.next_response() {
                Some(r) if r.request_id() == id => break r,
                Some(r) => aside.push_back(r),
                None => {
                    break PoolResponse::Error {
                        request_id: id,
                        error: BuildError::WorkerCrashed("pool drained unexpectedly".into()),
                    }
                }
            }
        };
        self.stash.extend(aside);
        response
    }

    /// Shut every worker down and join them.
    pub fn terminate(mut self) {
        for worker in &mut self.workers {
            let _ = worker.tx.send(WorkerMsg::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(token: u64, rx: Receiver<WorkerMsg>, resp_tx: Sender<Envelope>) {
    if resp_tx.send(Envelope::Ready { token }).is_err() {
        return;
    }
    while let Ok(msg) = rx.recv() {
        match msg {
            WorkerMsg::Build(request) => {
                let start = Instant::now();
                let request_id = request.request_id;
                let outcome = catch_unwind(AssertUnwindSafe(|| run_builder(&request)));
                let response = match outcome {
                    Ok(Ok((mesh, stats))) => PoolResponse::Result {
                        request_id,
                        mesh,
                        stats,
                        build_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                    },
                    Ok(Err(error)) => PoolResponse::Error { request_id, error },
                    Err(panic) => {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "worker panicked".into());
                        PoolResponse::Error {
                            request_id,
                            error: BuildError::WorkerCrashed(message),
                        }
                    }
                };
                if resp_tx.send(Envelope::Done { token, response }).is_err() {
                    break;
                }
            }
            WorkerMsg::Shutdown => break,
        }
    }
}

fn run_builder(request: &BuildRequest) -> Result<(MeshData, BuildStats), BuildError> {
    match request.builder {
        BuilderKind::Marching => build_wave_mesh(
            &request.source,
            &request.terrain,
            request.tide_height,
            &request.params,
        ),
        #[cfg(test)]
        BuilderKind::Sleep(millis) => {
            thread::sleep(Duration::from_millis(millis));
            build_wave_mesh(
                &request.source,
                &request.terrain,
                request.tide_height,
                &request.params,
            )
        }
        #[cfg(test)]
        BuilderKind::Panic => panic!("injected worker failure"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios;

    fn request(id: u64, builder: BuilderKind) -> BuildRequest {
        BuildRequest {
            request_id: id,
            source: WaveSource {
                amplitude: 1.0,
                wavelength: 60.0,
                direction: 0.0,
                phase_offset: 0.0,
            },
            terrain: scenarios::open_ocean(),
            tide_height: 0.0,
            builder,
            params: Params {
                vertex_spacing: 100.0,
                ..Params::default()
            },
        }
    }

    fn test_config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            build_timeout: Duration::from_secs(20),
            init_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn worker_count_respects_the_cap() {
        let n = default_worker_count();
        assert!(n >= 1 && n <= MAX_WORKERS);
    }

    #[test]
    fn pool_builds_and_returns_meshes() {
        let mut pool = WorkerPool::initialize(test_config(2)).unwrap();
        for id in [7, 8, 9] {
            pool.submit(request(id, BuilderKind::Marching));
        }
        let mut seen = Vec::new();
        while let Some(response) = pool.next_response() {
            match response {
                PoolResponse::Result {
                    request_id,
                    mesh,
                    build_time_ms,
                    ..
                } => {
                    assert!(mesh.vertex_count > 0);
                    assert!(build_time_ms >= 0.0);
                    seen.push(request_id);
                }
                PoolResponse::Error { request_id, error } => {
                    panic!("request {request_id} failed: {error}");
                }
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, [7, 8, 9]);
        pool.terminate();
    }

    #[test]
    fn build_errors_propagate_per_request() {
        let mut pool = WorkerPool::initialize(test_config(1)).unwrap();
        let mut bad = request(1, BuilderKind::Marching);
        bad.source.wavelength = -5.0;
        match pool.build(bad) {
            PoolResponse::Error { request_id, error } => {
                assert_eq!(request_id, 1);
                assert!(matches!(error, BuildError::NumericDegenerate(_)));
            }
            PoolResponse::Result { .. } => panic!("invalid build succeeded"),
        }
        // The worker is still healthy.
        match pool.build(request(2, BuilderKind::Marching)) {
            PoolResponse::Result { request_id, .. } => assert_eq!(request_id, 2),
            PoolResponse::Error { error, .. } => panic!("healthy build failed: {error}"),
        }
        pool.terminate();
    }

    #[test]
    fn panicking_build_fails_only_its_own_request() {
        let mut pool = WorkerPool::initialize(test_config(1)).unwrap();
        match pool.build(request(1, BuilderKind::Panic)) {
            PoolResponse::Error { error, .. } => {
                assert!(matches!(error, BuildError::WorkerCrashed(_)));
            }
            PoolResponse::Result { .. } => panic!("panicking build succeeded"),
        }
        match pool.build(request(2, BuilderKind::Marching)) {
            PoolResponse::Result { request_id, .. } => assert_eq!(request_id, 2),
            PoolResponse::Error { error, .. } => panic!("follow-up failed: {error}"),
        }
        pool.terminate();
    }

    #[test]
    fn slow_build_times_out_while_others_complete() {
        let config = PoolConfig {
            workers: 2,
            build_timeout: Duration::from_millis(250),
            init_timeout: Duration::from_secs(5),
        };
        let mut pool = WorkerPool::initialize(config).unwrap();
        pool.submit(request(1, BuilderKind::Sleep(4000)));
        // Coarse resolution so the healthy build finishes well inside the
        // tightened deadline.
        let mut quick = request(2, BuilderKind::Marching);
        quick.params.vertex_spacing = 500.0;
        quick.params.step_size = 100.0;
        pool.submit(quick);

        let mut timed_out = false;
        let mut completed = false;
        while let Some(response) = pool.next_response() {
            match response {
                PoolResponse::Error { request_id, error } => {
                    assert_eq!(request_id, 1);
                    assert!(matches!(error, BuildError::BudgetExceeded(_)), "{error}");
                    timed_out = true;
                }
                PoolResponse::Result { request_id, .. } => {
                    assert_eq!(request_id, 2);
                    completed = true;
                }
            }
        }
        assert!(timed_out, "slow build never timed out");
        assert!(completed, "concurrent build did not complete");
        pool.terminate();
    }

    #[test]
    fn terminate_joins_idle_workers() {
        let pool = WorkerPool::initialize(test_config(3)).unwrap();
        pool.terminate();
    }
}
