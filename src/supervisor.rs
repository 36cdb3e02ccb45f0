//! 동기화 워커 수명 관리 모듈
//!
//! 세대(generation) 카운터와 취소 토큰으로 한 번에 하나의 워커만 실행되도록 보장합니다.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sync_engine::{ReconciliationEngine, WorkerContext};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn sync worker: {0}")]
    Spawn(#[source] io::Error),
}

/// 실행 중인 워커 한 개
struct RunningWorker {
    generation: u64,
    cancel: CancellationToken,
    handle: thread::JoinHandle<()>,
}

pub struct SyncSupervisor {
    engine: Arc<ReconciliationEngine>,
    runtime: Handle,
    generation: Arc<AtomicU64>,
    wake: Arc<Notify>,
    worker: Mutex<Option<RunningWorker>>,
}

impl SyncSupervisor {
    /// 워커 스레드는 `runtime` 위에서 엔진 루프를 실행합니다. 멀티스레드 런타임이어야 합니다.
    pub fn new(engine: Arc<ReconciliationEngine>, runtime: Handle) -> Self {
        Self {
            engine,
            runtime,
            generation: Arc::new(AtomicU64::new(0)),
            wake: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// 가장 최근에 시작된 워커의 세대
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<RunningWorker>> {
        self.worker.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// 워커가 없으면 새로 시작합니다. 이미 실행 중이면 그 세대를 반환합니다.
    pub fn start(&self) -> Result<u64, SupervisorError> {
        let mut slot = self.lock_worker();
        if let Some(worker) = slot.as_ref() {
            if !worker.handle.is_finished() {
                return Ok(worker.generation);
            }
        }
        Self::reap(&mut slot);
        self.spawn_locked(&mut slot)
    }

    /// 현재 워커를 취소하고 종료될 때까지 기다립니다.
    pub fn stop(&self) {
        let mut slot = self.lock_worker();
        Self::reap(&mut slot);
    }

    /// 이전 워커가 완전히 종료된 뒤에 새 워커를 시작합니다.
    ///
    /// 잠금을 쥔 채로 stop과 start를 수행하므로 동시에 호출되어도 워커는 하나뿐입니다.
    pub fn restart(&self) -> Result<u64, SupervisorError> {
        let mut slot = self.lock_worker();
        Self::reap(&mut slot);
        let generation = self.spawn_locked(&mut slot)?;
        info!(generation, "sync worker restarted");
        Ok(generation)
    }

    /// 대기 중인 워커를 즉시 깨웁니다. 워커가 없으면 시작합니다.
    pub fn sync_now(&self) -> Result<u64, SupervisorError> {
        let mut slot = self.lock_worker();
        if let Some(worker) = slot.as_ref() {
            if !worker.handle.is_finished() {
                debug!(generation = worker.generation, "waking sync worker");
                self.wake.notify_one();
                return Ok(worker.generation);
            }
        }
        Self::reap(&mut slot);
        self.spawn_locked(&mut slot)
    }

    fn spawn_locked(&self, slot: &mut Option<RunningWorker>) -> Result<u64, SupervisorError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let ctx = WorkerContext::new(
            generation,
            Arc::clone(&self.generation),
            cancel.clone(),
            Arc::clone(&self.wake),
        );

        let engine = Arc::clone(&self.engine);
        let runtime = self.runtime.clone();
        let handle = thread::Builder::new()
            .name(format!("sync-worker-{generation}"))
            .spawn(move || runtime.block_on(engine.run(&ctx)))
            .map_err(SupervisorError::Spawn)?;

        *slot = Some(RunningWorker {
            generation,
            cancel,
            handle,
        });
        Ok(generation)
    }

    fn reap(slot: &mut Option<RunningWorker>) {
        if let Some(worker) = slot.take() {
            worker.cancel.cancel();
            if worker.handle.join().is_err() {
                warn!(generation = worker.generation, "sync worker panicked");
            } else {
                debug!(generation = worker.generation, "sync worker joined");
            }
        }
    }
}

impl Drop for SyncSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
