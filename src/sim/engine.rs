//! 仿真引擎
//!
//! 全局调度器：把虚拟时间切成宽度为 `minTimeJump` 的执行窗口，
//! 窗口开始前单线程执行主队列中的控制事件，窗口内把有待处理事件的
//! 主机并行交给工作线程排空，全部排空后把时钟推进到窗口末尾。
//! 跨主机事件必须落在至少一个窗口之后（前瞻不变量），因此同一窗口内
//! 的工作线程之间不存在投递竞争。

use super::config::SimConfig;
use super::event::{Event, EventPayload};
use super::host::{Host, HostId};
use super::queue::EventQueue;
use super::registry::Registry;
use super::time::SimTime;
use super::worker::{Worker, WorkerId};
use crate::error::SimError;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// 仿真引擎。引擎线程独占驱动窗口推进；字段的并发级别见各自注释。
pub struct Engine {
    config: SimConfig,

    /// 前瞻值，亦即执行窗口宽度。构造后不可变。
    min_time_jump: SimTime,
    /// 结束时刻。构造后不可变。
    end_time: SimTime,

    /// 全局仿真时钟。只在窗口边界由引擎线程写入；窗口内工作线程可读。
    clock: AtomicU64,
    /// 当前执行窗口 `[start, end)`。只在窗口边界写入。
    window_start: AtomicU64,
    window_end: AtomicU64,

    /// 被驱动的主机。注册通常发生在控制事件里（窗口前，单线程）。
    hosts: RwLock<HashMap<HostId, Arc<dyn Host>>>,

    /// 非主机事件的主队列（控制事件）。
    master_queue: Mutex<EventQueue>,
    /// 引擎上下文发射计数，用于主队列与引导事件的平局裁决。
    master_emit_seq: AtomicU32,

    registry: Registry,

    /// 当前窗口内尚未排空的主机数；归零即窗口完成。
    n_hosts_to_process: AtomicUsize,
    worker_id_counter: AtomicU32,
    node_id_counter: AtomicU32,

    /// 终止开关：置位后引擎在下一个窗口边界退出。
    killed: AtomicBool,
    /// 首个致命错误（例如前瞻违例），由 `run` 在窗口边界取出并返回。
    fatal: Mutex<Option<SimError>>,

    idle_lock: Mutex<()>,
    workers_idle: Condvar,

    /// 工作线程池；None 表示在引擎线程上内联执行（n = 0）。
    pool: Option<rayon::ThreadPool>,
}

impl Engine {
    /// 构造引擎；配置非法时失败。
    pub fn new(config: SimConfig) -> Result<Engine, SimError> {
        config.validate()?;
        let min_time_jump = config.min_time_jump();
        let end_time = config.end_time();
        Ok(Engine {
            config,
            min_time_jump,
            end_time,
            clock: AtomicU64::new(0),
            window_start: AtomicU64::new(0),
            window_end: AtomicU64::new(SimTime::ZERO.window_end(min_time_jump).0),
            hosts: RwLock::new(HashMap::new()),
            master_queue: Mutex::new(EventQueue::new()),
            master_emit_seq: AtomicU32::new(0),
            registry: Registry::new(),
            n_hosts_to_process: AtomicUsize::new(0),
            worker_id_counter: AtomicU32::new(0),
            node_id_counter: AtomicU32::new(0),
            killed: AtomicBool::new(false),
            fatal: Mutex::new(None),
            idle_lock: Mutex::new(()),
            workers_idle: Condvar::new(),
            pool: None,
        })
    }

    /// 创建 `n` 条工作线程；`n = 0` 表示内联单线程执行。
    pub fn setup_workers(&mut self, n: usize) -> Result<(), SimError> {
        if n == 0 {
            self.pool = None;
            return Ok(());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("parsim-worker-{i}"))
            .build()
            .map_err(|e| SimError::WorkerPoolFailure(e.to_string()))?;
        info!(n, "工作线程池已创建");
        self.pool = Some(pool);
        Ok(())
    }

    /// 关闭工作线程池（排空后回收线程）。
    pub fn teardown_workers(&mut self) {
        self.pool = None;
    }

    /// 注册一个被驱动的主机。
    pub fn add_host(&self, host: Arc<dyn Host>) {
        let id = host.id();
        let previous = self.hosts.write().insert(id, host);
        debug!(host = id.0, "注册主机");
        if previous.is_some() {
            warn!(host = id.0, "主机 id 重复注册，旧主机已被替换");
        }
    }

    /// 运行仿真直到结束时刻、终止开关或事件耗尽。
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> Result<(), SimError> {
        let engine: &Engine = self;
        info!(
            min_time_jump = engine.min_time_jump.0,
            end_time = engine.end_time.0,
            hosts = engine.hosts.read().len(),
            "▶️  开始运行仿真"
        );

        let mut windows: u64 = 0;
        loop {
            if engine.is_killed() {
                break;
            }
            let w_start = SimTime(engine.window_start.load(Ordering::Relaxed));
            let w_end = SimTime(engine.window_end.load(Ordering::Relaxed));

            // 窗口前：单线程执行所有投递时刻早于窗口末尾的控制事件。
            engine.apply_master_events(w_end);

            // 本窗口有待处理事件的主机。
            let ready: Vec<Arc<dyn Host>> = {
                let hosts = engine.hosts.read();
                hosts
                    .values()
                    .filter(|h| matches!(h.peek_next_delivery_time(), Some(t) if t < w_end))
                    .cloned()
                    .collect()
            };

            engine.n_hosts_to_process.store(ready.len(), Ordering::Release);
            if !ready.is_empty() {
                debug!(
                    window = windows,
                    w_start = w_start.0,
                    w_end = w_end.0,
                    hosts = ready.len(),
                    "分发主机工作项"
                );
                engine.dispatch_hosts(&ready, w_start, w_end);
                engine.wait_workers_idle();
            }

            windows = windows.wrapping_add(1);
            engine.clock.store(w_end.0, Ordering::Release);

            if let Some(err) = engine.fatal.lock().take() {
                error!(%err, "仿真因致命错误中止");
                return Err(err);
            }
            if w_end >= engine.end_time {
                debug!("到达结束时刻");
                break;
            }
            if engine.is_killed() {
                break;
            }
            if engine.fully_idle() {
                debug!("事件耗尽，提前结束");
                break;
            }

            engine.window_start.store(w_end.0, Ordering::Relaxed);
            engine
                .window_end
                .store(w_end.window_end(engine.min_time_jump).0, Ordering::Relaxed);
        }

        info!(final_time = engine.clock.load(Ordering::Acquire), windows, "✅ 仿真完成");
        Ok(())
    }

    fn dispatch_hosts(&self, ready: &[Arc<dyn Host>], w_start: SimTime, w_end: SimTime) {
        match &self.pool {
            None => {
                let worker = Worker::bind(self);
                for host in ready {
                    if let Err(err) = worker.run_host(host.as_ref(), w_start, w_end) {
                        self.fail(err);
                    }
                    self.notify_host_processed();
                }
            }
            Some(pool) => {
                let engine = self;
                pool.scope(|scope| {
                    for host in ready {
                        let host = Arc::clone(host);
                        scope.spawn(move |_| {
                            let worker = Worker::bind(engine);
                            if let Err(err) = worker.run_host(host.as_ref(), w_start, w_end) {
                                engine.fail(err);
                            }
                            engine.notify_host_processed();
                        });
                    }
                });
            }
        }
    }

    fn apply_master_events(&self, until: SimTime) {
        // 每次弹一个并释放锁：控制事件自身可以继续向主队列入队。
        loop {
            let event = { self.master_queue.lock().pop_before(until) };
            let Some(event) = event else { break };
            trace!(?event, "执行引擎级控制事件");
            match event.into_payload() {
                EventPayload::Control(ctl) => ctl.execute(self),
                EventPayload::Message(_) => warn!("主队列中出现消息事件，已丢弃"),
            }
        }
    }

    fn wait_workers_idle(&self) {
        let mut guard = self.idle_lock.lock();
        while self.n_hosts_to_process.load(Ordering::Acquire) != 0 {
            self.workers_idle.wait(&mut guard);
        }
    }

    /// 主队列与全部主机队列都为空。
    fn fully_idle(&self) -> bool {
        if !self.master_queue.lock().is_empty() {
            return false;
        }
        self.hosts
            .read()
            .values()
            .all(|h| h.peek_next_delivery_time().is_none())
    }

    /// 引擎上下文（未绑定工作线程，例如窗口前或引导阶段）的事件入口。
    /// 此时 `currentTime = clock`、`srcHost = none`，不做跨主机前瞻检查，
    /// 但不允许把事件调度到过去。
    pub fn push_event(&self, mut event: Event) -> Result<(), SimError> {
        let now = self.clock();
        if event.delivery_time() < now {
            return Err(SimError::LookaheadViolation {
                src: None,
                dst: event.dst_host(),
                emit_time: now,
                delivery_time: event.delivery_time(),
                min_time_jump: self.min_time_jump,
            });
        }
        event.stamp_src(None);
        let counter = self.master_emit_seq.fetch_add(1, Ordering::Relaxed);
        event.stamp_seq(0, counter);
        self.route_event(event);
        Ok(())
    }

    /// 按目的主机路由：有目的主机进其本地队列，否则进主队列。
    pub(crate) fn route_event(&self, event: Event) {
        debug_assert!(event.dst_host().is_some() != event.is_control());
        match event.dst_host() {
            Some(dst) => {
                let hosts = self.hosts.read();
                let host = hosts
                    .get(&dst)
                    .unwrap_or_else(|| panic!("no registered host {dst:?}"));
                host.push_local_event(event);
            }
            None => self.master_queue.lock().push(event),
        }
    }

    /// 工作线程通告：当前窗口内又有一个主机排空完毕。
    pub fn notify_host_processed(&self) {
        let previous = self.n_hosts_to_process.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "notify without a pending host");
        if previous == 1 {
            let _guard = self.idle_lock.lock();
            self.workers_idle.notify_all();
        }
    }

    pub fn generate_worker_id(&self) -> WorkerId {
        WorkerId(self.worker_id_counter.fetch_add(1, Ordering::Relaxed))
    }

    pub fn generate_node_id(&self) -> u32 {
        self.node_id_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// 置终止开关；引擎在下一个窗口边界退出，工作线程池随之排空。
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// 记录首个致命错误并终止仿真。
    pub(crate) fn fail(&self, err: SimError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(err);
        }
        self.kill();
    }

    pub fn clock(&self) -> SimTime {
        SimTime(self.clock.load(Ordering::Acquire))
    }

    pub fn min_time_jump(&self) -> SimTime {
        self.min_time_jump
    }

    pub fn end_time(&self) -> SimTime {
        self.end_time
    }

    /// 当前执行窗口的末尾，即本窗口的安全屏障。
    pub fn execution_barrier(&self) -> SimTime {
        SimTime(self.window_end.load(Ordering::Relaxed))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("clock", &self.clock())
            .field("window_end", &self.execution_barrier())
            .field("min_time_jump", &self.min_time_jump)
            .field("end_time", &self.end_time)
            .field("hosts", &self.hosts.read().len())
            .field("killed", &self.is_killed())
            .finish()
    }
}
