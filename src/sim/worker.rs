//! 工作线程上下文
//!
//! 每条工作线程在处理一个主机工作项时绑定一个 `Worker`：记录当前主机、
//! 当前仿真时刻，并作为主机向引擎调度事件的入口（前瞻检查在这里做）。
//! 线程本地只缓存工作线程 id；引擎引用按工作项传入，因此一个进程里
//! 可以并存多个引擎。

use super::engine::Engine;
use super::event::Event;
use super::host::{Host, HostId};
use super::time::SimTime;
use crate::error::SimError;
use std::cell::Cell;
use tracing::trace;

/// 工作线程标识符。线程首次绑定工作上下文时向引擎申领，同线程复用；
/// 只用于日志归因，不参与任何排序或哈希，因此不带这些派生。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerId(pub u32);

thread_local! {
    static BOUND_WORKER_ID: Cell<Option<WorkerId>> = Cell::new(None);
}

/// 工作线程执行上下文。状态机：Idle -> Running(host) -> Idle，
/// 切换只发生在工作项边界（`current_host` 为 None 即 Idle）。
pub struct Worker<'e> {
    id: WorkerId,
    engine: &'e Engine,
    current_time: Cell<SimTime>,
    current_host: Cell<Option<HostId>>,
    /// 当前工作项内已发射的事件计数，用于确定性平局裁决。
    emit_seq: Cell<u32>,
}

impl<'e> Worker<'e> {
    /// 在当前线程上绑定一个工作上下文。线程首次绑定时向引擎申领 id，
    /// 之后同线程复用。
    pub(crate) fn bind(engine: &'e Engine) -> Worker<'e> {
        let id = BOUND_WORKER_ID.with(|cell| match cell.get() {
            Some(id) => id,
            None => {
                let id = engine.generate_worker_id();
                cell.set(Some(id));
                id
            }
        });
        Worker {
            id,
            engine,
            current_time: Cell::new(engine.clock()),
            current_host: Cell::new(None),
            emit_seq: Cell::new(0),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn engine(&self) -> &Engine {
        self.engine
    }

    /// 当前仿真时刻：处理事件时等于该事件的投递时刻。
    pub fn current_time(&self) -> SimTime {
        self.current_time.get()
    }

    pub fn current_host(&self) -> Option<HostId> {
        self.current_host.get()
    }

    /// 推进到下一个事件的投递时刻。同一主机同一窗口内时刻单调不减。
    /// 自定义 `pop_and_deliver` 的主机实现必须在交付每个事件前调用。
    pub fn enter_event(&self, at: SimTime) {
        debug_assert!(at >= self.current_time.get(), "event delivered in the past");
        self.current_time.set(at);
    }

    /// 执行一个主机工作项：排空该主机在 `[window_start, until)` 内的事件。
    pub(crate) fn run_host(
        &self,
        host: &dyn Host,
        window_start: SimTime,
        until: SimTime,
    ) -> Result<(), SimError> {
        trace!(worker = self.id.0, host = host.id().0, ?until, "处理主机工作项");
        self.current_host.set(Some(host.id()));
        self.current_time.set(window_start);
        self.emit_seq.set(0);
        let result = host.pop_and_deliver(until, self);
        self.current_host.set(None);
        result
    }

    /// 主机在事件处理中调度新事件的入口。
    ///
    /// 前瞻不变量：目的主机不同于当前主机时，投递时刻必须不早于
    /// `now + minTimeJump`；同主机事件只要求不早于 `now`。
    pub fn push_event(&self, mut event: Event) -> Result<(), SimError> {
        let now = self.current_time.get();
        let src = self.current_host.get();
        event.stamp_src(src);

        let violation = match (src, event.dst_host()) {
            (Some(src), Some(dst)) if src != dst => {
                event.delivery_time() < now.earliest_cross_host(self.engine.min_time_jump())
            }
            _ => event.delivery_time() < now,
        };
        if violation {
            return Err(SimError::LookaheadViolation {
                src,
                dst: event.dst_host(),
                emit_time: now,
                delivery_time: event.delivery_time(),
                min_time_jump: self.engine.min_time_jump(),
            });
        }

        let emitter = src.map(|h| h.0.wrapping_add(1)).unwrap_or(0);
        let counter = self.emit_seq.get();
        self.emit_seq.set(counter.wrapping_add(1));
        event.stamp_seq(emitter, counter);

        self.engine.route_event(event);
        Ok(())
    }
}
