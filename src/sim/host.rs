//! 虚拟主机接口
//!
//! 引擎只通过此 trait 驱动主机：主机自持一个线程安全的本地事件队列，
//! 引擎按执行窗口把主机交给工作线程排空。

use super::event::Event;
use super::time::SimTime;
use super::worker::Worker;
use crate::error::SimError;

/// 虚拟主机标识符。由引擎的原子计数器铸造，进程内唯一，主机生命周期内
/// 稳定且不复用；事件路由与确定性平局裁决都以它为键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostId(pub u32);

/// 被引擎驱动的虚拟主机。
///
/// 本地队列必须内部同步：同一窗口内，其他工作线程可能并发地向本主机
/// push 未来窗口的事件，而本主机正被另一条线程排空。实现方在
/// `pop_next_event` / `push_local_event` 内各自短暂持锁即可，
/// `deliver` 调用时不会持有队列锁，因此事件处理中再次入队不会死锁。
pub trait Host: Send + Sync {
    fn id(&self) -> HostId;

    /// 事件入队（由引擎的路由路径调用；序列号已打戳）。
    fn push_local_event(&self, event: Event);

    /// 队头事件的投递时刻；队列为空时返回 None。
    fn peek_next_delivery_time(&self) -> Option<SimTime>;

    /// 弹出投递时刻严格早于 `until` 的队头事件。
    fn pop_next_event(&self, until: SimTime) -> Option<Event>;

    /// 处理一个事件。经由 `worker` 可向任意主机调度未来事件。
    fn deliver(&self, event: Event, worker: &Worker<'_>) -> Result<(), SimError>;

    /// 排空本窗口内的全部事件：逐个出队、推进工作线程时钟、交付。
    /// 默认实现保证 `worker.current_time()` 始终等于正在交付的事件时刻。
    fn pop_and_deliver(&self, until: SimTime, worker: &Worker<'_>) -> Result<(), SimError> {
        while let Some(event) = self.pop_next_event(until) {
            worker.enter_event(event.delivery_time());
            self.deliver(event, worker)?;
        }
        Ok(())
    }
}
