//! 事件优先队列
//!
//! 按 `(投递时刻, 序列号)` 排序的最小堆，主队列与各主机本地队列共用。

use super::event::Event;
use super::time::SimTime;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// 队列内部条目。排序键从事件上快照，避免比较时触碰负载。
struct QueuedEvent {
    at: SimTime,
    seq: u64,
    arrival: u64,
    ev: Event,
}

// BinaryHeap 是 max-heap；我们需要最小时间优先，因此反向比较。
// `arrival` 是本队列的入队序号，只在 `(at, seq)` 完全相同时起作用：
// 那只可能是同一发射方在不同窗口发出的事件，而窗口之间由屏障串行，
// 因此入队顺序本身是确定性的。
impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.at, self.seq).cmp(&(other.at, other.seq)) {
            Ordering::Equal => self.arrival.cmp(&other.arrival),
            ord => ord,
        }
        .reverse()
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq && self.arrival == other.arrival
    }
}

impl Eq for QueuedEvent {}

/// 事件优先队列。序列号在入队路径上打戳（见 `Event::stamp_seq`），
/// 这里只负责按 `(at, seq)` 的全序出队。
#[derive(Default)]
pub struct EventQueue {
    next_arrival: u64,
    heap: BinaryHeap<QueuedEvent>,
}

impl EventQueue {
    pub fn new() -> EventQueue {
        EventQueue::default()
    }

    pub fn push(&mut self, ev: Event) {
        let arrival = self.next_arrival;
        self.next_arrival = self.next_arrival.wrapping_add(1);
        self.heap.push(QueuedEvent {
            at: ev.delivery_time(),
            seq: ev.sequence(),
            arrival,
            ev,
        });
    }

    /// 队头事件的投递时刻。
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|item| item.at)
    }

    /// 弹出投递时刻严格早于 `until` 的队头事件（执行窗口为半开区间）。
    pub fn pop_before(&mut self, until: SimTime) -> Option<Event> {
        if self.heap.peek()?.at < until {
            return self.heap.pop().map(|item| item.ev);
        }
        None
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|item| item.ev)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
