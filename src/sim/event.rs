//! 事件封装
//!
//! 定义带时间戳的仿真事件：面向主机的消息事件，以及引擎级控制事件。

use super::engine::Engine;
use super::host::HostId;
use super::time::SimTime;
use std::any::Any;
use std::fmt;

/// 引擎级控制事件（主机创建、应用启动等）。由引擎在每个执行窗口开始前、
/// 单线程地执行。使用 `self: Box<Self>` 以支持 move/所有权转移。
pub trait ControlEvent: Send {
    fn execute(self: Box<Self>, engine: &Engine);
}

/// 事件负载：要么是交付给目的主机的不透明消息，要么是引擎控制事件。
pub enum EventPayload {
    Message(Box<dyn Any + Send>),
    Control(Box<dyn ControlEvent>),
}

/// 仿真事件。创建后不可变；`src` 与 `seq` 由引擎在入队路径上打戳。
///
/// 排序键为 `(delivery_time, seq)`。`seq` 的高 32 位是发射方主机 id + 1
/// （引擎上下文为 0），低 32 位是发射方在当前窗口内的单调计数，
/// 因此同一队列内的平局裁决在多线程下也是确定性的。
pub struct Event {
    delivery_time: SimTime,
    src: Option<HostId>,
    dst: Option<HostId>,
    seq: u64,
    payload: EventPayload,
}

impl Event {
    /// 构造面向主机的消息事件。
    pub fn message(delivery_time: SimTime, dst: HostId, payload: Box<dyn Any + Send>) -> Event {
        Event {
            delivery_time,
            src: None,
            dst: Some(dst),
            seq: 0,
            payload: EventPayload::Message(payload),
        }
    }

    /// 构造引擎级控制事件（无目的主机，进主队列）。
    pub fn control(delivery_time: SimTime, payload: Box<dyn ControlEvent>) -> Event {
        Event {
            delivery_time,
            src: None,
            dst: None,
            seq: 0,
            payload: EventPayload::Control(payload),
        }
    }

    pub fn delivery_time(&self) -> SimTime {
        self.delivery_time
    }

    pub fn src_host(&self) -> Option<HostId> {
        self.src
    }

    pub fn dst_host(&self) -> Option<HostId> {
        self.dst
    }

    pub fn sequence(&self) -> u64 {
        self.seq
    }

    /// 消息负载的只读访问；控制事件返回 None。
    pub fn payload(&self) -> Option<&(dyn Any + Send)> {
        match &self.payload {
            EventPayload::Message(m) => Some(m.as_ref()),
            EventPayload::Control(_) => None,
        }
    }

    /// 取出消息负载；控制事件返回 None。
    pub fn into_message(self) -> Option<Box<dyn Any + Send>> {
        match self.payload {
            EventPayload::Message(m) => Some(m),
            EventPayload::Control(_) => None,
        }
    }

    pub(crate) fn into_payload(self) -> EventPayload {
        self.payload
    }

    pub(crate) fn is_control(&self) -> bool {
        matches!(self.payload, EventPayload::Control(_))
    }

    pub(crate) fn stamp_src(&mut self, src: Option<HostId>) {
        self.src = src;
    }

    /// 入队打戳：`emitter` 为发射方主机 id + 1（引擎上下文为 0）。
    pub(crate) fn stamp_seq(&mut self, emitter: u32, counter: u32) {
        self.seq = ((emitter as u64) << 32) | counter as u64;
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("delivery_time", &self.delivery_time)
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("seq", &self.seq)
            .field(
                "payload",
                &match self.payload {
                    EventPayload::Message(_) => "message",
                    EventPayload::Control(_) => "control",
                },
            )
            .finish()
    }
}
