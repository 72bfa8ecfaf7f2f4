//! 仿真核心模块
//!
//! 事件驱动仿真的核心组件：仿真时间、事件、主机接口、工作线程与引擎。

// 子模块声明
mod config;
mod engine;
mod event;
mod host;
mod queue;
mod registry;
mod rng;
mod time;
mod worker;

// 重新导出公共接口
pub use config::SimConfig;
pub use engine::Engine;
pub use event::{ControlEvent, Event, EventPayload};
pub use host::{Host, HostId};
pub use queue::EventQueue;
pub use registry::{Registry, StorageKind};
pub use rng::SimRng;
pub use time::SimTime;
pub use worker::{Worker, WorkerId};
