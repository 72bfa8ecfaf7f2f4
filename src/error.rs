//! 错误类型
//!
//! 定义仿真核心的统一错误枚举及进程退出码映射。

use crate::sim::{HostId, SimTime};
use std::net::Ipv4Addr;
use thiserror::Error;

/// 仿真核心错误。启动类错误中止初始化；`LookaheadViolation` 中止运行；
/// 查询类错误在最外层 API 折叠为哨兵值。
#[derive(Debug, Error)]
pub enum SimError {
    /// 配置缺失或非法（启动期，致命）。
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// 拓扑图文件缺失或格式错误（启动期，致命）。
    #[error("failed to load topology graph: {0}")]
    GraphUnloadable(String),

    /// 拓扑图不是强连通的（启动期，致命）。
    #[error("topology must be strongly connected: {0}")]
    UnconnectedTopology(String),

    /// 查询的虚拟 IP 未附着到任何 PoI 顶点（查询期，返回哨兵值）。
    #[error("address {0} is not connected to the topology")]
    AddressUnattached(Ipv4Addr),

    /// 跨主机事件的投递时刻早于 `emit + minTimeJump`（运行期，致命，破坏确定性）。
    #[error(
        "lookahead violation: event from {src:?} to {dst:?} scheduled for {delivery_time:?} \
         at {emit_time:?} (min time jump {min_time_jump:?})"
    )]
    LookaheadViolation {
        src: Option<HostId>,
        dst: Option<HostId>,
        emit_time: SimTime,
        delivery_time: SimTime,
        min_time_jump: SimTime,
    },

    /// 底层最短路径计算失败（查询期，返回哨兵值）。
    #[error("shortest path computation failed: {0}")]
    PathComputationFailed(String),

    /// 工作线程池创建失败（启动期，致命）。
    #[error("worker pool failure: {0}")]
    WorkerPoolFailure(String),
}

impl SimError {
    /// 供外层 CLI 使用的进程退出码；正常结束为 0。
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::ConfigInvalid(_) => 1,
            SimError::GraphUnloadable(_) => 2,
            SimError::UnconnectedTopology(_) => 3,
            SimError::WorkerPoolFailure(_) => 4,
            SimError::LookaheadViolation { .. } => 5,
            SimError::PathComputationFailed(_) => 6,
            SimError::AddressUnattached(_) => 7,
        }
    }
}
