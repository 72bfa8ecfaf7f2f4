//! 虚拟时间
//!
//! 引擎推进的逻辑时间，与墙钟无关。内部以纳秒计数，被引擎切成宽度为
//! 前瞻值的执行窗口；所有运算在 `u64` 上限处饱和，绝不回绕，因此
//! "永不结束"的仿真停在 `MAX` 而不是绕回过去。

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// 虚拟仿真时刻（纳秒计数）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    pub const fn from_micros(us: u64) -> SimTime {
        SimTime(us.saturating_mul(NANOS_PER_MICRO))
    }

    pub const fn from_millis(ms: u64) -> SimTime {
        SimTime(ms.saturating_mul(NANOS_PER_MILLI))
    }

    pub const fn from_secs(s: u64) -> SimTime {
        SimTime(s.saturating_mul(NANOS_PER_SEC))
    }

    /// 纳秒计数值。
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// 饱和加法。
    pub const fn saturating_add(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(other.0))
    }

    /// 以本时刻为窗口起点、`jump` 为窗口宽度时的窗口末尾
    /// （执行窗口是半开区间，末尾本身属于下一个窗口）。
    pub const fn window_end(self, jump: SimTime) -> SimTime {
        self.saturating_add(jump)
    }

    /// 在本时刻发射跨主机事件时允许的最早投递时刻（前瞻下界）。
    /// 早于它的跨主机事件会与正在执行的窗口竞争，因而被拒绝。
    pub const fn earliest_cross_host(self, lookahead: SimTime) -> SimTime {
        self.saturating_add(lookahead)
    }
}
