//! 路径值对象
//!
//! 一对 src->dst 的时延与可靠性，不可变，按值比较。

/// 两个已接入地址之间的路径属性。
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// 端到端时延（毫秒，> 0）。
    latency: f64,
    /// 端到端可靠性（丢包存活概率，[0, 1]）。
    reliability: f64,
}

impl Path {
    pub fn new(latency: f64, reliability: f64) -> Path {
        debug_assert!(latency > 0.0);
        debug_assert!((0.0..=1.0).contains(&reliability));
        Path {
            latency,
            reliability,
        }
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }

    pub fn reliability(&self) -> f64 {
        self.reliability
    }
}
