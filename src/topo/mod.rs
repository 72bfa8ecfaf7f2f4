//! 拓扑路由模块
//!
//! 静态图上的附着、时延/可靠性查询与路径缓存。

// 子模块声明
mod address;
mod graph;
mod path;
mod topology;

// 重新导出公共接口
pub use address::Address;
pub use graph::{EdgeSpec, GraphSpec, VertexSpec};
pub use path::Path;
pub use topology::Topology;
