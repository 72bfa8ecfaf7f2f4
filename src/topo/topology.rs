//! 拓扑服务
//!
//! 维护虚拟主机到兴趣点顶点的附着关系，回答任意一对已接入地址之间的
//! 时延/可靠性查询。最短路径结果缓存在两级哈希表里，运行期间只增不减，
//! 除非显式清空。
//!
//! 锁纪律：图（含边权）在一把互斥锁后面，所有图操作都持锁；附着表与
//! 路径缓存各用一把读写锁。约定的获取顺序是 virtualIP -> graph ->
//! pathCache，实现里三把锁只会依次拿放，从不嵌套。

use super::address::Address;
use super::graph::Graph;
use super::path::Path;
use crate::error::SimError;
use crate::sim::SimRng;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 图与其观测计数，整体放在图锁后面。
struct GraphState {
    graph: Graph,
    /// 已执行的最短路径计算次数与累计耗时（缓存命中不会推进）。
    shortest_path_count: u64,
    shortest_path_total_time: Duration,
}

/// 拓扑路由服务。
pub struct Topology {
    graph_path: PathBuf,
    graph: Mutex<GraphState>,
    /// 虚拟 IP -> 顶点下标。
    virtual_ip: RwLock<HashMap<Ipv4Addr, usize>>,
    /// src 地址 id -> dst 地址 id -> Path。
    path_cache: RwLock<HashMap<u32, HashMap<u32, Arc<Path>>>>,
}

impl Topology {
    /// 加载并校验拓扑：解析图描述、检查强连通性、抽取边权。
    pub fn new(graph_path: impl Into<PathBuf>) -> Result<Topology, SimError> {
        let graph_path = graph_path.into();
        let mut graph = Graph::load(&graph_path)?;
        graph.check_strongly_connected()?;
        graph.extract_edge_weights();
        info!(
            path = %graph_path.display(),
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "✅ 拓扑校验通过：图为强连通（单一簇）"
        );
        Ok(Topology {
            graph_path,
            graph: Mutex::new(GraphState {
                graph,
                shortest_path_count: 0,
                shortest_path_total_time: Duration::ZERO,
            }),
            virtual_ip: RwLock::new(HashMap::new()),
            path_cache: RwLock::new(HashMap::new()),
        })
    }

    /// 把虚拟地址附着到一个兴趣点顶点，返回该顶点的 `(下行, 上行)` 带宽。
    ///
    /// 候选为全部兴趣点，依次按 `type`、`geocode`（cluster）过滤，再按
    /// `ip` 的最长前缀匹配收窄；若某个提示会清空候选集则忽略该提示并
    /// 告警（不会静默吞掉，也不会失败）。多于一个候选时用 `rng` 均匀
    /// 随机挑选。
    #[tracing::instrument(skip_all, fields(address = %address))]
    pub fn connect(
        &self,
        address: &Address,
        rng: &mut SimRng,
        ip_hint: Option<Ipv4Addr>,
        cluster_hint: Option<&str>,
        type_hint: Option<&str>,
    ) -> Result<(u64, u64), SimError> {
        let vertex_index = {
            let state = self.graph.lock();
            let graph = &state.graph;
            // 图在加载期已保证至少一个兴趣点。
            let mut candidates = graph.poi_vertices();

            if let Some(kind) = type_hint {
                let filtered: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&v| graph.vertex(v).kind == kind)
                    .collect();
                if filtered.is_empty() {
                    warn!(type_hint = kind, "没有匹配 type 提示的兴趣点，忽略该提示");
                } else {
                    candidates = filtered;
                }
            }
            if let Some(geocode) = cluster_hint {
                let filtered: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&v| graph.vertex(v).geocode.as_deref() == Some(geocode))
                    .collect();
                if filtered.is_empty() {
                    warn!(cluster_hint = geocode, "没有匹配 geocode 提示的兴趣点，忽略该提示");
                } else {
                    candidates = filtered;
                }
            }
            if let Some(ip) = ip_hint {
                // 最长前缀匹配：按位与的数值最大者胜出，平局取先出现者。
                let hint = u32::from(ip);
                let mut best_match = 0u32;
                let mut best = None;
                for &v in &candidates {
                    if let Some(vip) = graph.vertex(v).ip {
                        let matched = u32::from(vip) & hint;
                        if best.is_none() || matched > best_match {
                            best_match = matched;
                            best = Some(v);
                        }
                    }
                }
                if let Some(v) = best {
                    candidates = vec![v];
                }
            }

            if candidates.len() > 1 {
                candidates[rng.gen_index(candidates.len())]
            } else {
                candidates[0]
            }
        };

        self.virtual_ip.write().insert(address.ip(), vertex_index);

        let (bw_down, bw_up) = {
            let state = self.graph.lock();
            let vertex = state.graph.vertex(vertex_index);
            info!(
                address = %address,
                poi = %vertex.id,
                ip = ?vertex.ip,
                geocode = ?vertex.geocode,
                kind = %vertex.kind,
                "地址已接入兴趣点"
            );
            (vertex.bandwidth_down as u64, vertex.bandwidth_up as u64)
        };
        Ok((bw_down, bw_up))
    }

    /// 解除虚拟地址的附着。
    pub fn disconnect(&self, address: &Address) {
        if self.virtual_ip.write().remove(&address.ip()).is_none() {
            warn!(address = %address, "断开未附着的地址");
        }
    }

    /// src 到 dst 的端到端时延（毫秒）；任一端未附着或计算失败返回 -1。
    pub fn latency(&self, src: &Address, dst: &Address) -> f64 {
        match self.path_entry(src, dst) {
            Ok(path) => path.latency(),
            Err(err) => {
                log_query_error(&err);
                -1.0
            }
        }
    }

    /// src 到 dst 的端到端可靠性（[0, 1]）；任一端未附着或计算失败返回 -1。
    pub fn reliability(&self, src: &Address, dst: &Address) -> f64 {
        match self.path_entry(src, dst) {
            Ok(path) => path.reliability(),
            Err(err) => {
                log_query_error(&err);
                -1.0
            }
        }
    }

    pub fn is_routable(&self, src: &Address, dst: &Address) -> bool {
        self.latency(src, dst) >= 0.0
    }

    /// 查缓存，未命中则计算并回填。并发回填同一条目时后写者胜出：
    /// 同一对端点算出的 Path 值相同，覆盖无害。
    fn path_entry(&self, src: &Address, dst: &Address) -> Result<Arc<Path>, SimError> {
        {
            let cache = self.path_cache.read();
            if let Some(path) = cache.get(&src.id()).and_then(|inner| inner.get(&dst.id())) {
                return Ok(Arc::clone(path));
            }
        }

        let (src_vertex, dst_vertex) = {
            let map = self.virtual_ip.read();
            let src_vertex = *map
                .get(&src.ip())
                .ok_or(SimError::AddressUnattached(src.ip()))?;
            let dst_vertex = *map
                .get(&dst.ip())
                .ok_or(SimError::AddressUnattached(dst.ip()))?;
            (src_vertex, dst_vertex)
        };

        let path = self.compute_path(src_vertex, dst_vertex)?;

        self.path_cache
            .write()
            .entry(src.id())
            .or_default()
            .insert(dst.id(), Arc::clone(&path));
        Ok(path)
    }

    /// 在图锁内跑 Dijkstra 并沿途累计时延与可靠性。
    ///
    /// 丢包可能发生在源顶点、途经各边与目的顶点，可靠性是各处存活
    /// 概率的乘积：P = (1-psrc)(1-pedge)...(1-pdst)。
    fn compute_path(&self, src_vertex: usize, dst_vertex: usize) -> Result<Arc<Path>, SimError> {
        let mut state = self.graph.lock();

        debug!(src_vertex, dst_vertex, "计算最短路径");
        let started = Instant::now();
        let result = state.graph.shortest_path(src_vertex, dst_vertex);
        state.shortest_path_count += 1;
        state.shortest_path_total_time += started.elapsed();
        let (vertex_seq, edge_seq) = result?;

        let graph = &state.graph;
        let mut total_latency = 0.0f64;
        let mut total_reliability = 1.0f64;
        total_reliability *= 1.0 - graph.vertex(src_vertex).packet_loss;
        total_reliability *= 1.0 - graph.vertex(dst_vertex).packet_loss;

        let mut path_string = graph.vertex(vertex_seq[0]).id.clone();
        if edge_seq.is_empty() {
            // 同顶点（或自身到自身）：没有边可走，记 1.0ms 的虚拟一跳。
            total_latency = 1.0;
        } else {
            for &edge_index in &edge_seq {
                let edge = graph.edge(edge_index);
                total_latency += edge.latency;
                let edge_reliability = 1.0 - edge.packet_loss;
                total_reliability *= edge_reliability;
                let _ = write!(
                    path_string,
                    "--[{},{}]-->{}",
                    edge.latency,
                    edge_reliability,
                    graph.vertex(edge.to).id
                );
            }
        }

        debug!(
            src = %graph.vertex(src_vertex).id,
            dst = %graph.vertex(dst_vertex).id,
            latency_ms = total_latency,
            loss = 1.0 - total_reliability,
            path = %path_string,
            "最短路径计算完成"
        );
        drop(state);

        Ok(Arc::new(Path::new(total_latency, total_reliability)))
    }

    /// 显式清空路径缓存。核心从不隐式清空。
    pub fn clear_cache(&self) {
        let entries: usize = {
            let mut cache = self.path_cache.write();
            let entries = cache.values().map(|inner| inner.len()).sum();
            cache.clear();
            entries
        };
        let state = self.graph.lock();
        info!(
            entries,
            computations = state.shortest_path_count,
            total_time = ?state.shortest_path_total_time,
            "路径缓存已清空"
        );
    }

    /// 已执行的最短路径计算次数（缓存命中不计）。
    pub fn shortest_path_count(&self) -> u64 {
        self.graph.lock().shortest_path_count
    }

    /// 最短路径计算的累计耗时。
    pub fn shortest_path_total_time(&self) -> Duration {
        self.graph.lock().shortest_path_total_time
    }
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("graph_path", &self.graph_path)
            .field("attachments", &self.virtual_ip.read().len())
            .field(
                "cached_paths",
                &self
                    .path_cache
                    .read()
                    .values()
                    .map(|inner| inner.len())
                    .sum::<usize>(),
            )
            .finish()
    }
}

fn log_query_error(err: &SimError) {
    match err {
        SimError::AddressUnattached(_) => warn!(%err, "路径查询失败"),
        _ => error!(%err, "路径查询失败"),
    }
}
