//! 拓扑图加载与最短路径
//!
//! 从 JSON 图描述加载有向图，校验属性与强连通性，抽取边权向量，
//! 并提供 Dijkstra 最短路径查询。图本身不做内部同步；`Topology`
//! 把整个图放在一把互斥锁后面，所有图操作（含属性读取）都持锁进行。

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path as FsPath;
use tracing::{debug, info};

/// JSON 图描述。顶点/边属性集合见各字段；任何能产出同样属性集的
/// 解析器都是兼容的。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub vertices: Vec<VertexSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

/// 顶点描述。兴趣点（id 含 `poi`）必须带全部可选属性。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub geocode: Option<String>,
    #[serde(default)]
    pub bandwidthup: Option<f64>,
    #[serde(default)]
    pub bandwidthdown: Option<f64>,
    #[serde(default)]
    pub packetloss: Option<f64>,
}

/// 有向边描述。三个属性都是必需的。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    /// 传播时延（毫秒）。
    pub latency: f64,
    /// 抖动（毫秒）。
    pub jitter: f64,
    /// 丢包率（[0, 1]）。
    pub packetloss: f64,
}

/// 校验后的顶点：属性在加载期一次性解析成类型化字段，
/// 查询路径上不再按名字找属性。
#[derive(Debug, Clone)]
pub(crate) struct Vertex {
    pub id: String,
    pub kind: String,
    pub is_poi: bool,
    pub ip: Option<Ipv4Addr>,
    pub geocode: Option<String>,
    pub bandwidth_up: f64,
    pub bandwidth_down: f64,
    pub packet_loss: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub from: usize,
    pub to: usize,
    pub latency: f64,
    #[allow(dead_code)]
    pub jitter: f64,
    pub packet_loss: f64,
}

/// 校验后的有向图与边权向量。
pub(crate) struct Graph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    /// `adj[v]` 为从 `v` 出发的 `(边下标, 目的顶点)`。
    adj: Vec<Vec<(usize, usize)>>,
    /// 最短路径度量：每条边的 `latency`。与图同锁。
    edge_weights: Vec<f64>,
}

fn check_loss_rate(value: f64, what: &str) -> Result<(), SimError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(SimError::GraphUnloadable(format!(
            "{what}: packetloss {value} outside [0, 1]"
        )));
    }
    Ok(())
}

impl Graph {
    /// 读取并校验图描述文件。
    pub fn load(path: &FsPath) -> Result<Graph, SimError> {
        info!(path = %path.display(), "读取拓扑图描述");
        let raw = fs::read_to_string(path)
            .map_err(|e| SimError::GraphUnloadable(format!("{}: {e}", path.display())))?;
        let spec: GraphSpec = serde_json::from_str(&raw)
            .map_err(|e| SimError::GraphUnloadable(format!("{}: {e}", path.display())))?;
        let graph = Graph::build(spec)?;
        info!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "成功解析拓扑图描述"
        );
        Ok(graph)
    }

    /// 从解析好的描述构建图：校验顶点/边属性并建立邻接表。
    pub fn build(spec: GraphSpec) -> Result<Graph, SimError> {
        if spec.vertices.is_empty() {
            return Err(SimError::GraphUnloadable("graph has no vertices".to_string()));
        }

        let mut vertices = Vec::with_capacity(spec.vertices.len());
        let mut index_of: HashMap<String, usize> = HashMap::new();
        let mut poi_count = 0usize;
        for v in spec.vertices {
            if index_of.insert(v.id.clone(), vertices.len()).is_some() {
                return Err(SimError::GraphUnloadable(format!(
                    "duplicate vertex id '{}'",
                    v.id
                )));
            }
            let is_poi = v.id.contains("poi");
            if is_poi {
                // 兴趣点必须带全部接入属性。
                for (name, present) in [
                    ("ip", v.ip.is_some()),
                    ("geocode", v.geocode.is_some()),
                    ("bandwidthup", v.bandwidthup.is_some()),
                    ("bandwidthdown", v.bandwidthdown.is_some()),
                    ("packetloss", v.packetloss.is_some()),
                ] {
                    if !present {
                        return Err(SimError::GraphUnloadable(format!(
                            "poi vertex '{}' is missing attribute '{name}'",
                            v.id
                        )));
                    }
                }
                poi_count += 1;
            }
            let packet_loss = v.packetloss.unwrap_or(0.0);
            check_loss_rate(packet_loss, &format!("vertex '{}'", v.id))?;
            debug!(
                vertex = vertices.len(),
                id = %v.id,
                kind = %v.kind,
                is_poi,
                "发现顶点"
            );
            vertices.push(Vertex {
                id: v.id,
                kind: v.kind,
                is_poi,
                ip: v.ip,
                geocode: v.geocode,
                bandwidth_up: v.bandwidthup.unwrap_or(0.0),
                bandwidth_down: v.bandwidthdown.unwrap_or(0.0),
                packet_loss,
            });
        }
        if poi_count == 0 {
            return Err(SimError::GraphUnloadable(
                "graph has no point-of-interest vertex".to_string(),
            ));
        }

        let mut edges = Vec::with_capacity(spec.edges.len());
        let mut adj = vec![Vec::new(); vertices.len()];
        for e in spec.edges {
            let from = *index_of.get(&e.source).ok_or_else(|| {
                SimError::GraphUnloadable(format!("edge references unknown vertex '{}'", e.source))
            })?;
            let to = *index_of.get(&e.target).ok_or_else(|| {
                SimError::GraphUnloadable(format!("edge references unknown vertex '{}'", e.target))
            })?;
            if !e.latency.is_finite() || e.latency < 0.0 {
                return Err(SimError::GraphUnloadable(format!(
                    "edge '{}'->'{}': latency {} must be finite and >= 0",
                    e.source, e.target, e.latency
                )));
            }
            if !e.jitter.is_finite() || e.jitter < 0.0 {
                return Err(SimError::GraphUnloadable(format!(
                    "edge '{}'->'{}': jitter {} must be finite and >= 0",
                    e.source, e.target, e.jitter
                )));
            }
            check_loss_rate(e.packetloss, &format!("edge '{}'->'{}'", e.source, e.target))?;
            adj[from].push((edges.len(), to));
            debug!(edge = edges.len(), from, to, latency = e.latency, "发现边");
            edges.push(Edge {
                from,
                to,
                latency: e.latency,
                jitter: e.jitter,
                packet_loss: e.packetloss,
            });
        }

        Ok(Graph {
            vertices,
            edges,
            adj,
            edge_weights: Vec::new(),
        })
    }

    /// 强连通性校验：正、反两个方向各做一次 BFS，都必须覆盖全图。
    /// 报文要能双向送达，弱连通是不够的。
    pub fn check_strongly_connected(&self) -> Result<(), SimError> {
        let n = self.vertices.len();
        let mut forward: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); n];
        for e in &self.edges {
            forward[e.from].push(e.to);
            reverse[e.to].push(e.from);
        }

        for (next_hops, direction) in [(&forward, "forward"), (&reverse, "reverse")] {
            let reached = bfs_reach_count(next_hops);
            if reached != n {
                return Err(SimError::UnconnectedTopology(format!(
                    "{} of {} vertices unreachable in {direction} direction",
                    n - reached,
                    n
                )));
            }
        }
        Ok(())
    }

    /// 把每条边的 `latency` 物化为最短路径度量向量。
    pub fn extract_edge_weights(&mut self) {
        self.edge_weights = self.edges.iter().map(|e| e.latency).collect();
    }

    pub fn vertex(&self, index: usize) -> &Vertex {
        &self.vertices[index]
    }

    pub fn edge(&self, index: usize) -> &Edge {
        &self.edges[index]
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// 全部兴趣点顶点的下标。
    pub fn poi_vertices(&self) -> Vec<usize> {
        (0..self.vertices.len())
            .filter(|&v| self.vertices[v].is_poi)
            .collect()
    }

    /// Dijkstra 最短路径（度量为边权向量），返回途经的顶点序列与边序列。
    /// 同距离平局按顶点下标裁决，保证结果确定性。
    pub fn shortest_path(
        &self,
        src: usize,
        dst: usize,
    ) -> Result<(Vec<usize>, Vec<usize>), SimError> {
        debug_assert_eq!(self.edge_weights.len(), self.edges.len());
        if src == dst {
            return Ok((vec![src], Vec::new()));
        }

        let n = self.vertices.len();
        let mut dist = vec![f64::INFINITY; n];
        let mut prev: Vec<Option<(usize, usize)>> = vec![None; n]; // (顶点, 边)
        let mut heap = BinaryHeap::new();
        dist[src] = 0.0;
        heap.push(HeapEntry { dist: 0.0, vertex: src });

        while let Some(HeapEntry { dist: d, vertex: v }) = heap.pop() {
            if d > dist[v] {
                continue; // 过期条目
            }
            if v == dst {
                break;
            }
            for &(edge, to) in &self.adj[v] {
                let next = d + self.edge_weights[edge];
                if next < dist[to] {
                    dist[to] = next;
                    prev[to] = Some((v, edge));
                    heap.push(HeapEntry { dist: next, vertex: to });
                }
            }
        }

        if dist[dst].is_infinite() {
            // 校验过的强连通图不该走到这里
            return Err(SimError::PathComputationFailed(format!(
                "no path from vertex {src} to vertex {dst}"
            )));
        }

        let mut vertex_seq = vec![dst];
        let mut edge_seq = Vec::new();
        let mut cursor = dst;
        while cursor != src {
            let (from, edge) = prev[cursor].ok_or_else(|| {
                SimError::PathComputationFailed(format!(
                    "broken predecessor chain at vertex {cursor}"
                ))
            })?;
            vertex_seq.push(from);
            edge_seq.push(edge);
            cursor = from;
        }
        vertex_seq.reverse();
        edge_seq.reverse();
        Ok((vertex_seq, edge_seq))
    }
}

/// 从顶点 0 出发沿邻接表 BFS，返回可达顶点数。
fn bfs_reach_count(adj: &[Vec<usize>]) -> usize {
    let mut seen = vec![false; adj.len()];
    let mut q: VecDeque<usize> = VecDeque::new();
    seen[0] = true;
    q.push_back(0);
    let mut reached = 1usize;
    while let Some(v) = q.pop_front() {
        for &to in &adj[v] {
            if !seen[to] {
                seen[to] = true;
                reached += 1;
                q.push_back(to);
            }
        }
    }
    reached
}

/// Dijkstra 堆条目。权重有限且非负（加载期校验），比较总是良定义的。
struct HeapEntry {
    dist: f64,
    vertex: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then(self.vertex.cmp(&other.vertex))
            .reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.vertex == other.vertex
    }
}

impl Eq for HeapEntry {}
