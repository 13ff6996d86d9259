use super::node::Node;
use mulberry_core::{Config, ConfigError, SelectionMode};
use parking_lot::Mutex;
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// 节点池
///
/// 节点数组按隐式二叉堆组织（位置 `i` 的子节点为 `2i+1` 和 `2i+2`），
/// 按权重构成最大堆。堆结构（哪个节点在哪个位置）由池级互斥锁保护，
/// 节点自身的状态由节点锁保护。加锁顺序始终是先池后节点。
pub struct NodePool {
    nodes: Mutex<Vec<Arc<Node>>>,
    mode: SelectionMode,
    total_requests: AtomicU64,
}

impl NodePool {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            mode,
            total_requests: AtomicU64::new(0),
        }
    }

    /// 根据配置创建节点池，节点按配置顺序插入
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut pool = Self::new(config.settings.selection_mode);
        for url in config.node_urls()? {
            pool.add_node(Node::new(url, config.settings.initial_weight));
        }
        Ok(pool)
    }

    /// 添加节点，仅在启动阶段使用，不做堆修复
    pub fn add_node(&mut self, node: Node) -> Arc<Node> {
        let node = Arc::new(node);
        debug!("Configured node: {}", node.address());
        self.nodes.get_mut().push(node.clone());
        node
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    /// 当前的节点顺序
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.lock().clone()
    }

    pub fn active_count(&self) -> usize {
        self.nodes.lock().iter().filter(|n| n.is_active()).count()
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// 选择当前最优节点
    ///
    /// `Root` 模式直接返回堆顶，即使它已经不活跃；`Fallback` 模式在堆顶
    /// 不活跃时返回数组中第一个活跃节点，没有活跃节点时返回 `None`。
    pub fn select_best(&self) -> Option<Arc<Node>> {
        let nodes = self.nodes.lock();
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let root = nodes.first()?;
        match self.mode {
            SelectionMode::Root => Some(root.clone()),
            SelectionMode::Fallback => {
                if root.is_active() {
                    return Some(root.clone());
                }
                let fallback = nodes.iter().find(|n| n.is_active()).cloned();
                if let Some(node) = &fallback {
                    debug!(
                        "Root node {} is inactive, falling back to {}",
                        root.address(),
                        node.address()
                    );
                }
                fallback
            }
        }
    }

    /// 从 `index` 开始修复堆
    pub fn repair(&self, index: usize, is_root: bool) {
        let mut nodes = self.nodes.lock();
        heapify(&mut nodes, index, is_root);
    }

    /// 请求成功后从堆顶修复，衰减堆顶节点的权重
    pub fn decay_root(&self) {
        self.repair(0, true);
    }

    /// 请求成功后衰减服务该请求的节点
    ///
    /// 节点仍在堆顶时等同于 `decay_root`；并发请求可能已经把它换下堆顶，
    /// 此时只从它当前的位置修复，不再衰减新的堆顶。
    pub fn decay_served(&self, node: &Arc<Node>) {
        let mut nodes = self.nodes.lock();
        match nodes.iter().position(|n| Arc::ptr_eq(n, node)) {
            Some(0) => heapify(&mut nodes, 0, true),
            Some(index) => {
                debug!(
                    "Served node {} is no longer root (pos {}), skipping decay",
                    node.address(),
                    index
                );
                heapify(&mut nodes, index, false);
            }
            None => {}
        }
    }

    /// 从节点当前所在的位置修复堆
    pub fn repair_node(&self, node: &Arc<Node>) {
        let mut nodes = self.nodes.lock();
        if let Some(index) = nodes.iter().position(|n| Arc::ptr_eq(n, node)) {
            heapify(&mut nodes, index, false);
        }
    }

    /// 设置指定地址节点的健康状态，返回是否找到该节点
    pub fn set_node_status(&self, address: &Url, active: bool) -> bool {
        let nodes = self.nodes.lock();
        match nodes.iter().find(|n| n.address() == address) {
            Some(node) => {
                node.set_health(active);
                true
            }
            None => false,
        }
    }

    /// 将节点标记为失效，并从它当前的位置修复堆
    pub fn mark_dead(&self, address: &Url) {
        let mut nodes = self.nodes.lock();
        if let Some(index) = nodes.iter().position(|n| n.address() == address) {
            nodes[index].set_health(false);
            heapify(&mut nodes, index, false);
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let nodes = self.nodes.lock();
        PoolSnapshot {
            mode: self.mode,
            total_requests: self.total_requests(),
            nodes: nodes
                .iter()
                .enumerate()
                .map(|(position, node)| NodeSnapshot {
                    position,
                    address: node.address().to_string(),
                    active: node.is_active(),
                    weight: node.weight(),
                })
                .collect(),
        }
    }
}

/// 加权最大堆修复
///
/// 1. `is_root` 时先将 `idx` 处节点权重减半（衰减）。
/// 2. 只有存在且活跃的子节点参与比较，权重严格更大者胜出。
/// 3. 若 `idx` 仍然最大，衰减保留。
/// 4. 否则撤销衰减，交换并从新位置继续下沉。
/// 5. 无论是否交换，权重小于1的子节点都会继续向下修复。
fn heapify(nodes: &mut [Arc<Node>], idx: usize, is_root: bool) {
    let len = nodes.len();
    if idx >= len {
        return;
    }

    let left = 2 * idx + 1;
    let right = 2 * idx + 2;
    let mut largest = idx;

    if is_root {
        nodes[idx].scale_weight(0.5);
    }

    if left < len && nodes[left].is_active() && nodes[left].weight() > nodes[largest].weight() {
        largest = left;
    }

    if right < len && nodes[right].is_active() && nodes[right].weight() > nodes[largest].weight() {
        largest = right;
    }

    if largest != idx {
        if is_root {
            nodes[idx].scale_weight(2.0);
        }

        debug!(
            "Heap swap: {} (pos {}) <-> {} (pos {})",
            nodes[idx].address(),
            idx,
            nodes[largest].address(),
            largest
        );
        nodes.swap(idx, largest);
        heapify(nodes, largest, false);
    }

    if left < len && nodes[left].weight() < 1.0 {
        heapify(nodes, left, false);
    }

    if right < len && nodes[right].weight() < 1.0 {
        heapify(nodes, right, false);
    }
}

/// 节点池快照（用于日志和CLI展示）
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub mode: SelectionMode,
    pub total_requests: u64,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub position: usize,
    pub address: String,
    pub active: bool,
    pub weight: f64,
}

impl PoolSnapshot {
    pub fn active_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.active).count()
    }
}
