use parking_lot::RwLock;
use reqwest::Url;

/// 节点的可变状态，只能在节点自身的锁内读写
#[derive(Debug, Clone, Copy)]
struct NodeState {
    active: bool,
    weight: f64,
}

/// 后端节点
///
/// 地址在创建后不可变；`active` 和 `weight` 由健康检查、请求分发
/// 以及堆修复共同修改。
#[derive(Debug)]
pub struct Node {
    address: Url,
    state: RwLock<NodeState>,
}

impl Node {
    /// 创建新节点，初始为活跃状态
    pub fn new(address: Url, weight: f64) -> Self {
        Self {
            address,
            state: RwLock::new(NodeState {
                active: true,
                weight,
            }),
        }
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    pub fn is_active(&self) -> bool {
        self.state.read().active
    }

    pub fn weight(&self) -> f64 {
        self.state.read().weight
    }

    /// 根据探测结果更新节点状态
    ///
    /// 不可达时权重除以3；可达且权重小于1时权重翻倍，用于恢复。
    pub fn set_health(&self, reachable: bool) {
        let mut state = self.state.write();
        state.active = reachable;
        if !reachable {
            state.weight /= 3.0;
        } else if state.weight < 1.0 {
            state.weight *= 2.0;
        }
    }

    pub(crate) fn scale_weight(&self, factor: f64) {
        self.state.write().weight *= factor;
    }
}
