use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{ConfigurationError, SelectionError};
use crate::load_balancer::Upstream;

/// 固定成员的轮询池。游标只增不减，取模得到下标。
pub struct UpstreamPool<U: ?Sized> {
    members: Vec<Arc<U>>,
    current: AtomicUsize,
}

impl<U: Upstream + ?Sized> UpstreamPool<U> {
    pub fn new(members: Vec<Arc<U>>) -> Result<Self, ConfigurationError> {
        if members.is_empty() {
            return Err(ConfigurationError::EmptyUpstreams);
        }
        Ok(Self {
            members,
            current: AtomicUsize::new(0),
        })
    }

    /// 选出下一个存活的上游。
    ///
    /// 每次尝试都领取一个游标值，跳过的死节点同样消耗游标；
    /// 最多尝试一整轮，全部不可用时返回 `Exhausted`。
    pub fn select(&self) -> Result<Arc<U>, SelectionError> {
        let len = self.members.len();
        for _ in 0..len {
            let index = self.current.fetch_add(1, Ordering::Relaxed) % len;
            let candidate = &self.members[index];
            if candidate.is_alive() {
                return Ok(candidate.clone());
            }
        }
        Err(SelectionError::Exhausted { members: len })
    }

    pub fn members(&self) -> &[Arc<U>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}
