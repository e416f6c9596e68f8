//! 线程级串行化：同一 thread_id 的调用按到达顺序逐个执行，不同线程互不阻塞
//!
//! tokio 的 Mutex 是公平锁（FIFO），等待者按到达顺序获得锁。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// thread_id -> 异步互斥锁
#[derive(Debug, Default)]
pub struct ThreadLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取某线程的独占权；guard 释放即解锁
    pub async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // 顺带清理没有人持有的旧锁
            map.retain(|id, l| id == thread_id || Arc::strong_count(l) > 1);
            map.entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// 当前登记的线程数
    pub fn len(&self) -> usize {
        self.locks.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
