// crates/of_compute/src/cache.rs

//! 内核程序缓存
//!
//! 以 [`KernelKey`] 为键的有界 LRU。相同的键总是返回同一个
//! `Arc<KernelProgram>`，命中时不重新编译；容量满时淘汰最久未用的程序。

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::kernel::KernelKey;

/// 内核程序缓存
pub struct ProgramCache<P> {
    programs: LruCache<KernelKey, Arc<P>>,
    hits: u64,
    misses: u64,
}

impl<P> ProgramCache<P> {
    /// 创建缓存，容量为 0 时按 1 处理
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            programs: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// 获取或编译
    ///
    /// 返回程序以及是否命中缓存。编译失败时不写入缓存。
    pub fn get_or_try_insert<E, F>(&mut self, key: KernelKey, compile: F) -> Result<(Arc<P>, bool), E>
    where
        F: FnOnce() -> Result<Arc<P>, E>,
    {
        if let Some(program) = self.programs.get(&key) {
            self.hits += 1;
            log::debug!("内核缓存命中: {}", key);
            return Ok((Arc::clone(program), true));
        }

        self.misses += 1;
        log::debug!("内核缓存未命中: {}", key);
        let program = compile()?;
        if let Some((evicted, _)) = self.programs.push(key, Arc::clone(&program)) {
            log::debug!("内核缓存淘汰: {}", evicted);
        }
        Ok((program, false))
    }

    /// 查看而不更新使用顺序
    pub fn peek(&self, key: &KernelKey) -> Option<&Arc<P>> {
        self.programs.peek(key)
    }

    /// 是否包含
    pub fn contains(&self, key: &KernelKey) -> bool {
        self.programs.contains(key)
    }

    /// 已缓存的程序数
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// 容量
    pub fn capacity(&self) -> usize {
        self.programs.cap().get()
    }

    /// 命中次数
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// 未命中次数
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// 已缓存的键，从最近使用到最久未用
    pub fn keys(&self) -> Vec<KernelKey> {
        self.programs.iter().map(|(k, _)| k.clone()).collect()
    }

    /// 清空缓存
    pub fn clear(&mut self) {
        self.programs.clear();
    }
}
