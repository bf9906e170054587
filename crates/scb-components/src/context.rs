//! 取消令牌
//!
//! 每个运动命令携带一个 `CancelToken`。新命令到来时，旧命令的令牌被取消，
//! 组件在阻塞操作中轮询令牌并尽早返回 [`ComponentError::Cancelled`]。
//!
//! 令牌可以派生子令牌：父令牌取消时，所有子令牌同时视为已取消。
//!
//! # 示例
//!
//! ```rust
//! use scb_components::CancelToken;
//!
//! let parent = CancelToken::new();
//! let child = parent.child();
//! assert!(!child.is_cancelled());
//!
//! parent.cancel();
//! assert!(child.is_cancelled());
//! ```

use crate::error::ComponentError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 协作式取消令牌
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    /// 本令牌自身的取消标志
    flag: Arc<AtomicBool>,
    /// 父令牌（父令牌取消时本令牌也视为取消）
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    /// 创建新的（未取消）令牌
    pub fn new() -> Self {
        Self::default()
    }

    /// 派生子令牌
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// 取消本令牌（以及所有由它派生的子令牌）
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// 是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// 已取消时返回 `Err(ComponentError::Cancelled)`
    pub fn check(&self) -> Result<(), ComponentError> {
        if self.is_cancelled() {
            Err(ComponentError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_new() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_token_clone_shares_flag() {
        let token = CancelToken::new();
        let cloned = token.clone();
        token.cancel();
        assert!(cloned.is_cancelled());
        assert_eq!(cloned.check(), Err(ComponentError::Cancelled));
    }

    #[test]
    fn test_child_cancelled_by_parent() {
        let root = CancelToken::new();
        let child = root.child();
        let grandchild = child.child();

        assert!(!grandchild.is_cancelled());
        root.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_touch_parent() {
        let root = CancelToken::new();
        let child = root.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }
}
