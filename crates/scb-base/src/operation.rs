//! 单飞（single-flight）命令管理
//!
//! 同一时刻只有一个运动命令在执行。新命令开始前取消当前命令，
//! 并等待它返回；因此最后到达的命令总是最后生效。
//!
//! 等待上一个命令时不持有内部锁。关闭标志是原子量，读取不需要任何锁，
//! 持有聚合锁时也可以检查。
//!
//! 关闭后所有新命令立即返回 [`BaseError::Closed`]。

use crate::error::BaseError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use scb_components::CancelToken;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

struct RunningOp {
    token: CancelToken,
    done: Receiver<()>,
}

/// 单飞命令管理器
#[derive(Default)]
pub struct OperationManager {
    closed: AtomicBool,
    current: Mutex<Option<RunningOp>>,
}

/// 正在执行的命令
///
/// Drop 时通知管理器命令已结束。
pub struct OperationGuard {
    token: CancelToken,
    _done: Sender<()>,
}

impl OperationGuard {
    /// 本命令的取消令牌
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl OperationManager {
    /// 创建管理器
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新命令：取消并等待当前命令，然后登记新命令
    ///
    /// 新命令的令牌是 `parent` 的子令牌。
    pub fn begin(&self, parent: &CancelToken) -> Result<OperationGuard, BaseError> {
        self.install(parent, false)
    }

    /// 关闭：取消并等待当前命令，登记最后一个命令（关闭流程本身）
    ///
    /// 已关闭时返回 [`BaseError::Closed`]。
    pub fn shutdown(&self) -> Result<OperationGuard, BaseError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(BaseError::Closed);
        }
        self.install(&CancelToken::new(), true)
    }

    /// 是否已关闭（不加锁）
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn install(&self, parent: &CancelToken, closing: bool) -> Result<OperationGuard, BaseError> {
        loop {
            let previous = {
                let mut current = self.current.lock();
                if !closing && self.is_closed() {
                    return Err(BaseError::Closed);
                }
                match current.take() {
                    Some(previous) => previous,
                    None => {
                        let (done_tx, done_rx) = crossbeam_channel::bounded(0);
                        let token = parent.child();
                        *current = Some(RunningOp {
                            token: token.clone(),
                            done: done_rx,
                        });
                        return Ok(OperationGuard {
                            token,
                            _done: done_tx,
                        });
                    },
                }
            };

            previous.token.cancel();
            // 发送端随 guard 一起 drop，recv 返回 Disconnected
            let _ = previous.done.recv();
            debug!("Previous movement command finished after cancellation");
        }
    }
}
