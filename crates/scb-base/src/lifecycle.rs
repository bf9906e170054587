//! 控制循环生命周期
//!
//! [`LoopSlot`] 持有（最多）一个活动的控制循环。所有方法都是非阻塞的，
//! 可以在聚合锁内调用；等待后台线程退出只通过 [`LoopSlot::request_stop`]
//! 返回的 [`StopHandle`] 在锁外完成。

use crate::control::LoopPlan;
use crate::error::BaseError;
use scb_control::{ControlLoop, Controllable, LoopState, StopHandle};
use std::sync::Arc;
use tracing::{info, warn};

/// 控制循环槽位
#[derive(Debug, Default)]
pub struct LoopSlot {
    active: Option<ControlLoop>,
}

impl LoopSlot {
    /// 是否存在控制循环（包括已停止但尚未移除的）
    pub fn is_present(&self) -> bool {
        self.active.is_some()
    }

    /// 控制循环是否在运行
    pub fn running(&self) -> bool {
        self.active.as_ref().is_some_and(ControlLoop::running)
    }

    /// 控制循环状态
    pub fn state(&self) -> Option<LoopState> {
        self.active.as_ref().map(ControlLoop::state)
    }

    /// 当前设定值
    pub fn setpoints(&self) -> Option<Vec<f64>> {
        self.active.as_ref().map(ControlLoop::setpoints)
    }

    /// 控制循环
    pub fn get(&self) -> Option<&ControlLoop> {
        self.active.as_ref()
    }

    /// 按计划创建并启动控制循环
    ///
    /// 失败时槽位保持为空，之后的命令可以重试。
    pub fn start<C>(&mut self, plan: &LoopPlan, controllable: Arc<C>) -> Result<(), BaseError>
    where
        C: Controllable + 'static,
    {
        let mut control = ControlLoop::new(plan.config.clone(), controllable, plan.tuned.clone())
            .map_err(BaseError::LoopStart)?;
        if let Err(e) = control.start() {
            // 不在锁内 join；worker 看到 Stopped 后自行退出
            drop(control.request_stop());
            return Err(BaseError::LoopStart(e));
        }
        self.active = Some(control);
        Ok(())
    }

    /// 暂停（无控制循环时为空操作）
    pub fn pause(&self) -> Result<(), BaseError> {
        match &self.active {
            Some(control) => control.pause().map_err(BaseError::from),
            None => Ok(()),
        }
    }

    /// 恢复
    pub fn resume(&self) -> Result<(), BaseError> {
        match &self.active {
            Some(control) => control.resume().map_err(BaseError::from),
            None => Ok(()),
        }
    }

    /// 更新线速度 / 角速度设定值
    pub fn update_setpoints(&self, plan: &LoopPlan, linear: f64, angular: f64) -> Result<(), BaseError> {
        let Some(control) = &self.active else {
            return Ok(());
        };
        let (linear_block, angular_block) = plan.blocks.setpoints().ok_or_else(|| {
            BaseError::Control(scb_control::ControlError::InvalidConfig(
                "plan must have exactly two constant blocks".to_string(),
            ))
        })?;
        control.update_constant_block(linear_block, linear)?;
        control.update_constant_block(angular_block, angular)?;
        Ok(())
    }

    /// 请求停止（不阻塞），控制循环留在槽位中（状态为 `Stopped`）
    pub fn request_stop(&mut self) -> Option<StopHandle> {
        self.active.as_mut().and_then(ControlLoop::request_stop)
    }

    /// 移除控制循环
    pub fn take(&mut self) -> Option<ControlLoop> {
        self.active.take()
    }
}

/// 等待后台线程退出；失败只记录，不中断调用方的关闭流程
pub fn join_stopped(handle: Option<StopHandle>, base_name: &str) -> Result<(), BaseError> {
    match handle {
        Some(handle) => match handle.join() {
            Ok(()) => {
                info!("Control loop for {} stopped", base_name);
                Ok(())
            },
            Err(e) => {
                warn!("Control loop for {} did not shut down cleanly: {}", base_name, e);
                Err(e.into())
            },
        },
        None => Ok(()),
    }
}
