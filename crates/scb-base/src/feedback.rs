//! 反馈端点
//!
//! 控制循环通过 [`FeedbackEndpoint`] 读取速度测量值、写入功率命令。
//!
//! - `state`：`[linear_velocity.y (m/s), angular_velocity.z (deg/s)]`，任一读数失败即返回错误
//! - `set_state`：控制循环存在但未运行时为空操作；否则
//!   `angular *= sign(linear)` 后调用底盘的 `set_power`
//!
//! 写入在聚合锁内完成，与命令管线串行化。

use crate::error::BaseError;
use crate::sensor_base::Shared;
use nalgebra::Vector3;
use scb_components::CancelToken;
use scb_control::{ControlError, Controllable};
use std::sync::Weak;
use tracing::debug;

/// 符号函数（负数和 `-0.0` 为 -1，其余为 1）
pub fn sign(x: f64) -> f64 {
    if x.is_sign_negative() { -1.0 } else { 1.0 }
}

/// 把控制输出转换为（线功率，角功率）
///
/// 倒车时翻转角功率，使转向（顺/逆时针）与前进时一致。
pub fn actuation(signals: &[f64]) -> Result<(f64, f64), ControlError> {
    match signals {
        [linear, angular, ..] => Ok((*linear, *angular * sign(*linear))),
        _ => Err(ControlError::DimensionMismatch {
            expected: 2,
            actual: signals.len(),
        }),
    }
}

/// 控制循环端点
///
/// 只持有聚合的弱引用，控制循环线程不延长聚合的生命周期。
pub struct FeedbackEndpoint {
    shared: Weak<Shared>,
}

impl FeedbackEndpoint {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }
}

impl Controllable for FeedbackEndpoint {
    type Error = BaseError;

    fn state(&self, token: &CancelToken) -> Result<Vec<f64>, Self::Error> {
        let shared = self.shared.upgrade().ok_or(BaseError::Closed)?;
        let sensor = shared
            .region
            .lock()
            .sensors
            .velocities
            .clone()
            .ok_or(BaseError::NotConfigured)?;

        let linear = sensor.linear_velocity(token)?;
        let angular = sensor.angular_velocity(token)?;
        debug!("State from {}: linear {:.4} m/s, angular {:.4} deg/s", sensor.name(), linear.y, angular.z);
        Ok(vec![linear.y, angular.z])
    }

    fn set_state(&self, token: &CancelToken, signals: &[f64]) -> Result<(), Self::Error> {
        let shared = self.shared.upgrade().ok_or(BaseError::Closed)?;
        let region = shared.region.lock();

        if region.control_loop.is_present() && !region.control_loop.running() {
            return Ok(());
        }

        let base = region.base.as_ref().ok_or(BaseError::NotConfigured)?;
        let (linear, angular) = actuation(signals)?;
        debug!("Setting power on {}: linear {:.4}, angular {:.4}", base.name(), linear, angular);
        base.set_power(
            token,
            Vector3::new(0.0, linear, 0.0),
            Vector3::new(0.0, 0.0, angular),
            None,
        )?;
        Ok(())
    }
}
