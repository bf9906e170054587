//! 运动命令管线
//!
//! `set_velocity` / `set_power` / `stop` 共享一个单飞作用域：新命令取消并等待
//! 上一个命令结束后才开始执行。
//!
//! - `set_velocity`：没有控制计划时透传给被控底盘（开环）；否则检查整定状态，
//!   按需启动控制循环，写入设定值后恢复运行
//! - `set_power`：暂停控制循环后透传
//! - `stop`：暂停控制循环、设定值清零后停止底盘
//!
//! 对被控底盘的调用都在聚合锁之外进行。

use crate::error::BaseError;
use crate::sensor_base::{Region, SensorBase};
use crate::tuning::tuning_status;
use nalgebra::Vector3;
use scb_components::{Base, BaseProperties, CancelToken, ComponentError, Extra, Geometry};
use scb_control::LoopState;
use tracing::{debug, warn};

impl SensorBase {
    /// 以目标速度运动（线速度 mm/s，角速度 deg/s）
    ///
    /// 只使用 `linear.y` 和 `angular.z`。请求自动整定时返回
    /// [`BaseError::TuningInProgress`] 或 [`BaseError::TunedValuesReady`]。
    pub fn set_velocity(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        extra: Option<&Extra>,
    ) -> Result<(), BaseError> {
        let op = self.shared.ops.begin(token)?;
        let token = op.token();

        let base = {
            let mut guard = self.shared.region.lock();
            let Region {
                base,
                plan,
                control_loop,
                configured_pid,
                ..
            } = &mut *guard;
            let base = base.clone().ok_or(BaseError::NotConfigured)?;

            match plan {
                Some(plan) => {
                    tuning_status(&configured_pid[..], &plan.tuned.snapshot())
                        .into_result(&self.shared.name)?;
                    if !control_loop.is_present() {
                        control_loop.start(plan, self.endpoint())?;
                    }
                    let (linear_mps, angular_dps) = (linear.y / 1000.0, angular.z);
                    debug!(
                        "{}: setpoints linear {:.4} m/s, angular {:.4} deg/s",
                        self.shared.name, linear_mps, angular_dps
                    );
                    control_loop.update_setpoints(plan, linear_mps, angular_dps)?;
                    control_loop.resume()?;
                    return Ok(());
                },
                None => base,
            }
        };

        warn!(
            "{}: no control_parameters configured, setting velocity on {} without feedback",
            self.shared.name,
            base.name()
        );
        base.set_velocity(token, linear, angular, extra)?;
        Ok(())
    }

    /// 以功率比例驱动（暂停控制循环）
    pub fn set_power(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        extra: Option<&Extra>,
    ) -> Result<(), BaseError> {
        let op = self.shared.ops.begin(token)?;
        let base = {
            let region = self.shared.region.lock();
            if region.control_loop.state().is_some_and(|s| s != LoopState::Stopped) {
                region.control_loop.pause()?;
            }
            region.base.clone().ok_or(BaseError::NotConfigured)?
        };
        base.set_power(op.token(), linear, angular, extra)?;
        Ok(())
    }

    /// 停止
    pub fn stop(&self, token: &CancelToken, extra: Option<&Extra>) -> Result<(), BaseError> {
        let op = self.shared.ops.begin(token)?;
        self.stop_in(op.token(), extra)
    }

    /// 在已登记的命令内停止（关闭流程也使用）
    pub(crate) fn stop_in(&self, token: &CancelToken, extra: Option<&Extra>) -> Result<(), BaseError> {
        let base = {
            let region = self.shared.region.lock();
            let base = region.base.clone().ok_or(BaseError::NotConfigured)?;
            if let Some(plan) = &region.plan
                && region.control_loop.state().is_some_and(|s| s != LoopState::Stopped)
            {
                region.control_loop.pause()?;
                region.control_loop.update_setpoints(plan, 0.0, 0.0)?;
            }
            base
        };
        base.stop(token, extra)?;
        Ok(())
    }

    /// 底盘是否在运动
    pub fn is_moving(&self, token: &CancelToken) -> Result<bool, BaseError> {
        Ok(self.base_handle()?.is_moving(token)?)
    }

    /// 被控底盘的物理属性
    pub fn properties(&self, token: &CancelToken, extra: Option<&Extra>) -> Result<BaseProperties, BaseError> {
        Ok(self.base_handle()?.properties(token, extra)?)
    }

    /// 被控底盘的几何体
    pub fn geometries(&self, token: &CancelToken, extra: Option<&Extra>) -> Result<Vec<Geometry>, BaseError> {
        Ok(self.base_handle()?.geometries(token, extra)?)
    }

    fn component_error(&self, err: BaseError) -> ComponentError {
        match err {
            BaseError::Component(e) => e,
            other => ComponentError::hardware(self.shared.name.as_str(), other.to_string()),
        }
    }
}

/// 作为普通底盘使用时，非组件错误转换为 [`ComponentError::Hardware`]
impl Base for SensorBase {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn set_power(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        extra: Option<&Extra>,
    ) -> Result<(), ComponentError> {
        SensorBase::set_power(self, token, linear, angular, extra).map_err(|e| self.component_error(e))
    }

    fn set_velocity(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        extra: Option<&Extra>,
    ) -> Result<(), ComponentError> {
        SensorBase::set_velocity(self, token, linear, angular, extra).map_err(|e| self.component_error(e))
    }

    fn stop(&self, token: &CancelToken, extra: Option<&Extra>) -> Result<(), ComponentError> {
        SensorBase::stop(self, token, extra).map_err(|e| self.component_error(e))
    }

    fn is_moving(&self, token: &CancelToken) -> Result<bool, ComponentError> {
        SensorBase::is_moving(self, token).map_err(|e| self.component_error(e))
    }

    fn properties(&self, token: &CancelToken, extra: Option<&Extra>) -> Result<BaseProperties, ComponentError> {
        SensorBase::properties(self, token, extra).map_err(|e| self.component_error(e))
    }

    fn geometries(&self, token: &CancelToken, extra: Option<&Extra>) -> Result<Vec<Geometry>, ComponentError> {
        SensorBase::geometries(self, token, extra).map_err(|e| self.component_error(e))
    }
}
