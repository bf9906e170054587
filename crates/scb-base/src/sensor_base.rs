//! 传感器闭环底盘
//!
//! [`SensorBase`] 是聚合根：一把互斥锁保护全部可变状态（传感器角色、航向来源、
//! 底盘句柄、控制循环计划和实例、PID 参数、控制频率）。
//!
//! # 锁顺序
//!
//! 1. `reconfigure_lock`（串行化重配置）
//! 2. `OperationManager` 内部锁（串行化运动命令）
//! 3. `region`（聚合状态）
//!
//! `OperationManager` 等待上一个命令结束时不持有内部锁，关闭标志是原子量，
//! 持有 `region` 时可以直接读取。
//!
//! 持有 `region` 时不等待控制循环线程退出：停止分为 `request_stop`（锁内）
//! 和 `join`（锁外）两步。控制循环线程写入时也要获取 `region`。
//!
//! # 示例
//!
//! ```rust
//! use scb_base::prelude::*;
//! use scb_components::mock::{MockBase, MockMovementSensor};
//! use std::sync::Arc;
//!
//! let mut deps = Dependencies::new();
//! deps.add_movement_sensor(Arc::new(MockMovementSensor::orientation_only("imu")))
//!     .add_base(Arc::new(MockBase::new("wheels")));
//!
//! let config = ScbConfig::new(["imu"], "wheels");
//! let scb = SensorBase::new("scb", &config, &deps).unwrap();
//! assert_eq!(scb.heading().unwrap(), (0.0, true));
//! scb.close().unwrap();
//! ```

use crate::config::ScbConfig;
use crate::control::{LoopPlan, build_plan};
use crate::error::BaseError;
use crate::feedback::FeedbackEndpoint;
use crate::heading::HeadingSource;
use crate::lifecycle::{LoopSlot, join_stopped};
use crate::operation::OperationManager;
use crate::roles::{ResolvedSensors, SensorRoles, resolve_sensors};
use crate::tuning::{GET_TUNED_PID, TuningStatus, tuned_pid_response, tuning_status};
use parking_lot::Mutex;
use scb_components::{Base, CancelToken, Dependencies, Extra, MovementSensor};
use scb_control::{LoopState, LoopStats, PidConfig, PidKind};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 聚合锁保护的状态
pub(crate) struct Region {
    pub(crate) sensors: ResolvedSensors,
    pub(crate) heading: HeadingSource,
    pub(crate) base: Option<Arc<dyn Base>>,
    pub(crate) plan: Option<LoopPlan>,
    pub(crate) control_loop: LoopSlot,
    pub(crate) configured_pid: [PidConfig; 2],
    pub(crate) control_freq: f64,
}

impl Region {
    /// 未配置状态（构造中或重配置失败后）
    fn unconfigured() -> Self {
        Self {
            sensors: ResolvedSensors::default(),
            heading: HeadingSource::None,
            base: None,
            plan: None,
            control_loop: LoopSlot::default(),
            configured_pid: PidKind::ALL.map(PidConfig::untuned),
            control_freq: crate::config::DEFAULT_CONTROL_FREQUENCY_HZ,
        }
    }
}

pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) region: Mutex<Region>,
    pub(crate) ops: OperationManager,
    reconfigure_lock: Mutex<()>,
}

/// 传感器闭环底盘
///
/// 实现 [`Base`]：`set_velocity` 在配置了 PID 参数时走闭环控制，
/// 否则透传给被控底盘。Drop 时自动关闭。
pub struct SensorBase {
    pub(crate) shared: Arc<Shared>,
}

impl SensorBase {
    /// 创建并配置
    pub fn new(
        name: impl Into<String>,
        config: &ScbConfig,
        deps: &Dependencies,
    ) -> Result<Self, BaseError> {
        let scb = Self {
            shared: Arc::new(Shared {
                name: name.into(),
                region: Mutex::new(Region::unconfigured()),
                ops: OperationManager::new(),
                reconfigure_lock: Mutex::new(()),
            }),
        };
        scb.reconfigure(config, deps)?;
        Ok(scb)
    }

    /// 组件名称
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// 重新配置
    ///
    /// 先停止现有控制循环，再重新解析传感器和底盘、构建控制计划，
    /// 最后整体替换聚合状态。失败时聚合处于未配置状态，运动命令返回
    /// [`BaseError::NotConfigured`]，直到下一次成功的重配置。
    ///
    /// 旧控制循环线程异常退出时新配置照常生效，错误在最后返回。
    pub fn reconfigure(&self, config: &ScbConfig, deps: &Dependencies) -> Result<(), BaseError> {
        let _serial = self.shared.reconfigure_lock.lock();
        if self.shared.ops.is_closed() {
            return Err(BaseError::Closed);
        }
        config.validate(&self.shared.name)?;

        let handle = self.shared.region.lock().control_loop.request_stop();
        let stopped = join_stopped(handle, &self.shared.name);

        let token = CancelToken::new();
        let mut next = match self.resolve(config, deps, &token) {
            Ok(region) => region,
            Err(e) => {
                *self.shared.region.lock() = Region::unconfigured();
                error!("Failed to configure {}: {}", self.shared.name, e);
                return Err(e);
            },
        };

        let mut region = self.shared.region.lock();
        if self.shared.ops.is_closed() {
            return Err(BaseError::Closed);
        }
        if let Some(plan) = next.plan.as_ref().filter(|p| p.auto_tune) {
            info!("{}: starting control loop for PID auto-tuning", self.shared.name);
            if let Err(e) = next.control_loop.start(plan, self.endpoint()) {
                *region = Region::unconfigured();
                return Err(e);
            }
        }
        *region = next;
        stopped
    }

    fn resolve(
        &self,
        config: &ScbConfig,
        deps: &Dependencies,
        token: &CancelToken,
    ) -> Result<Region, BaseError> {
        let name = &self.shared.name;
        let sensors = resolve_sensors(&config.movement_sensors, deps, token)?;
        let heading =
            HeadingSource::select(name, sensors.orientation.clone(), sensors.compass.clone());
        if !sensors.has_feedback() {
            return Err(BaseError::NoFeedbackSensor);
        }

        let base = deps.base(&config.base).map_err(BaseError::MissingDependency)?;
        let configured_pid = config.pid_sets();
        let control_freq = config.control_frequency();

        let plan = match (&sensors.velocities, config.control_parameters.is_empty()) {
            (Some(_), false) => Some(build_plan(
                configured_pid[0],
                configured_pid[1],
                control_freq,
                name,
            )?),
            (None, false) => {
                warn!(
                    "{}: control_parameters given but no sensor reports linear and angular velocity",
                    name
                );
                None
            },
            (_, true) => None,
        };

        Ok(Region {
            sensors,
            heading,
            base: Some(base),
            plan,
            control_loop: LoopSlot::default(),
            configured_pid,
            control_freq,
        })
    }

    pub(crate) fn endpoint(&self) -> Arc<FeedbackEndpoint> {
        Arc::new(FeedbackEndpoint::new(Arc::downgrade(&self.shared)))
    }

    pub(crate) fn base_handle(&self) -> Result<Arc<dyn Base>, BaseError> {
        self.shared.region.lock().base.clone().ok_or(BaseError::NotConfigured)
    }

    /// 当前航向 `(度, 是否支持)`，范围 `(-180, 180]`
    pub fn heading(&self) -> Result<(f64, bool), BaseError> {
        let source = self.shared.region.lock().heading.clone();
        Ok(source.heading(&CancelToken::new())?)
    }

    /// 各角色选中的传感器
    pub fn sensor_roles(&self) -> SensorRoles {
        self.shared.region.lock().sensors.roles.clone()
    }

    /// 位置传感器
    pub fn position_sensor(&self) -> Option<Arc<dyn MovementSensor>> {
        self.shared.region.lock().sensors.position.clone()
    }

    /// 是否配置了闭环控制
    pub fn has_control_loop_plan(&self) -> bool {
        self.shared.region.lock().plan.is_some()
    }

    /// 生效的控制频率（Hz）
    pub fn control_frequency(&self) -> f64 {
        self.shared.region.lock().control_freq
    }

    /// 控制循环状态（无控制循环时为 `None`）
    pub fn loop_state(&self) -> Option<LoopState> {
        self.shared.region.lock().control_loop.state()
    }

    /// 控制循环运行统计
    pub fn loop_stats(&self) -> Option<LoopStats> {
        self.shared.region.lock().control_loop.get().map(|l| l.stats())
    }

    /// 控制循环设定值 `[线速度 m/s, 角速度 deg/s]`
    pub fn setpoints(&self) -> Option<Vec<f64>> {
        self.shared.region.lock().control_loop.setpoints()
    }

    /// 自动整定状态
    pub fn tuning_status(&self) -> TuningStatus {
        let region = self.shared.region.lock();
        match &region.plan {
            Some(plan) => tuning_status(&region.configured_pid, &plan.tuned.snapshot()),
            None => TuningStatus::NotRequested,
        }
    }

    /// 自定义命令
    ///
    /// 支持 `{"get_tuned_pid": ...}`：返回 `{"control_parameters": [已整定的参数组]}`。
    pub fn do_command(&self, request: &Extra) -> Result<Extra, BaseError> {
        let mut response = Extra::new();
        if request.contains_key(GET_TUNED_PID) {
            let region = self.shared.region.lock();
            let tuned = region
                .plan
                .as_ref()
                .map(|p| p.tuned.snapshot())
                .unwrap_or_default();
            response.insert("control_parameters".to_string(), tuned_pid_response(&tuned));
        }
        Ok(response)
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.shared.ops.is_closed()
    }

    /// 关闭（幂等）
    ///
    /// 取消并等待进行中的命令，停止底盘，停止控制循环并等待其线程退出。
    /// 返回后不会再有任何执行器写入。停止底盘失败不会跳过线程等待。
    pub fn close(&self) -> Result<(), BaseError> {
        let op = match self.shared.ops.shutdown() {
            Ok(op) => op,
            Err(_) => return Ok(()),
        };

        let stop_result = match self.stop_in(op.token(), None) {
            Err(BaseError::NotConfigured) => Ok(()),
            other => other,
        };

        let handle = self.shared.region.lock().control_loop.request_stop();
        let join_result = join_stopped(handle, &self.shared.name);
        drop(self.shared.region.lock().control_loop.take());
        drop(op);

        info!("{} closed", self.shared.name);
        stop_result.and(join_result)
    }
}

impl Drop for SensorBase {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close {}: {}", self.shared.name, e);
        }
    }
}

impl std::fmt::Debug for SensorBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let region = self.shared.region.lock();
        f.debug_struct("SensorBase")
            .field("name", &self.shared.name)
            .field("roles", &region.sensors.roles)
            .field("heading", &region.heading)
            .field("closed_loop", &region.plan.is_some())
            .field("loop_state", &region.control_loop.state())
            .finish()
    }
}
