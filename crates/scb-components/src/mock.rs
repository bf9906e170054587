//! Mock 组件
//!
//! 用于测试和示例的模拟传感器与底盘，无硬件依赖。
//!
//! - [`MockMovementSensor`]：能力和读数都可以在运行时修改，可注入故障
//! - [`MockBase`]：记录所有执行器调用，`set_velocity` 可模拟阻塞并响应取消
//! - [`SimulatedDrive`]：一阶惯性底盘模型，同时实现 [`Base`] 和 [`MovementSensor`]，
//!   用于闭环调节和自动整定的端到端测试

use crate::base::{Base, BaseProperties, Extra, Geometry, Shape};
use crate::context::CancelToken;
use crate::error::ComponentError;
use crate::sensor::{MovementSensor, MovementSensorProperties};
use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Mock 传感器读数
#[derive(Debug, Clone, Copy)]
pub struct MockReadings {
    /// 姿态
    pub orientation: UnitQuaternion<f64>,
    /// 线速度（m/s）
    pub linear_velocity: Vector3<f64>,
    /// 角速度（deg/s）
    pub angular_velocity: Vector3<f64>,
    /// 罗盘航向（度）
    pub compass_heading: f64,
}

impl Default for MockReadings {
    fn default() -> Self {
        Self {
            orientation: UnitQuaternion::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            compass_heading: 0.0,
        }
    }
}

/// 模拟运动传感器
pub struct MockMovementSensor {
    name: String,
    properties: Mutex<Result<MovementSensorProperties, ComponentError>>,
    readings: Mutex<MockReadings>,
    read_failure: Mutex<Option<ComponentError>>,
    panic_reads: AtomicBool,
    property_queries: AtomicUsize,
    reads: AtomicUsize,
}

impl MockMovementSensor {
    /// 创建不具备任何能力的传感器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Mutex::new(Ok(MovementSensorProperties::default())),
            readings: Mutex::new(MockReadings::default()),
            read_failure: Mutex::new(None),
            panic_reads: AtomicBool::new(false),
            property_queries: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    /// 设置能力集合
    pub fn with_properties(self, props: MovementSensorProperties) -> Self {
        *self.properties.lock() = Ok(props);
        self
    }

    /// 能力查询总是失败
    pub fn with_failing_properties(self) -> Self {
        *self.properties.lock() = Err(ComponentError::hardware(&self.name, "properties unavailable"));
        self
    }

    /// 只支持姿态
    pub fn orientation_only(name: impl Into<String>) -> Self {
        Self::new(name).with_properties(MovementSensorProperties {
            orientation_supported: true,
            ..Default::default()
        })
    }

    /// 只支持线速度 + 角速度
    pub fn velocities_only(name: impl Into<String>) -> Self {
        Self::new(name).with_properties(MovementSensorProperties {
            linear_velocity_supported: true,
            angular_velocity_supported: true,
            ..Default::default()
        })
    }

    /// 只支持罗盘航向
    pub fn compass_only(name: impl Into<String>) -> Self {
        Self::new(name).with_properties(MovementSensorProperties {
            compass_heading_supported: true,
            ..Default::default()
        })
    }

    /// 修改读数
    pub fn update_readings(&self, f: impl FnOnce(&mut MockReadings)) {
        f(&mut self.readings.lock());
    }

    /// 设置偏航角（度）
    pub fn set_yaw_degrees(&self, yaw: f64) {
        self.update_readings(|r| {
            r.orientation = UnitQuaternion::from_euler_angles(0.0, 0.0, yaw.to_radians());
        });
    }

    /// 设置罗盘航向（度）
    pub fn set_compass_heading(&self, heading: f64) {
        self.update_readings(|r| r.compass_heading = heading);
    }

    /// 设置速度读数
    pub fn set_velocities(&self, linear: Vector3<f64>, angular: Vector3<f64>) {
        self.update_readings(|r| {
            r.linear_velocity = linear;
            r.angular_velocity = angular;
        });
    }

    /// 注入（或清除）读数故障
    pub fn fail_reads(&self, failure: Option<ComponentError>) {
        *self.read_failure.lock() = failure;
    }

    /// 读数时 panic（模拟驱动崩溃，用于测试后台线程异常退出）
    pub fn panic_on_read(&self, enabled: bool) {
        self.panic_reads.store(enabled, Ordering::Relaxed);
    }

    /// 能力查询次数
    pub fn property_query_count(&self) -> usize {
        self.property_queries.load(Ordering::Relaxed)
    }

    /// 读数次数（不含能力查询）
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn read<T>(
        &self,
        token: &CancelToken,
        supported: impl FnOnce(&MovementSensorProperties) -> bool,
        feature: &str,
        f: impl FnOnce(&MockReadings) -> T,
    ) -> Result<T, ComponentError> {
        token.check()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.panic_reads.load(Ordering::Relaxed) {
            panic!("{}: {} read crashed", self.name, feature);
        }
        if let Some(err) = self.read_failure.lock().clone() {
            return Err(err);
        }
        let supported = match &*self.properties.lock() {
            Ok(props) => supported(props),
            Err(_) => true,
        };
        if !supported {
            return Err(ComponentError::unsupported(&self.name, feature));
        }
        Ok(f(&self.readings.lock()))
    }
}

impl MovementSensor for MockMovementSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self, token: &CancelToken) -> Result<MovementSensorProperties, ComponentError> {
        token.check()?;
        self.property_queries.fetch_add(1, Ordering::Relaxed);
        self.properties.lock().clone()
    }

    fn orientation(&self, token: &CancelToken) -> Result<UnitQuaternion<f64>, ComponentError> {
        self.read(token, |p| p.orientation_supported, "orientation", |r| r.orientation)
    }

    fn linear_velocity(&self, token: &CancelToken) -> Result<Vector3<f64>, ComponentError> {
        self.read(
            token,
            |p| p.linear_velocity_supported,
            "linear velocity",
            |r| r.linear_velocity,
        )
    }

    fn angular_velocity(&self, token: &CancelToken) -> Result<Vector3<f64>, ComponentError> {
        self.read(
            token,
            |p| p.angular_velocity_supported,
            "angular velocity",
            |r| r.angular_velocity,
        )
    }

    fn compass_heading(&self, token: &CancelToken) -> Result<f64, ComponentError> {
        self.read(
            token,
            |p| p.compass_heading_supported,
            "compass heading",
            |r| r.compass_heading,
        )
    }
}

/// Mock 底盘记录的调用
#[derive(Debug, Clone, PartialEq)]
pub enum BaseCall {
    /// `set_power`
    SetPower {
        /// 线功率
        linear: Vector3<f64>,
        /// 角功率
        angular: Vector3<f64>,
    },
    /// `set_velocity`
    SetVelocity {
        /// 线速度（mm/s）
        linear: Vector3<f64>,
        /// 角速度（deg/s）
        angular: Vector3<f64>,
    },
    /// `stop`
    Stop,
}

/// 模拟底盘
///
/// 所有成功的执行器调用按顺序记录，被取消或注入故障的调用不记录。
pub struct MockBase {
    name: String,
    calls: Mutex<Vec<BaseCall>>,
    velocity_delay: Mutex<Duration>,
    failure: Mutex<Option<ComponentError>>,
}

impl MockBase {
    /// 创建模拟底盘
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Mutex::new(Vec::new()),
            velocity_delay: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
        }
    }

    /// `set_velocity` 在生效前阻塞指定时长（期间响应取消）
    pub fn set_velocity_delay(&self, delay: Duration) {
        *self.velocity_delay.lock() = delay;
    }

    /// 注入（或清除）执行器故障
    pub fn fail_with(&self, failure: Option<ComponentError>) {
        *self.failure.lock() = failure;
    }

    /// 所有已记录的调用
    pub fn calls(&self) -> Vec<BaseCall> {
        self.calls.lock().clone()
    }

    /// 最后一次调用
    pub fn last_call(&self) -> Option<BaseCall> {
        self.calls.lock().last().cloned()
    }

    /// 调用次数
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// `set_power` 调用
    pub fn power_calls(&self) -> Vec<(Vector3<f64>, Vector3<f64>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BaseCall::SetPower { linear, angular } => Some((*linear, *angular)),
                _ => None,
            })
            .collect()
    }

    /// 清空调用记录
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, token: &CancelToken, call: BaseCall) -> Result<(), ComponentError> {
        token.check()?;
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl Base for MockBase {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_power(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        _extra: Option<&Extra>,
    ) -> Result<(), ComponentError> {
        self.record(token, BaseCall::SetPower { linear, angular })
    }

    fn set_velocity(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        _extra: Option<&Extra>,
    ) -> Result<(), ComponentError> {
        let delay = *self.velocity_delay.lock();
        let deadline = Instant::now() + delay;
        while Instant::now() < deadline {
            token.check()?;
            std::thread::sleep(Duration::from_millis(1));
        }
        self.record(token, BaseCall::SetVelocity { linear, angular })
    }

    fn stop(&self, token: &CancelToken, _extra: Option<&Extra>) -> Result<(), ComponentError> {
        self.record(token, BaseCall::Stop)
    }

    fn is_moving(&self, _token: &CancelToken) -> Result<bool, ComponentError> {
        let moving = match self.calls.lock().last() {
            Some(BaseCall::SetPower { linear, angular })
            | Some(BaseCall::SetVelocity { linear, angular }) => {
                linear.norm() > 0.0 || angular.norm() > 0.0
            },
            Some(BaseCall::Stop) | None => false,
        };
        Ok(moving)
    }

    fn properties(
        &self,
        _token: &CancelToken,
        _extra: Option<&Extra>,
    ) -> Result<BaseProperties, ComponentError> {
        Ok(BaseProperties {
            width_meters: 0.3,
            turning_radius_meters: 0.0,
            wheel_circumference_meters: 0.2,
        })
    }

    fn geometries(
        &self,
        _token: &CancelToken,
        _extra: Option<&Extra>,
    ) -> Result<Vec<Geometry>, ComponentError> {
        Ok(vec![Geometry {
            label: self.name.clone(),
            pose: Isometry3::identity(),
            shape: Shape::Box {
                dims: Vector3::new(0.3, 0.4, 0.2),
            },
        }])
    }
}

/// 一阶惯性底盘模型参数
#[derive(Debug, Clone, Copy)]
pub struct DriveModel {
    /// 满功率时的线速度（m/s）
    pub max_linear_mps: f64,
    /// 满功率时的角速度（deg/s）
    pub max_angular_dps: f64,
    /// 时间常数
    pub time_constant: Duration,
}

impl Default for DriveModel {
    fn default() -> Self {
        Self {
            max_linear_mps: 1.0,
            max_angular_dps: 180.0,
            time_constant: Duration::from_millis(50),
        }
    }
}

#[derive(Debug)]
struct DriveState {
    linear_power: f64,
    angular_power: f64,
    linear_mps: f64,
    angular_dps: f64,
    yaw_deg: f64,
    last_update: Instant,
}

/// 模拟差速底盘（带速度/姿态传感器）
///
/// 速度按一阶惯性响应功率命令：`v' = (power * v_max - v) / tau`。
/// 读数时按真实经过的时间推进模型。
pub struct SimulatedDrive {
    name: String,
    model: DriveModel,
    state: Mutex<DriveState>,
}

impl SimulatedDrive {
    /// 创建模拟底盘
    pub fn new(name: impl Into<String>, model: DriveModel) -> Self {
        Self {
            name: name.into(),
            model,
            state: Mutex::new(DriveState {
                linear_power: 0.0,
                angular_power: 0.0,
                linear_mps: 0.0,
                angular_dps: 0.0,
                yaw_deg: 0.0,
                last_update: Instant::now(),
            }),
        }
    }

    /// 当前线速度（m/s）和角速度（deg/s）
    pub fn velocities(&self) -> (f64, f64) {
        let mut state = self.state.lock();
        self.advance(&mut state);
        (state.linear_mps, state.angular_dps)
    }

    /// 当前功率命令（线，角）
    pub fn powers(&self) -> (f64, f64) {
        let state = self.state.lock();
        (state.linear_power, state.angular_power)
    }

    fn advance(&self, state: &mut DriveState) {
        let now = Instant::now();
        let dt = now.duration_since(state.last_update).as_secs_f64();
        state.last_update = now;
        if dt <= 0.0 {
            return;
        }

        let tau = self.model.time_constant.as_secs_f64().max(1e-6);
        let alpha = 1.0 - (-dt / tau).exp();
        let linear_target = state.linear_power * self.model.max_linear_mps;
        let angular_target = state.angular_power * self.model.max_angular_dps;
        state.linear_mps += (linear_target - state.linear_mps) * alpha;
        state.angular_dps += (angular_target - state.angular_dps) * alpha;

        let mut yaw = state.yaw_deg + state.angular_dps * dt;
        while yaw > 180.0 {
            yaw -= 360.0;
        }
        while yaw <= -180.0 {
            yaw += 360.0;
        }
        state.yaw_deg = yaw;
    }

    fn command(&self, linear_power: f64, angular_power: f64) {
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.linear_power = linear_power.clamp(-1.0, 1.0);
        state.angular_power = angular_power.clamp(-1.0, 1.0);
    }
}

impl Base for SimulatedDrive {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_power(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        _extra: Option<&Extra>,
    ) -> Result<(), ComponentError> {
        token.check()?;
        self.command(linear.y, angular.z);
        Ok(())
    }

    fn set_velocity(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        _extra: Option<&Extra>,
    ) -> Result<(), ComponentError> {
        token.check()?;
        self.command(
            linear.y / 1000.0 / self.model.max_linear_mps,
            angular.z / self.model.max_angular_dps,
        );
        Ok(())
    }

    fn stop(&self, token: &CancelToken, _extra: Option<&Extra>) -> Result<(), ComponentError> {
        token.check()?;
        self.command(0.0, 0.0);
        Ok(())
    }

    fn is_moving(&self, _token: &CancelToken) -> Result<bool, ComponentError> {
        let (linear, angular) = self.velocities();
        Ok(linear.abs() > 1e-3 || angular.abs() > 1e-1)
    }

    fn properties(
        &self,
        _token: &CancelToken,
        _extra: Option<&Extra>,
    ) -> Result<BaseProperties, ComponentError> {
        Ok(BaseProperties {
            width_meters: 0.35,
            turning_radius_meters: 0.0,
            wheel_circumference_meters: 0.22,
        })
    }

    fn geometries(
        &self,
        _token: &CancelToken,
        _extra: Option<&Extra>,
    ) -> Result<Vec<Geometry>, ComponentError> {
        Ok(Vec::new())
    }
}

impl MovementSensor for SimulatedDrive {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self, token: &CancelToken) -> Result<MovementSensorProperties, ComponentError> {
        token.check()?;
        Ok(MovementSensorProperties {
            orientation_supported: true,
            angular_velocity_supported: true,
            linear_velocity_supported: true,
            position_supported: false,
            compass_heading_supported: false,
        })
    }

    fn orientation(&self, token: &CancelToken) -> Result<UnitQuaternion<f64>, ComponentError> {
        token.check()?;
        let mut state = self.state.lock();
        self.advance(&mut state);
        Ok(UnitQuaternion::from_euler_angles(0.0, 0.0, state.yaw_deg.to_radians()))
    }

    fn linear_velocity(&self, token: &CancelToken) -> Result<Vector3<f64>, ComponentError> {
        token.check()?;
        let (linear, _) = self.velocities();
        Ok(Vector3::new(0.0, linear, 0.0))
    }

    fn angular_velocity(&self, token: &CancelToken) -> Result<Vector3<f64>, ComponentError> {
        token.check()?;
        let (_, angular) = self.velocities();
        Ok(Vector3::new(0.0, 0.0, angular))
    }

    fn compass_heading(&self, _token: &CancelToken) -> Result<f64, ComponentError> {
        Err(ComponentError::unsupported(&self.name, "compass heading"))
    }
}
