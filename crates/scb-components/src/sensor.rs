//! 运动传感器接口
//!
//! 运动传感器是闭环反馈的数据来源：姿态、线速度/角速度、位置、罗盘航向。
//! 不同的传感器支持不同的能力子集，通过 [`MovementSensor::properties`] 查询。
//!
//! # 单位约定
//!
//! - 线速度：m/s
//! - 角速度：deg/s
//! - 罗盘航向：度，北为 0，顺时针递增，范围 `[0, 360)`
//! - 姿态：单位四元数，Z 轴向上

use crate::context::CancelToken;
use crate::error::ComponentError;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// 运动传感器能力集合
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSensorProperties {
    /// 支持姿态读取
    pub orientation_supported: bool,
    /// 支持角速度读取
    pub angular_velocity_supported: bool,
    /// 支持线速度读取
    pub linear_velocity_supported: bool,
    /// 支持位置读取
    pub position_supported: bool,
    /// 支持罗盘航向读取
    pub compass_heading_supported: bool,
}

impl MovementSensorProperties {
    /// 是否同时支持线速度和角速度
    pub fn supports_velocities(&self) -> bool {
        self.linear_velocity_supported && self.angular_velocity_supported
    }
}

/// 运动传感器
///
/// 实现必须是线程安全的：控制循环线程和命令线程会并发调用。
///
/// 不支持的读数方法应返回 [`ComponentError::Unsupported`]。
pub trait MovementSensor: Send + Sync {
    /// 传感器名称（配置中的短名）
    fn name(&self) -> &str;

    /// 查询能力集合
    fn properties(&self, token: &CancelToken) -> Result<MovementSensorProperties, ComponentError>;

    /// 读取姿态
    fn orientation(&self, token: &CancelToken) -> Result<UnitQuaternion<f64>, ComponentError>;

    /// 读取线速度（m/s）
    fn linear_velocity(&self, token: &CancelToken) -> Result<Vector3<f64>, ComponentError>;

    /// 读取角速度（deg/s）
    fn angular_velocity(&self, token: &CancelToken) -> Result<Vector3<f64>, ComponentError>;

    /// 读取罗盘航向（度，顺时针，北为 0）
    fn compass_heading(&self, token: &CancelToken) -> Result<f64, ComponentError>;
}
