//! 底盘执行器接口
//!
//! 底盘把线速度/角速度（或功率）命令转换成轮子动作。
//! 传感器闭环底盘本身也实现 [`Base`]，因此可以层层嵌套。
//!
//! # 单位约定
//!
//! - `set_velocity`：线速度 mm/s，角速度 deg/s
//! - `set_power`：每个轴的功率比例，范围 `[-1.0, 1.0]`
//! - 前进方向为 Y 轴，偏航为 Z 轴

use crate::context::CancelToken;
use crate::error::ComponentError;
use nalgebra::{Isometry3, Vector3};
use serde::{Deserialize, Serialize};

/// 透传给底层组件的附加参数
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// 底盘物理属性
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseProperties {
    /// 轮距（米）
    pub width_meters: f64,
    /// 最小转弯半径（米）
    pub turning_radius_meters: f64,
    /// 轮子周长（米）
    pub wheel_circumference_meters: f64,
}

/// 几何体形状
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// 长方体（各边长度，米）
    Box {
        /// 尺寸 (x, y, z)
        dims: Vector3<f64>,
    },
    /// 球体
    Sphere {
        /// 半径（米）
        radius: f64,
    },
    /// 点
    Point,
}

/// 底盘几何体（用于碰撞检查）
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// 几何体标签
    pub label: String,
    /// 相对底盘原点的位姿
    pub pose: Isometry3<f64>,
    /// 形状
    pub shape: Shape,
}

/// 底盘执行器
///
/// 实现必须是线程安全的：控制循环线程会在后台调用 `set_power`，
/// 同时命令线程调用 `set_velocity` / `stop`。
pub trait Base: Send + Sync {
    /// 底盘名称（配置中的短名）
    fn name(&self) -> &str;

    /// 以功率比例驱动底盘
    fn set_power(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        extra: Option<&Extra>,
    ) -> Result<(), ComponentError>;

    /// 以目标速度驱动底盘（线速度 mm/s，角速度 deg/s）
    fn set_velocity(
        &self,
        token: &CancelToken,
        linear: Vector3<f64>,
        angular: Vector3<f64>,
        extra: Option<&Extra>,
    ) -> Result<(), ComponentError>;

    /// 停止底盘
    fn stop(&self, token: &CancelToken, extra: Option<&Extra>) -> Result<(), ComponentError>;

    /// 底盘是否在运动
    fn is_moving(&self, token: &CancelToken) -> Result<bool, ComponentError>;

    /// 查询底盘物理属性
    fn properties(
        &self,
        token: &CancelToken,
        extra: Option<&Extra>,
    ) -> Result<BaseProperties, ComponentError>;

    /// 查询底盘几何体
    fn geometries(
        &self,
        token: &CancelToken,
        extra: Option<&Extra>,
    ) -> Result<Vec<Geometry>, ComponentError>;
}
