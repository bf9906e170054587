//! 传感器角色分配
//!
//! 按配置顺序为每个角色选择第一个具备对应能力的传感器：
//!
//! | 角色 | 所需能力 |
//! |------|----------|
//! | orientation | 姿态 |
//! | velocities | 线速度 **和** 角速度 |
//! | position | 位置 |
//! | compass | 罗盘航向 |
//!
//! 能力查询失败的传感器视为不具备任何能力。各角色独立选择，
//! 一个传感器可以同时承担多个角色。

use crate::error::BaseError;
use scb_components::{
    CancelToken, Dependencies, MovementSensor, MovementSensorProperties,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// 角色分配结果（传感器下标）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleAssignment {
    /// 姿态传感器
    pub orientation: Option<usize>,
    /// 速度传感器
    pub velocities: Option<usize>,
    /// 位置传感器
    pub position: Option<usize>,
    /// 罗盘传感器
    pub compass: Option<usize>,
}

/// 按能力分配角色
///
/// `capabilities[i]` 为第 `i` 个传感器的能力查询结果，`None` 表示查询失败。
pub fn assign_roles(capabilities: &[Option<MovementSensorProperties>]) -> RoleAssignment {
    let first = |pred: fn(&MovementSensorProperties) -> bool| {
        capabilities
            .iter()
            .position(|caps| caps.as_ref().is_some_and(pred))
    };
    RoleAssignment {
        orientation: first(|p| p.orientation_supported),
        velocities: first(|p| p.supports_velocities()),
        position: first(|p| p.position_supported),
        compass: first(|p| p.compass_heading_supported),
    }
}

/// 各角色选中的传感器名称（可查询、可序列化）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SensorRoles {
    /// 姿态传感器
    pub orientation: Option<String>,
    /// 速度传感器
    pub velocities: Option<String>,
    /// 位置传感器
    pub position: Option<String>,
    /// 罗盘传感器
    pub compass: Option<String>,
}

/// 已解析的传感器句柄
#[derive(Clone, Default)]
pub(crate) struct ResolvedSensors {
    pub(crate) roles: SensorRoles,
    pub(crate) orientation: Option<Arc<dyn MovementSensor>>,
    pub(crate) velocities: Option<Arc<dyn MovementSensor>>,
    pub(crate) position: Option<Arc<dyn MovementSensor>>,
    pub(crate) compass: Option<Arc<dyn MovementSensor>>,
}

impl ResolvedSensors {
    /// 是否至少有姿态或速度反馈
    pub(crate) fn has_feedback(&self) -> bool {
        self.orientation.is_some() || self.velocities.is_some()
    }
}

/// 从依赖中查找传感器、查询能力并分配角色
///
/// 找不到配置的传感器时返回 [`BaseError::MissingDependency`]。
pub(crate) fn resolve_sensors(
    names: &[String],
    deps: &Dependencies,
    token: &CancelToken,
) -> Result<ResolvedSensors, BaseError> {
    let sensors = names
        .iter()
        .map(|name| deps.movement_sensor(name).map_err(BaseError::MissingDependency))
        .collect::<Result<Vec<_>, _>>()?;

    let capabilities: Vec<_> = sensors
        .iter()
        .map(|sensor| match sensor.properties(token) {
            Ok(props) => Some(props),
            Err(e) => {
                warn!("Movement sensor {} properties unavailable: {}", sensor.name(), e);
                None
            },
        })
        .collect();

    let assignment = assign_roles(&capabilities);
    let pick = |index: Option<usize>, role: &str| {
        index.map(|i| {
            let sensor = sensors[i].clone();
            info!("Using sensor {} as {} sensor for base", sensor.name(), role);
            sensor
        })
    };

    let orientation = pick(assignment.orientation, "orientation");
    let velocities = pick(assignment.velocities, "velocity");
    let position = pick(assignment.position, "position");
    let compass = pick(assignment.compass, "compass heading");
    let name_of = |s: &Option<Arc<dyn MovementSensor>>| s.as_ref().map(|s| s.name().to_string());

    Ok(ResolvedSensors {
        roles: SensorRoles {
            orientation: name_of(&orientation),
            velocities: name_of(&velocities),
            position: name_of(&position),
            compass: name_of(&compass),
        },
        orientation,
        velocities,
        position,
        compass,
    })
}
