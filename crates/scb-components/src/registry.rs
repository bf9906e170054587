//! 依赖注册表
//!
//! 宿主框架把已构建的组件按名称放入 [`Dependencies`]，
//! 传感器闭环底盘在构造/重配置时按配置中的名称查找。

use crate::base::Base;
use crate::error::ComponentError;
use crate::sensor::MovementSensor;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 已命名的组件集合
///
/// 组件以 `Arc` 共享持有：注册表和使用方都不独占组件的生命周期。
#[derive(Default, Clone)]
pub struct Dependencies {
    movement_sensors: HashMap<String, Arc<dyn MovementSensor>>,
    bases: HashMap<String, Arc<dyn Base>>,
}

impl Dependencies {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册运动传感器（以传感器自身的名称为键）
    pub fn add_movement_sensor(&mut self, sensor: Arc<dyn MovementSensor>) -> &mut Self {
        debug!("Registered movement sensor: {}", sensor.name());
        self.movement_sensors.insert(sensor.name().to_string(), sensor);
        self
    }

    /// 注册底盘（以底盘自身的名称为键）
    pub fn add_base(&mut self, base: Arc<dyn Base>) -> &mut Self {
        debug!("Registered base: {}", base.name());
        self.bases.insert(base.name().to_string(), base);
        self
    }

    /// 按名称查找运动传感器
    pub fn movement_sensor(&self, name: &str) -> Result<Arc<dyn MovementSensor>, ComponentError> {
        self.movement_sensors
            .get(name)
            .cloned()
            .ok_or_else(|| ComponentError::NotFound {
                kind: "movement sensor",
                name: name.to_string(),
            })
    }

    /// 按名称查找底盘
    pub fn base(&self, name: &str) -> Result<Arc<dyn Base>, ComponentError> {
        self.bases.get(name).cloned().ok_or_else(|| ComponentError::NotFound {
            kind: "base",
            name: name.to_string(),
        })
    }

    /// 已注册组件总数
    pub fn len(&self) -> usize {
        self.movement_sensors.len() + self.bases.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sensors: Vec<_> = self.movement_sensors.keys().collect();
        sensors.sort();
        let mut bases: Vec<_> = self.bases.keys().collect();
        bases.sort();
        f.debug_struct("Dependencies")
            .field("movement_sensors", &sensors)
            .field("bases", &bases)
            .finish()
    }
}
