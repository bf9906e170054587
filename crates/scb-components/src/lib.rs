//! # scb-components
//!
//! 传感器闭环底盘的外部组件接口：
//!
//! - [`MovementSensor`]：运动传感器（姿态、速度、位置、罗盘）
//! - [`Base`]：底盘执行器（功率/速度命令、停止、属性查询）
//! - [`CancelToken`]：运动命令的协作式取消
//! - [`Dependencies`]：按名称注册和查找组件
//!
//! 启用 `mock` feature 后提供无硬件依赖的模拟组件（见 [`mock`] 模块）。

pub mod base;
pub mod context;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod registry;
pub mod sensor;

pub use base::{Base, BaseProperties, Extra, Geometry, Shape};
pub use context::CancelToken;
pub use error::ComponentError;
pub use registry::Dependencies;
pub use sensor::{MovementSensor, MovementSensorProperties};
