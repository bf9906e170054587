//! # scb-base
//!
//! 传感器闭环移动底盘：把一个普通底盘和若干运动传感器组合成一个
//! 新的 [`Base`](scb_components::Base)。
//!
//! - 航向：来自姿态传感器（偏航角）或罗盘，范围 `(-180, 180]`
//! - 速度闭环：线速度 / 角速度两路 PID，输出功率命令给被控底盘
//! - 自动整定：增益全零的通道先做继电器整定，结果通过 `do_command` 查询
//! - 没有 PID 参数时 `set_velocity` 直接透传（开环）
//!
//! # 快速开始
//!
//! ```rust
//! use scb_base::prelude::*;
//! use scb_components::mock::{MockBase, MockMovementSensor};
//! use std::sync::Arc;
//!
//! let mut deps = Dependencies::new();
//! deps.add_movement_sensor(Arc::new(MockMovementSensor::compass_only("compass")))
//!     .add_movement_sensor(Arc::new(MockMovementSensor::velocities_only("odometry")))
//!     .add_base(Arc::new(MockBase::new("wheels")));
//!
//! let config = ScbConfig::new(["compass", "odometry"], "wheels");
//! let scb = SensorBase::new("scb", &config, &deps).unwrap();
//! let (heading, supported) = scb.heading().unwrap();
//! assert!(supported);
//! assert!(heading > -180.0 && heading <= 180.0);
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod feedback;
pub mod heading;
pub mod lifecycle;
pub mod logging;
pub mod operation;
pub mod roles;
pub mod sensor_base;
pub mod tuning;
mod velocity;

pub use config::{DEFAULT_CONTROL_FREQUENCY_HZ, ScbConfig};
pub use control::{BlockNames, LoopPlan, build_plan};
pub use error::{BaseError, ConfigError};
pub use feedback::FeedbackEndpoint;
pub use heading::{HeadingSource, compass_to_heading, yaw_degrees};
pub use lifecycle::LoopSlot;
pub use logging::init_logging;
pub use operation::{OperationGuard, OperationManager};
pub use roles::{RoleAssignment, SensorRoles, assign_roles};
pub use sensor_base::SensorBase;
pub use tuning::{GET_TUNED_PID, TuningStatus};

/// 常用类型
pub mod prelude {
    pub use crate::config::ScbConfig;
    pub use crate::error::{BaseError, ConfigError};
    pub use crate::roles::SensorRoles;
    pub use crate::sensor_base::SensorBase;
    pub use crate::tuning::TuningStatus;
    pub use scb_components::{Base, CancelToken, Dependencies, Extra, MovementSensor};
    pub use scb_control::{LoopState, PidConfig, PidKind};
}
