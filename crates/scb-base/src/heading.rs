//! 航向解析
//!
//! 优先级：姿态传感器 > 罗盘 > 无。航向以度为单位、逆时针为正（Z 轴向上），
//! 范围 `(-180, 180]`。
//!
//! 罗盘读数是顺时针、北为 0 的 `[0, 360)`，转换方式：
//!
//! ```text
//! heading = 360 - compass
//! if heading > 180 { heading -= 360 }
//! ```

use scb_components::{CancelToken, ComponentError, MovementSensor};
use nalgebra::UnitQuaternion;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// 罗盘读数转换为逆时针航向
pub fn compass_to_heading(compass: f64) -> f64 {
    let heading = 360.0 - compass;
    if heading > 180.0 { heading - 360.0 } else { heading }
}

/// 姿态的偏航角（度）
pub fn yaw_degrees(orientation: &UnitQuaternion<f64>) -> f64 {
    let (_roll, _pitch, yaw) = orientation.euler_angles();
    yaw.to_degrees()
}

/// 航向来源
#[derive(Clone, Default)]
pub enum HeadingSource {
    /// 姿态传感器（取偏航角）
    Orientation(Arc<dyn MovementSensor>),
    /// 罗盘
    Compass(Arc<dyn MovementSensor>),
    /// 无航向来源
    #[default]
    None,
}

impl HeadingSource {
    /// 按优先级选择航向来源
    pub fn select(
        base_name: &str,
        orientation: Option<Arc<dyn MovementSensor>>,
        compass: Option<Arc<dyn MovementSensor>>,
    ) -> Self {
        let source = match (orientation, compass) {
            (Some(sensor), _) => Self::Orientation(sensor),
            (None, Some(sensor)) => Self::Compass(sensor),
            (None, None) => Self::None,
        };
        match &source {
            Self::Orientation(s) | Self::Compass(s) => {
                info!("Using sensor {} as angular heading sensor for base {}", s.name(), base_name);
            },
            Self::None => {
                info!("Base {} cannot control heading, no heading related sensor given", base_name);
            },
        }
        source
    }

    /// 是否支持航向
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// 读取航向，返回 `(度, 是否支持)`
    ///
    /// 无航向来源时返回 `(0.0, false)`；读数失败时返回错误。
    pub fn heading(&self, token: &CancelToken) -> Result<(f64, bool), ComponentError> {
        match self {
            Self::Orientation(sensor) => Ok((yaw_degrees(&sensor.orientation(token)?), true)),
            Self::Compass(sensor) => Ok((compass_to_heading(sensor.compass_heading(token)?), true)),
            Self::None => Ok((0.0, false)),
        }
    }
}

impl fmt::Debug for HeadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orientation(s) => write!(f, "Orientation({})", s.name()),
            Self::Compass(s) => write!(f, "Compass({})", s.name()),
            Self::None => write!(f, "None"),
        }
    }
}
