//! 错误类型定义
//!
//! 传感器闭环底盘的统一错误类型。组件层和控制引擎的错误通过 `#[from]` 转换。

use scb_components::ComponentError;
use scb_control::{ControlError, PidConfig, PidKind};
use thiserror::Error;

/// 配置错误
///
/// 所有变体都带有配置路径，便于宿主框架定位出错的组件配置。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 传感器列表为空
    #[error("{path}: need at least one movement sensor for base")]
    NoMovementSensor {
        /// 配置路径
        path: String,
    },

    /// 缺少 base 字段
    #[error("{path}: base is required")]
    MissingBase {
        /// 配置路径
        path: String,
    },

    /// 同一类型的 PID 参数组出现多次
    #[error("{path}: duplicate control_parameters type '{kind}'")]
    DuplicatePid {
        /// 配置路径
        path: String,
        /// 重复的类型
        kind: PidKind,
    },

    /// 控制频率无效
    #[error("{path}: invalid control_frequency_hz {value} (must be > 0)")]
    InvalidFrequency {
        /// 配置路径
        path: String,
        /// 配置的值
        value: f64,
    },

    /// 解析失败（包括未知的 PID 类型标签）
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// 读取配置文件失败
    #[error("Failed to read config file {path}: {reason}")]
    Io {
        /// 文件路径
        path: String,
        /// 失败原因
        reason: String,
    },
}

/// 传感器闭环底盘错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BaseError {
    /// 配置错误
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// 没有可用于姿态或速度反馈的传感器
    #[error("no appropriate sensor for orientation or velocity feedback")]
    NoFeedbackSensor,

    /// 依赖中找不到配置的组件
    #[error("Missing dependency: {0}")]
    MissingDependency(ComponentError),

    /// 传感器或底盘执行器错误
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// 控制引擎错误
    #[error("Control loop error: {0}")]
    Control(#[from] ControlError),

    /// 自动整定进行中
    #[error("{name}: PID auto-tuning in progress, wait for it to finish before moving")]
    TuningInProgress {
        /// 组件名称
        name: String,
    },

    /// 自动整定已完成，需要把结果写入配置
    #[error(
        "{name} has been tuned, add these control_parameters to the config and reconfigure: {}",
        format_pid_sets(.values)
    )]
    TunedValuesReady {
        /// 组件名称
        name: String,
        /// 整定得到的参数组
        values: Vec<PidConfig>,
    },

    /// 控制循环启动失败
    #[error("Failed to start control loop: {0}")]
    LoopStart(ControlError),

    /// 组件尚未成功配置
    #[error("Sensor-controlled base is not configured")]
    NotConfigured,

    /// 组件已关闭
    #[error("Sensor-controlled base is closed")]
    Closed,
}

fn format_pid_sets(values: &[PidConfig]) -> String {
    values
        .iter()
        .map(|v| format!("{{type: {}, p: {}, i: {}, d: {}}}", v.kind, v.p, v.i, v.d))
        .collect::<Vec<_>>()
        .join(", ")
}

impl BaseError {
    /// 是否为致命错误
    ///
    /// 致命错误在重新配置（或重新创建）之前不会消失。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::NoFeedbackSensor
                | Self::MissingDependency(_)
                | Self::NotConfigured
                | Self::Closed
        )
    }

    /// 是否可重试
    ///
    /// 重新执行同一命令可能成功。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Component(e) => e.is_retryable(),
            Self::LoopStart(_) | Self::TuningInProgress { .. } => true,
            _ => false,
        }
    }

    /// 是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::NoFeedbackSensor | Self::MissingDependency(_)
        )
    }

    /// 是否为自动整定状态信号（预期内的、可恢复的“错误”）
    pub fn is_tuning_signal(&self) -> bool {
        matches!(
            self,
            Self::TuningInProgress { .. } | Self::TunedValuesReady { .. }
        )
    }

    /// 是否为命令被新命令抢占
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Component(ComponentError::Cancelled))
    }
}
