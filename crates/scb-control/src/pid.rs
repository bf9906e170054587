//! PID Controller - 比例-积分-微分控制器
//!
//! 单通道 PID，用于把速度误差转换成功率命令。
//!
//! # 算法
//!
//! ```text
//! output = Kp * e + Ki * ∫e dt + Kd * de/dt
//! ```
//!
//! 其中：
//! - `e` = 设定值 - 测量值（误差）
//! - `∫e dt` = 累积误差（积分项）
//! - `de/dt` = 误差变化率（微分项）
//!
//! # 特性
//!
//! - **积分饱和保护**: 限制积分项累积，防止积分饱和（Integral Windup）
//! - **时间跳变处理**: `dt` 异常时只重置微分项，保留积分项
//! - **输出钳位**: 输出限制在 `[-output_limit, output_limit]`（默认为功率比例范围）
//!
//! # 示例
//!
//! ```rust
//! use scb_control::PidController;
//! use std::time::Duration;
//!
//! let mut pid = PidController::new()
//!     .with_gains(0.8, 0.2, 0.0)
//!     .with_output_limit(1.0);
//!
//! // 设定 0.5 m/s，测得 0.3 m/s
//! let power = pid.tick(0.5, 0.3, Duration::from_millis(100));
//! assert!(power > 0.0);
//! ```

use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// PID 参数组对应的控制通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PidKind {
    /// 线速度通道（信号向量下标 0）
    LinearVelocity,
    /// 角速度通道（信号向量下标 1）
    AngularVelocity,
}

impl PidKind {
    /// 全部通道（按信号向量顺序）
    pub const ALL: [PidKind; 2] = [PidKind::LinearVelocity, PidKind::AngularVelocity];

    /// 配置中使用的标签
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinearVelocity => "linear_velocity",
            Self::AngularVelocity => "angular_velocity",
        }
    }

    /// 信号向量下标
    pub fn index(self) -> usize {
        match self {
            Self::LinearVelocity => 0,
            Self::AngularVelocity => 1,
        }
    }
}

impl fmt::Display for PidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PidKind {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear_velocity" => Ok(Self::LinearVelocity),
            "angular_velocity" => Ok(Self::AngularVelocity),
            other => Err(ControlError::UnknownPidKind {
                tag: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for PidKind {
    type Error = ControlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PidKind> for String {
    fn from(kind: PidKind) -> Self {
        kind.as_str().to_string()
    }
}

/// PID 参数组
///
/// 三个增益全为零表示“需要自动整定”。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    /// 通道标签
    #[serde(rename = "type")]
    pub kind: PidKind,
    /// 比例增益
    #[serde(default)]
    pub p: f64,
    /// 积分增益
    #[serde(default)]
    pub i: f64,
    /// 微分增益
    #[serde(default)]
    pub d: f64,
}

impl PidConfig {
    /// 创建参数组
    pub fn new(kind: PidKind, p: f64, i: f64, d: f64) -> Self {
        Self { kind, p, i, d }
    }

    /// 增益全零的参数组（请求自动整定）
    pub fn untuned(kind: PidKind) -> Self {
        Self::new(kind, 0.0, 0.0, 0.0)
    }

    /// 是否需要自动整定
    pub fn needs_auto_tuning(&self) -> bool {
        self.p == 0.0 && self.i == 0.0 && self.d == 0.0
    }
}

/// PID 控制器
///
/// 实现经典的比例-积分-微分控制算法。
#[derive(Debug, Clone)]
pub struct PidController {
    /// 比例增益 (Kp)
    kp: f64,

    /// 积分增益 (Ki)
    ki: f64,

    /// 微分增益 (Kd)
    kd: f64,

    /// 积分项累积值
    integral: f64,

    /// 上一次的误差（用于计算微分）
    last_error: f64,

    /// 积分项限制（防止积分饱和）
    integral_limit: f64,

    /// 输出限制
    output_limit: f64,
}

impl Default for PidController {
    fn default() -> Self {
        Self::new()
    }
}

impl PidController {
    /// 创建新的 PID 控制器
    ///
    /// # 默认参数
    ///
    /// - Kp = 0.0, Ki = 0.0, Kd = 0.0（需要手动设置）
    /// - 积分限制 = 10.0
    /// - 输出限制 = 1.0（功率比例）
    pub fn new() -> Self {
        PidController {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            integral: 0.0,
            last_error: 0.0,
            integral_limit: 10.0,
            output_limit: 1.0,
        }
    }

    /// 从参数组创建
    pub fn from_config(config: &PidConfig) -> Self {
        Self::new().with_gains(config.p, config.i, config.d)
    }

    /// 设置 PID 增益
    pub fn with_gains(mut self, kp: f64, ki: f64, kd: f64) -> Self {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self
    }

    /// 设置积分项限制
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit;
        self
    }

    /// 设置输出限制
    pub fn with_output_limit(mut self, limit: f64) -> Self {
        self.output_limit = limit;
        self
    }

    /// 运行时替换增益（不清除积分）
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    /// 当前增益 (Kp, Ki, Kd)
    pub fn gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    /// 获取当前积分项
    ///
    /// 用于调试和监控。
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// 计算一个周期的输出
    pub fn tick(&mut self, setpoint: f64, measured: f64, dt: Duration) -> f64 {
        let dt_sec = dt.as_secs_f64();

        // 防止除零
        if dt_sec <= 0.0 {
            tracing::warn!(
                "PID controller received zero or negative dt: {:?}, returning zero output",
                dt
            );
            return 0.0;
        }

        let error = setpoint - measured;

        let p_term = self.kp * error;

        self.integral =
            (self.integral + error * dt_sec).clamp(-self.integral_limit, self.integral_limit);
        let i_term = self.ki * self.integral;

        let d_term = self.kd * (error - self.last_error) / dt_sec;
        self.last_error = error;

        (p_term + i_term + d_term).clamp(-self.output_limit, self.output_limit)
    }

    /// 时间跳变处理（只重置微分项）
    pub fn on_time_jump(&mut self, dt: Duration) {
        tracing::warn!(
            "PID controller detected time jump: {:?}, resetting derivative term only",
            dt
        );
        self.last_error = 0.0;
    }

    /// 完全重置控制器状态
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }
}
