//! 控制循环配置
//!
//! 控制循环由命名的块组成。每个通道是一条 `constant → pid → endpoint` 链：
//!
//! ```text
//! linear_setpoint  ──► linear_pid  ──┐
//!                                    ├──► endpoint (Controllable)
//! angular_setpoint ──► angular_pid ──┘
//! ```
//!
//! 端点块的 `depends_on` 顺序决定信号向量的通道顺序。

use crate::error::ControlError;
use crate::pid::PidConfig;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// 块类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    /// 常量（设定值）块
    Constant,
    /// PID 块
    Pid,
    /// 被控对象端点块
    Endpoint,
}

impl BlockTag {
    /// 标签名称
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Pid => "pid",
            Self::Endpoint => "endpoint",
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 块的类型和参数
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// 常量块，运行中可通过 `update_constant_block` 修改
    Constant {
        /// 初始值
        value: f64,
    },
    /// PID 块
    Pid {
        /// 增益
        pid: PidConfig,
        /// 输出限制
        output_limit: f64,
        /// 积分项限制
        integral_limit: f64,
    },
    /// 端点块
    Endpoint {
        /// 被控对象名称（日志用）
        controllable: String,
    },
}

impl BlockKind {
    /// 块类型标签
    pub fn tag(&self) -> BlockTag {
        match self {
            Self::Constant { .. } => BlockTag::Constant,
            Self::Pid { .. } => BlockTag::Pid,
            Self::Endpoint { .. } => BlockTag::Endpoint,
        }
    }
}

/// 单个块
#[derive(Debug, Clone, PartialEq)]
pub struct BlockConfig {
    /// 块名称（全局唯一）
    pub name: String,
    /// 类型和参数
    pub kind: BlockKind,
    /// 输入块名称
    pub depends_on: Vec<String>,
}

impl BlockConfig {
    /// 常量块
    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: BlockKind::Constant { value },
            depends_on: Vec::new(),
        }
    }

    /// PID 块（默认输出限制 1.0，积分限制 10.0）
    pub fn pid(name: impl Into<String>, pid: PidConfig, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: BlockKind::Pid {
                pid,
                output_limit: 1.0,
                integral_limit: 10.0,
            },
            depends_on: vec![input.into()],
        }
    }

    /// 端点块
    pub fn endpoint(
        name: impl Into<String>,
        controllable: impl Into<String>,
        inputs: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: BlockKind::Endpoint {
                controllable: controllable.into(),
            },
            depends_on: inputs,
        }
    }
}

/// 继电器自动整定参数
#[derive(Debug, Clone, PartialEq)]
pub struct TuningOptions {
    /// 继电器输出幅值（功率比例）
    pub relay_amplitude: f64,
    /// 滞环宽度（测量值单位）
    pub hysteresis: f64,
    /// 整定时的设定值
    pub setpoint: f64,
    /// 计入平均的振荡周期数（第一个周期作为过渡过程丢弃）
    pub cycles: usize,
}

impl Default for TuningOptions {
    fn default() -> Self {
        TuningOptions {
            relay_amplitude: 0.5,
            hysteresis: 0.0,
            setpoint: 0.0,
            cycles: 4,
        }
    }
}

/// 控制循环配置
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    /// 所有块
    pub blocks: Vec<BlockConfig>,
    /// 控制频率（Hz）
    pub frequency_hz: f64,
    /// dt 钳位倍数
    ///
    /// 实际 dt 超过标称周期的此倍数时，PID 执行 `on_time_jump()` 并钳位 dt。
    pub dt_clamp_multiplier: f64,
    /// 自动整定参数
    pub tuning: TuningOptions,
}

/// 校验后的单个通道
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPlan {
    /// 常量块名称
    pub constant: String,
    /// 常量初始值
    pub initial_setpoint: f64,
    /// PID 块名称
    pub pid_block: String,
    /// PID 增益
    pub pid: PidConfig,
    /// 输出限制
    pub output_limit: f64,
    /// 积分项限制
    pub integral_limit: f64,
}

/// 校验后的拓扑
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    /// 被控对象名称
    pub controllable: String,
    /// 通道（按端点输入顺序）
    pub channels: Vec<ChannelPlan>,
}

impl ControlConfig {
    /// 创建配置（默认 dt 钳位 2x，默认整定参数）
    pub fn new(blocks: Vec<BlockConfig>, frequency_hz: f64) -> Self {
        Self {
            blocks,
            frequency_hz,
            dt_clamp_multiplier: 2.0,
            tuning: TuningOptions::default(),
        }
    }

    /// 标称周期
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz)
    }

    /// 指定类型的块名称（声明顺序）
    pub fn block_names(&self, tag: BlockTag) -> Vec<String> {
        self.blocks
            .iter()
            .filter(|b| b.kind.tag() == tag)
            .map(|b| b.name.clone())
            .collect()
    }

    /// 是否有 PID 块需要自动整定
    pub fn needs_auto_tuning(&self) -> bool {
        self.blocks.iter().any(|b| match &b.kind {
            BlockKind::Pid { pid, .. } => pid.needs_auto_tuning(),
            _ => false,
        })
    }

    fn find(&self, name: &str) -> Result<&BlockConfig, ControlError> {
        self.blocks
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| ControlError::UnknownBlock {
                name: name.to_string(),
            })
    }

    /// 校验配置并解析出通道拓扑
    pub fn validate(&self) -> Result<Topology, ControlError> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(ControlError::InvalidConfig(format!(
                "Invalid frequency_hz: {} (must be > 0)",
                self.frequency_hz
            )));
        }
        if self.frequency_hz > 1000.0 {
            tracing::warn!(
                "Very high control frequency: {} Hz. This may cause performance issues.",
                self.frequency_hz
            );
        }
        if self.dt_clamp_multiplier.is_nan() || self.dt_clamp_multiplier <= 0.0 {
            return Err(ControlError::InvalidConfig(format!(
                "Invalid dt_clamp_multiplier: {} (must be > 0)",
                self.dt_clamp_multiplier
            )));
        }
        if self.tuning.cycles == 0
            || self.tuning.relay_amplitude.is_nan()
            || self.tuning.relay_amplitude <= 0.0
        {
            return Err(ControlError::InvalidConfig(
                "Tuning needs at least one cycle and a positive relay amplitude".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for block in &self.blocks {
            if !seen.insert(block.name.as_str()) {
                return Err(ControlError::InvalidConfig(format!(
                    "Duplicate block name: {}",
                    block.name
                )));
            }
        }

        let mut endpoints = self.blocks.iter().filter(|b| b.kind.tag() == BlockTag::Endpoint);
        let endpoint = match (endpoints.next(), endpoints.next()) {
            (Some(e), None) => e,
            _ => {
                return Err(ControlError::InvalidConfig(
                    "Exactly one endpoint block is required".to_string(),
                ));
            },
        };
        let controllable = match &endpoint.kind {
            BlockKind::Endpoint { controllable } => controllable.clone(),
            _ => String::new(),
        };
        if endpoint.depends_on.is_empty() {
            return Err(ControlError::InvalidConfig(
                "Endpoint block has no inputs".to_string(),
            ));
        }

        let mut channels = Vec::with_capacity(endpoint.depends_on.len());
        for input in &endpoint.depends_on {
            let pid_block = self.find(input)?;
            let (pid, output_limit, integral_limit) = match &pid_block.kind {
                BlockKind::Pid {
                    pid,
                    output_limit,
                    integral_limit,
                } => (*pid, *output_limit, *integral_limit),
                _ => {
                    return Err(ControlError::WrongBlockKind {
                        name: input.clone(),
                        expected: "pid",
                    });
                },
            };

            let constant_name = match pid_block.depends_on.as_slice() {
                [single] => single,
                _ => {
                    return Err(ControlError::InvalidConfig(format!(
                        "PID block {} must have exactly one input",
                        pid_block.name
                    )));
                },
            };
            let initial_setpoint = match &self.find(constant_name)?.kind {
                BlockKind::Constant { value } => *value,
                _ => {
                    return Err(ControlError::WrongBlockKind {
                        name: constant_name.clone(),
                        expected: "constant",
                    });
                },
            };

            channels.push(ChannelPlan {
                constant: constant_name.clone(),
                initial_setpoint,
                pid_block: pid_block.name.clone(),
                pid,
                output_limit,
                integral_limit,
            });
        }

        Ok(Topology {
            controllable,
            channels,
        })
    }
}
