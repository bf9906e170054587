//! 控制引擎错误类型定义

use thiserror::Error;

/// 控制引擎错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    /// 控制配置无效（块拓扑、频率等）
    #[error("Invalid control config: {0}")]
    InvalidConfig(String),

    /// PID 参数类型标签无效
    #[error("control_parameters type must be 'linear_velocity' or 'angular_velocity' (got '{tag}')")]
    UnknownPidKind {
        /// 配置中的标签
        tag: String,
    },

    /// 找不到指定名称的块
    #[error("Unknown block: {name}")]
    UnknownBlock {
        /// 块名称
        name: String,
    },

    /// 块类型不符（例如向 PID 块写入常量）
    #[error("Block {name} is not a {expected} block")]
    WrongBlockKind {
        /// 块名称
        name: String,
        /// 期望的块类型
        expected: &'static str,
    },

    /// 控制循环已经启动
    #[error("Control loop already started")]
    AlreadyStarted,

    /// 控制循环尚未启动
    #[error("Control loop not started")]
    NotStarted,

    /// 控制循环已停止（终态）
    #[error("Control loop stopped")]
    Stopped,

    /// 后台线程创建失败
    #[error("Failed to spawn control loop worker: {0}")]
    Spawn(String),

    /// 状态向量维度与通道数不一致
    #[error("State dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// 通道数
        expected: usize,
        /// 实际维度
        actual: usize,
    },

    /// 被控对象读写失败
    #[error("Endpoint error: {0}")]
    Endpoint(String),

    /// 后台线程 join 失败（线程 panic）
    #[error("Control loop worker panicked")]
    WorkerPanicked,
}

impl ControlError {
    /// 是否为终态错误（控制循环对象不可再用）
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::WorkerPanicked)
    }
}
