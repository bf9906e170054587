//! 组件层错误类型定义

use thiserror::Error;

/// 组件层错误类型
///
/// 传感器和底盘执行器共用的错误类型。组件层从不重试，
/// 错误原样返回给调用者（控制循环或命令管线）。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    /// 操作被取消（新的命令抢占了当前命令）
    #[error("Operation cancelled")]
    Cancelled,

    /// 组件不支持该功能
    #[error("Unsupported by {component}: {feature}")]
    Unsupported {
        /// 组件名称
        component: String,
        /// 不支持的功能
        feature: String,
    },

    /// 硬件读写失败
    #[error("Hardware error on {component}: {reason}")]
    Hardware {
        /// 组件名称
        component: String,
        /// 失败原因
        reason: String,
    },

    /// 操作超时
    #[error("Operation timeout after {timeout_ms}ms")]
    Timeout {
        /// 超时时间（毫秒）
        timeout_ms: u64,
    },

    /// 依赖中找不到指定组件
    #[error("No {kind} named ({name})")]
    NotFound {
        /// 组件类型（"movement sensor" / "base"）
        kind: &'static str,
        /// 组件名称
        name: String,
    },
}

impl ComponentError {
    /// 构造硬件错误
    pub fn hardware(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Hardware {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// 构造不支持错误
    pub fn unsupported(component: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::Unsupported {
            component: component.into(),
            feature: feature.into(),
        }
    }

    /// 是否为取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// 是否可重试
    ///
    /// 超时和硬件读写错误重新执行可能成功；取消和不支持不可重试。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Hardware { .. })
    }
}
