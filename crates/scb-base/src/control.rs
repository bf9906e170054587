//! 控制循环构建
//!
//! 把线速度、角速度两组 PID 参数转换成引擎配置：
//!
//! ```text
//! linear_setpoint  ──► linear_pid  ──┐
//!                                    ├──► <base>_endpoint
//! angular_setpoint ──► angular_pid ──┘
//! ```
//!
//! 构建过程是确定性的，不启动控制循环。

use scb_control::{
    BlockConfig, BlockTag, ControlConfig, ControlError, PidConfig, PidKind, TunedValues,
};
use std::collections::HashMap;

/// 按块类型分组的块名称
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockNames(HashMap<BlockTag, Vec<String>>);

impl BlockNames {
    fn from_config(config: &ControlConfig) -> Self {
        let map = [BlockTag::Constant, BlockTag::Pid, BlockTag::Endpoint]
            .into_iter()
            .map(|tag| (tag, config.block_names(tag)))
            .collect();
        Self(map)
    }

    /// 指定类型的块名称（声明顺序）
    pub fn get(&self, tag: BlockTag) -> &[String] {
        self.0.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 线速度和角速度设定值块名称
    pub fn setpoints(&self) -> Option<(&str, &str)> {
        match self.get(BlockTag::Constant) {
            [linear, angular] => Some((linear.as_str(), angular.as_str())),
            _ => None,
        }
    }
}

/// 控制循环计划
///
/// 包含引擎配置、块名称和整定结果槽位（引擎异步写入）。
#[derive(Debug, Clone)]
pub struct LoopPlan {
    /// 引擎配置
    pub config: ControlConfig,
    /// 块名称
    pub blocks: BlockNames,
    /// 是否需要自动整定
    pub auto_tune: bool,
    /// 整定结果槽位（下标 0 线速度，1 角速度）
    pub tuned: TunedValues,
}

/// 构建控制循环计划
///
/// `linear` 和 `angular` 的类型标签必须与通道一致。
pub fn build_plan(
    linear: PidConfig,
    angular: PidConfig,
    frequency_hz: f64,
    controllable: &str,
) -> Result<LoopPlan, ControlError> {
    for (pid, expected) in [(linear, PidKind::LinearVelocity), (angular, PidKind::AngularVelocity)] {
        if pid.kind != expected {
            return Err(ControlError::InvalidConfig(format!(
                "expected {} parameters, got {}",
                expected, pid.kind
            )));
        }
    }

    let endpoint = format!("{}_endpoint", controllable);
    let config = ControlConfig::new(
        vec![
            BlockConfig::constant("linear_setpoint", 0.0),
            BlockConfig::constant("angular_setpoint", 0.0),
            BlockConfig::pid("linear_pid", linear, "linear_setpoint"),
            BlockConfig::pid("angular_pid", angular, "angular_setpoint"),
            BlockConfig::endpoint(
                endpoint,
                controllable,
                vec!["linear_pid".to_string(), "angular_pid".to_string()],
            ),
        ],
        frequency_hz,
    );
    config.validate()?;

    Ok(LoopPlan {
        blocks: BlockNames::from_config(&config),
        auto_tune: linear.needs_auto_tuning() || angular.needs_auto_tuning(),
        tuned: TunedValues::untuned(&PidKind::ALL),
        config,
    })
}
