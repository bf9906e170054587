//! 自动整定状态
//!
//! 配置中增益全零的通道请求整定。对每个请求整定的通道，
//! 整定结果槽位不再“需要整定”即视为完成。

use crate::error::BaseError;
use scb_control::PidConfig;
use serde_json::{Value, json};

/// `do_command` 中查询整定结果的键
pub const GET_TUNED_PID: &str = "get_tuned_pid";

/// 自动整定状态
#[derive(Debug, Clone, PartialEq)]
pub enum TuningStatus {
    /// 没有通道请求整定
    NotRequested,
    /// 整定进行中
    InProgress,
    /// 整定完成，携带整定得到的参数组
    Ready(Vec<PidConfig>),
}

impl TuningStatus {
    /// 转换为命令结果：`NotRequested` 为 `Ok`，其余为对应的整定信号
    pub fn into_result(self, name: &str) -> Result<(), BaseError> {
        match self {
            Self::NotRequested => Ok(()),
            Self::InProgress => Err(BaseError::TuningInProgress {
                name: name.to_string(),
            }),
            Self::Ready(values) => Err(BaseError::TunedValuesReady {
                name: name.to_string(),
                values,
            }),
        }
    }
}

/// 计算整定状态
///
/// `configured` 与 `tuned` 按通道一一对应。
pub fn tuning_status(configured: &[PidConfig], tuned: &[PidConfig]) -> TuningStatus {
    let mut requested = false;
    let mut done = true;
    for (i, config) in configured.iter().enumerate() {
        if config.needs_auto_tuning() {
            requested = true;
            done &= tuned.get(i).is_some_and(|t| !t.needs_auto_tuning());
        }
    }

    match (requested, done) {
        (false, _) => TuningStatus::NotRequested,
        (true, false) => TuningStatus::InProgress,
        (true, true) => TuningStatus::Ready(discovered(tuned)),
    }
}

/// 已整定的参数组
pub fn discovered(tuned: &[PidConfig]) -> Vec<PidConfig> {
    tuned.iter().filter(|t| !t.needs_auto_tuning()).copied().collect()
}

/// `get_tuned_pid` 的响应体
pub fn tuned_pid_response(tuned: &[PidConfig]) -> Value {
    let params: Vec<Value> = discovered(tuned)
        .into_iter()
        .map(|c| json!({"type": c.kind.as_str(), "p": c.p, "i": c.i, "d": c.d}))
        .collect();
    Value::Array(params)
}
