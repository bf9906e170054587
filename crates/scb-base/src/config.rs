//! 传感器闭环底盘配置
//!
//! 支持 JSON 和 TOML 两种格式，字段名与宿主框架的组件属性一致：
//!
//! ```json
//! {
//!   "movement_sensor": ["imu", "odometry"],
//!   "base": "wheels",
//!   "control_parameters": [
//!     {"type": "linear_velocity", "p": 0.5, "i": 2.0, "d": 0.0},
//!     {"type": "angular_velocity", "p": 0.0, "i": 0.0, "d": 0.0}
//!   ],
//!   "control_frequency_hz": 20
//! }
//! ```
//!
//! 增益全为零的参数组表示“请求自动整定”。

use crate::error::ConfigError;
use scb_control::{PidConfig, PidKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 默认控制频率（Hz）
pub const DEFAULT_CONTROL_FREQUENCY_HZ: f64 = 10.0;

/// 传感器闭环底盘配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScbConfig {
    /// 运动传感器名称（按优先级排列）
    #[serde(rename = "movement_sensor", default)]
    pub movement_sensors: Vec<String>,

    /// 被控底盘名称
    #[serde(default)]
    pub base: String,

    /// PID 参数组（每种类型最多一组）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub control_parameters: Vec<PidConfig>,

    /// 控制频率（Hz），缺省或为 0 时使用 [`DEFAULT_CONTROL_FREQUENCY_HZ`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_frequency_hz: Option<f64>,
}

impl ScbConfig {
    /// 创建不带 PID 参数的配置（开环透传）
    pub fn new<S: Into<String>>(movement_sensors: impl IntoIterator<Item = S>, base: impl Into<String>) -> Self {
        Self {
            movement_sensors: movement_sensors.into_iter().map(Into::into).collect(),
            base: base.into(),
            control_parameters: Vec::new(),
            control_frequency_hz: None,
        }
    }

    /// 设置 PID 参数组
    pub fn with_control_parameters(mut self, params: Vec<PidConfig>) -> Self {
        self.control_parameters = params;
        self
    }

    /// 设置控制频率
    pub fn with_control_frequency(mut self, hz: f64) -> Self {
        self.control_frequency_hz = Some(hz);
        self
    }

    /// 校验配置，返回隐式依赖的组件名称（传感器在前，底盘在后）
    pub fn validate(&self, path: &str) -> Result<Vec<String>, ConfigError> {
        if self.movement_sensors.is_empty() {
            return Err(ConfigError::NoMovementSensor {
                path: path.to_string(),
            });
        }
        if self.base.is_empty() {
            return Err(ConfigError::MissingBase {
                path: path.to_string(),
            });
        }

        let mut seen = [false; 2];
        for pid in &self.control_parameters {
            let index = pid.kind.index();
            if seen[index] {
                return Err(ConfigError::DuplicatePid {
                    path: path.to_string(),
                    kind: pid.kind,
                });
            }
            seen[index] = true;
        }

        if let Some(hz) = self.control_frequency_hz
            && (hz.is_nan() || hz < 0.0 || hz.is_infinite())
        {
            return Err(ConfigError::InvalidFrequency {
                path: path.to_string(),
                value: hz,
            });
        }

        let mut deps = self.movement_sensors.clone();
        deps.push(self.base.clone());
        Ok(deps)
    }

    /// 生效的控制频率
    pub fn control_frequency(&self) -> f64 {
        match self.control_frequency_hz {
            Some(hz) if hz > 0.0 => hz,
            _ => DEFAULT_CONTROL_FREQUENCY_HZ,
        }
    }

    /// 按通道排列的 PID 参数组（下标 0 线速度，1 角速度）
    ///
    /// 未配置的通道返回增益全零的参数组。
    pub fn pid_sets(&self) -> [PidConfig; 2] {
        let mut sets = PidKind::ALL.map(PidConfig::untuned);
        for pid in &self.control_parameters {
            sets[pid.kind.index()] = *pid;
        }
        sets
    }

    /// 从 JSON 字符串解析
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 从文件加载（按扩展名选择格式，`.toml` 之外均按 JSON 解析）
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_returns_dependencies() {
        let config = ScbConfig::new(["imu", "odom"], "wheels");
        assert_eq!(config.validate("scb").unwrap(), vec!["imu", "odom", "wheels"]);
    }

    #[test]
    fn test_validate_requires_sensor_and_base() {
        let config = ScbConfig::new(Vec::<String>::new(), "wheels");
        assert_eq!(
            config.validate("scb"),
            Err(ConfigError::NoMovementSensor {
                path: "scb".to_string()
            })
        );

        let config = ScbConfig::new(["imu"], "");
        assert!(matches!(config.validate("scb"), Err(ConfigError::MissingBase { .. })));
    }

    #[test]
    fn test_validate_rejects_duplicate_pid() {
        let config = ScbConfig::new(["imu"], "wheels").with_control_parameters(vec![
            PidConfig::new(PidKind::AngularVelocity, 1.0, 0.0, 0.0),
            PidConfig::untuned(PidKind::AngularVelocity),
        ]);
        assert_eq!(
            config.validate("scb"),
            Err(ConfigError::DuplicatePid {
                path: "scb".to_string(),
                kind: PidKind::AngularVelocity
            })
        );
    }

    #[test]
    fn test_control_frequency() {
        let config = ScbConfig::new(["imu"], "wheels");
        assert_eq!(config.control_frequency(), DEFAULT_CONTROL_FREQUENCY_HZ);
        assert_eq!(config.clone().with_control_frequency(0.0).control_frequency(), 10.0);
        assert_eq!(config.clone().with_control_frequency(50.0).control_frequency(), 50.0);
        assert!(config.with_control_frequency(-1.0).validate("scb").is_err());
    }

    #[test]
    fn test_pid_sets_fill_missing_axis() {
        let config = ScbConfig::new(["imu"], "wheels").with_control_parameters(vec![
            PidConfig::new(PidKind::AngularVelocity, 0.3, 0.1, 0.0),
        ]);
        let [linear, angular] = config.pid_sets();
        assert_eq!(linear.kind, PidKind::LinearVelocity);
        assert!(linear.needs_auto_tuning());
        assert_eq!(angular.p, 0.3);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "movement_sensor": ["imu", "odom"],
            "base": "wheels",
            "control_parameters": [
                {"type": "linear_velocity", "p": 0.5, "i": 2.0, "d": 0.0},
                {"type": "angular_velocity"}
            ],
            "control_frequency_hz": 20
        }"#;
        let config = ScbConfig::from_json_str(json).unwrap();
        assert_eq!(config.movement_sensors, vec!["imu", "odom"]);
        assert_eq!(config.control_frequency(), 20.0);
        assert!(config.pid_sets()[1].needs_auto_tuning());
    }

    #[test]
    fn test_parse_json_unknown_pid_type() {
        let json = r#"{
            "movement_sensor": ["imu"],
            "base": "wheels",
            "control_parameters": [{"type": "position", "p": 1.0}]
        }"#;
        let err = ScbConfig::from_json_str(json).unwrap_err();
        assert!(
            err.to_string()
                .contains("control_parameters type must be 'linear_velocity' or 'angular_velocity'"),
            "{}",
            err
        );
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            movement_sensor = ["odom"]
            base = "wheels"
            control_frequency_hz = 25.0

            [[control_parameters]]
            type = "linear_velocity"
            p = 0.5
            i = 2.0
        "#;
        let config = ScbConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.base, "wheels");
        assert_eq!(config.pid_sets()[0].i, 2.0);
        assert_eq!(config.control_frequency(), 25.0);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = ScbConfig::load_from_file("/nonexistent/scb.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
