//! # scb-control
//!
//! 周期性 PID 控制循环引擎。
//!
//! - [`ControlConfig`] / [`BlockConfig`]：`constant → pid → endpoint` 块拓扑
//! - [`ControlLoop`]：后台线程、生命周期（start / pause / resume / stop）、设定值更新
//! - [`Controllable`]：引擎回调的被控对象接口
//! - [`RelayTuner`] / [`TunedValues`]：继电器自动整定及其结果槽位

pub mod config;
pub mod endpoint;
pub mod error;
pub mod loop_runner;
pub mod pid;
pub mod tuning;

pub use config::{BlockConfig, BlockKind, BlockTag, ChannelPlan, ControlConfig, Topology, TuningOptions};
pub use endpoint::Controllable;
pub use error::ControlError;
pub use loop_runner::{ControlLoop, LoopState, LoopStats, StopHandle};
pub use pid::{PidConfig, PidController, PidKind};
pub use tuning::{RelayTuner, TunedValues, TunerStep};
