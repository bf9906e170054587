//! 被控对象接口
//!
//! 控制循环每个周期先调用 [`Controllable::state`] 读取测量值，
//! 再调用 [`Controllable::set_state`] 写入校正后的执行量。
//! 两个调用都在控制循环的后台线程中执行。

use scb_components::CancelToken;

/// 被控对象（控制循环端点）
///
/// 信号向量按通道顺序排列，长度必须等于控制循环的通道数。
///
/// # 示例
///
/// ```rust
/// use scb_components::CancelToken;
/// use scb_control::Controllable;
/// use std::sync::Mutex;
///
/// struct Plant {
///     velocity: Mutex<f64>,
/// }
///
/// impl Controllable for Plant {
///     type Error = std::io::Error;
///
///     fn state(&self, _token: &CancelToken) -> Result<Vec<f64>, Self::Error> {
///         Ok(vec![*self.velocity.lock().unwrap()])
///     }
///
///     fn set_state(&self, _token: &CancelToken, signals: &[f64]) -> Result<(), Self::Error> {
///         *self.velocity.lock().unwrap() = signals[0];
///         Ok(())
///     }
/// }
/// ```
pub trait Controllable: Send + Sync {
    /// 读写失败时的错误类型
    type Error: std::error::Error + Send + Sync + 'static;

    /// 读取测量值
    fn state(&self, token: &CancelToken) -> Result<Vec<f64>, Self::Error>;

    /// 写入执行量
    fn set_state(&self, token: &CancelToken, signals: &[f64]) -> Result<(), Self::Error>;
}
