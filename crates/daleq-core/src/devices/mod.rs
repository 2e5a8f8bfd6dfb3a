// ── Concrete leaf devices ──

mod noop;
mod relay;

pub use noop::NoopSensor;
pub use relay::Relay;
