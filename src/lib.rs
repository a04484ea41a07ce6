pub mod audiodev;
pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod phase;
pub mod postprocess;
pub mod proxy;
pub mod session;
pub mod sync;
pub mod timing;
pub mod trim;

pub use browser::{BrowserControl, PlaybackData, PlaybackHandler, StdioBrowser};
pub use capture::{CommandFactory, ProcessManager, Quality};
pub use config::Config;
pub use error::CaptureError;
pub use phase::{
    AnalyzeResult, Phase, PhaseEvent, PhaseKind, PhaseState, Pipeline, RecordInfo,
};
pub use session::Session;
