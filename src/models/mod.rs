//! Data models for Bibliotecario.

mod session;

pub use session::{
    DownloadFile, DownloadInfo, ExportFormat, ExportSelection, ProcessingOptions,
    ProcessingSession, ProcessingStats, SessionResult, SessionStatus, StatusSnapshot,
};
