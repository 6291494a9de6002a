use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no receivers configured")]
    NoReceivers,
    #[error("failed to deliver status message: {message}")]
    Delivery { message: String },
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("memory monitor is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Notify(#[from] NotifyError),
}
