use tokio::sync::oneshot;

/// Requests from the facade to the session loop. Each carries a reply
/// channel fired once the loop has published the resulting state.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Join { done: oneshot::Sender<()> },
    AcquireMedia { done: oneshot::Sender<()> },
    ReleaseMedia { done: oneshot::Sender<bool> },
    StartCall { done: oneshot::Sender<()> },
    EndCall { done: oneshot::Sender<()> },
    ToggleMute { done: oneshot::Sender<Option<bool>> },
    ToggleVideo { done: oneshot::Sender<Option<bool>> },
    ClearError { done: oneshot::Sender<()> },
    Shutdown { done: oneshot::Sender<()> },
}
