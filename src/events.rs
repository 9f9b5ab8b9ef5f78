use crate::engine::PlaybackInterval;

/// Control requests forwarded from the web layer to the slideshow task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideshowCommand {
    Next,
    /// Same randomized advance as `Next`; there is no backwards history.
    Previous,
    TogglePlayback,
    SetInterval(PlaybackInterval),
}
