//! Window/display manager collaborator.

use crate::domain::error::Result;

/// Callbacks from the window manager.
///
/// Display events carry the window-system client id returned by
/// [`WindowCollaborator::create_display`], not the instance id.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    /// The client rendered its first frame.
    Ready { client: String },
    /// The client's display connection dropped.
    Disconnected { client: String },
    /// No user input for `minutes`.
    UserInactivity { minutes: f64 },
}

/// Abstraction over the window/display manager.
pub trait WindowCollaborator: Send + Sync {
    /// Creates a display surface for the instance and returns its client id.
    ///
    /// # Errors
    ///
    /// Returns an error if the display could not be created.
    fn create_display(&self, app_instance_id: &str) -> Result<String>;

    /// Reports whether the instance has already rendered a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the window manager does not know the instance.
    fn render_ready(&self, app_instance_id: &str) -> Result<bool>;
}
