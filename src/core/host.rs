//! Host collaborators injected into a session

use std::path::PathBuf;

use super::geometry::ViewportSize;

/// Reports the size of the container the screen is drawn into
pub trait ViewportAdapter {
    /// Current size, or `None` while the container is not laid out
    fn size(&self) -> Option<ViewportSize>;
}

/// System clipboard access
pub trait Clipboard {
    fn write(&mut self, text: &str);
    fn read(&mut self) -> Option<String>;
}

/// Lists the project directories open in the host
pub trait ProjectPathResolver {
    fn project_paths(&self) -> Vec<PathBuf>;
}

/// Fixed list of project paths
#[derive(Debug, Clone, Default)]
pub struct StaticProjects(pub Vec<PathBuf>);

impl ProjectPathResolver for StaticProjects {
    fn project_paths(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}
