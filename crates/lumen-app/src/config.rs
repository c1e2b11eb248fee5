//! Application configuration.

/// Window and device settings for [`run_app`](crate::run_app).
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Window width in pixels.
    pub width: u32,
    /// Window height in pixels.
    pub height: u32,
    /// Borderless fullscreen on the current monitor.
    pub fullscreen: bool,
    /// Hide and lock the cursor so mouse motion arrives as raw deltas.
    pub mouse_capture: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lumen".to_string(),
            width: 1600,
            height: 900,
            fullscreen: false,
            mouse_capture: false,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub const fn with_fullscreen(mut self, fullscreen: bool) -> Self {
        self.fullscreen = fullscreen;
        self
    }

    #[must_use]
    pub const fn with_mouse_capture(mut self, capture: bool) -> Self {
        self.mouse_capture = capture;
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = AppConfig::new("Viewer")
            .with_size(800, 600)
            .with_fullscreen(true)
            .with_mouse_capture(true)
            .with_validation(false);
        assert_eq!(config.title, "Viewer");
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.fullscreen);
        assert!(config.mouse_capture);
        assert!(!config.validation);
    }

    #[test]
    fn default_is_windowed() {
        let config = AppConfig::default();
        assert!(!config.fullscreen);
        assert!(!config.mouse_capture);
        assert_eq!((config.width, config.height), (1600, 900));
    }
}
