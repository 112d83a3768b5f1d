//! Author-placed markers inside a panorama.

use crate::types::PanoramaId;

/// Navigational marker pointing at another panorama.
///
/// The target is a persistent id, not a reference: it may outlive the panorama it names, in
/// which case the hotspot simply has an invalid target.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkHotspot {
    yaw: f64,
    pitch: f64,
    rotation: f64,
    target: PanoramaId,
}

impl LinkHotspot {
    pub fn new(yaw: f64, pitch: f64, target: PanoramaId) -> Self {
        Self { yaw, pitch, rotation: 0.0, target }
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn target(&self) -> PanoramaId {
        self.target
    }

    pub fn set_coordinates(&mut self, yaw: f64, pitch: f64) {
        self.yaw = yaw;
        self.pitch = pitch;
    }

    /// Rotate the marker by `delta` radians.
    pub fn offset_rotation(&mut self, delta: f64) {
        self.rotation += delta;
    }

    pub fn set_target(&mut self, target: PanoramaId) {
        self.target = target;
    }
}

/// Informational marker with a title and body text.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoHotspot {
    yaw: f64,
    pitch: f64,
    title: String,
    text: String,
    initial_title: String,
    initial_text: String,
}

impl InfoHotspot {
    pub fn new(yaw: f64, pitch: f64, title: impl Into<String>, text: impl Into<String>) -> Self {
        let title = title.into();
        let text = text.into();
        Self { yaw, pitch, initial_title: title.clone(), initial_text: text.clone(), title, text }
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_coordinates(&mut self, yaw: f64, pitch: f64) {
        self.yaw = yaw;
        self.pitch = pitch;
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// True while title and text still match what the hotspot was created with.
    pub fn is_unchanged(&self) -> bool {
        self.title == self.initial_title && self.text == self.initial_text
    }
}
