//! Project files: a versioned JSON document holding one engine snapshot

use crate::error::ShowError;
use lux_render::{Engine, EngineSnapshot, Registry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub version: u32,
    pub engine: EngineSnapshot,
}

impl Project {
    pub const VERSION: u32 = 1;

    pub fn capture(engine: &Engine) -> Self {
        Self {
            version: Self::VERSION,
            engine: engine.snapshot(),
        }
    }

    /// Replace the engine's show with this project's
    pub fn apply(&self, engine: &Engine, registry: &Registry) -> Result<(), ShowError> {
        engine.restore(&self.engine, registry)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ShowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ShowError> {
        let project: Project = serde_json::from_str(json)?;
        if project.version > Self::VERSION {
            return Err(ShowError::UnsupportedVersion(project.version));
        }
        Ok(project)
    }

    pub fn save(&self, path: &Path) -> Result<(), ShowError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), "project saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ShowError> {
        let json = fs::read_to_string(path)?;
        let project = Self::from_json(&json)?;
        info!(
            channels = project.engine.channels.len(),
            path = %path.display(),
            "project loaded"
        );
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_render::builtin::{Chase, Dim, Solid};
    use lux_render::{Channel, EffectSlot, EngineConfig, Pattern, StripModel};
    use std::sync::Arc;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default(), Arc::new(StripModel::new(6)))
    }

    fn show() -> Engine {
        let engine = engine();
        let mut ch = Channel::new(vec![
            Pattern::new(Solid::new(0xFF00_FF00)).with_label("green"),
            Pattern::new(Chase::new()),
        ])
        .unwrap()
        .with_label("front");
        ch.set_fader(0.5);
        ch.add_effect(EffectSlot::new(Dim));
        engine.add_channel(ch);
        engine
    }

    #[test]
    fn test_save_load_apply() {
        let dir = std::env::temp_dir().join(format!("lux-project-{}", std::process::id()));
        let path = dir.join("show.json");

        Project::capture(&show()).save(&path).unwrap();
        let project = Project::load(&path).unwrap();
        assert_eq!(project.version, Project::VERSION);

        let target = engine();
        project.apply(&target, &Registry::with_builtins()).unwrap();
        assert_eq!(target.channel_count(), 1);
        let ch = target.channel(0).unwrap();
        let ch = ch.lock();
        assert_eq!(ch.label(), "front");
        assert_eq!(ch.fader(), 0.5);
        assert_eq!(ch.pattern_count(), 2);
        assert_eq!(ch.patterns()[0].label(), "green");
        assert_eq!(ch.effects()[0].kind(), "dim");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut project = Project::capture(&show());
        project.version = Project::VERSION + 1;
        let json = project.to_json().unwrap();
        assert!(matches!(
            Project::from_json(&json),
            Err(ShowError::UnsupportedVersion(v)) if v == Project::VERSION + 1
        ));
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        let missing = std::env::temp_dir().join("lux-no-such-project.json");
        assert!(matches!(Project::load(&missing), Err(ShowError::Io(_))));
        assert!(matches!(Project::from_json("{"), Err(ShowError::Json(_))));
    }

    #[test]
    fn test_unknown_kind_is_a_render_error() {
        let mut project = Project::capture(&show());
        project.engine.channels[0].patterns[0].kind = "strobe".into();
        let target = engine();
        assert!(matches!(
            project.apply(&target, &Registry::with_builtins()),
            Err(ShowError::Render(_))
        ));
        assert_eq!(target.channel_count(), 0);
    }
}
