//! Placeholder values available to launch templates
use crate::config::LauncherConfig;
use crate::game::launcher::classpath::classpath_separator;
use crate::game::launcher::sanitize::{sanitize_path, sanitize_text, strip_controls, EMPTY_OBJECT};
use crate::game::launcher::types::LaunchRequest;
use dunce::canonicalize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Path(PathBuf),
    /// Separator-joined library paths, already in host form
    Classpath(String),
    /// Passed through as `{}` untouched
    EmptyObject,
}

impl Value {
    /// Final argument text, sanitized by kind
    pub fn render(&self) -> String {
        match self {
            Value::Text(text) => sanitize_text(text),
            Value::Path(path) => sanitize_path(path),
            Value::Classpath(entries) => strip_controls(entries),
            Value::EmptyObject => EMPTY_OBJECT.to_string(),
        }
    }
}

/// Outcome of looking a placeholder up
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// No resolver exists for this name
    Unknown,
    /// Known name without a value for this launch
    Absent,
    Present(&'a Value),
}

#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    values: HashMap<String, Option<Value>>,
}

impl LaunchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values
            .insert(name.to_string(), Some(Value::Text(value.into())));
        self
    }

    pub fn set_path(&mut self, name: &str, value: impl Into<PathBuf>) -> &mut Self {
        self.values
            .insert(name.to_string(), Some(Value::Path(value.into())));
        self
    }

    pub fn set_classpath(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values
            .insert(name.to_string(), Some(Value::Classpath(value.into())));
        self
    }

    pub fn set_empty_object(&mut self, name: &str) -> &mut Self {
        self.values.insert(name.to_string(), Some(Value::EmptyObject));
        self
    }

    /// Register `name` as known; entries using it are dropped while it is `None`.
    pub fn set_optional(&mut self, name: &str, value: Option<String>) -> &mut Self {
        self.values.insert(name.to_string(), value.map(Value::Text));
        self
    }

    pub fn resolve(&self, name: &str) -> Lookup<'_> {
        match self.values.get(name) {
            None => Lookup::Unknown,
            Some(None) => Lookup::Absent,
            Some(Some(value)) => Lookup::Present(value),
        }
    }

    /// Standard placeholder table for a launch
    pub fn build(
        request: &LaunchRequest,
        natives_dir: &Path,
        classpath: &str,
        config: &LauncherConfig,
    ) -> Self {
        let mut ctx = Self::new();
        let auth = &request.auth;
        let profile = &request.profile;
        let version = &request.version;

        // Player info, under every name version metadata uses for it
        ctx.set_text("auth_player_name", &auth.username)
            .set_text("player_name", &auth.username)
            .set_text("auth_uuid", &auth.uuid)
            .set_text("uuid", &auth.uuid)
            .set_text("auth_access_token", &auth.access_token)
            .set_text("accessToken", &auth.access_token)
            .set_text("auth_session", &auth.access_token)
            .set_text("user_type", &auth.user_type)
            .set_optional("auth_xuid", auth.xuid.clone())
            .set_text("clientid", &auth.client_id)
            .set_empty_object("user_properties");

        ctx.set_text("version_name", &version.id).set_text(
            "version_type",
            version.version_type.as_deref().unwrap_or("release"),
        );

        let assets_root = canonical_or_raw(&request.assets_dir());
        ctx.set_path("game_directory", canonical_or_raw(&profile.game_dir))
            .set_path("assets_root", assets_root.clone())
            .set_path("game_assets", assets_root)
            .set_optional("assets_index_name", version.asset_index.clone());

        ctx.set_optional(
            "resolution_width",
            profile.window_width.map(|w| w.to_string()),
        )
        .set_optional(
            "resolution_height",
            profile.window_height.map(|h| h.to_string()),
        );

        ctx.set_path("natives_directory", canonical_or_raw(natives_dir))
            .set_path("library_directory", canonical_or_raw(&request.libraries_dir()))
            .set_text("launcher_name", &config.launcher_name)
            .set_text("launcher_version", &config.launcher_version)
            .set_classpath("classpath", classpath)
            .set_text("classpath_separator", classpath_separator());

        ctx
    }
}

fn canonical_or_raw(path: &Path) -> PathBuf {
    canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
