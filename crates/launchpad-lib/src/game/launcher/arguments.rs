//! Argument vector assembly for launching the game.
//!
//! Templates are evaluated entry by entry: a flag and its value are emitted
//! together or not at all. A placeholder the context has no resolver for is a
//! hard error; a known placeholder without a value (no xuid, no custom
//! resolution, empty token) drops its whole entry so no orphan flag is left.
use crate::config::LauncherConfig;
use crate::error::AssemblyError;
use crate::game::launcher::context::{LaunchContext, Lookup};
use crate::game::launcher::sanitize::sanitize_text;
use crate::game::launcher::template::{CompiledTemplate, Expr, Segment};
use crate::game::launcher::types::{Profile, VersionMetadata};

const NATIVES_PATH_PREFIX: &str = "-Djava.library.path=";
const BRAND_PREFIX: &str = "-Dminecraft.launcher.brand=";
const BRAND_VERSION_PREFIX: &str = "-Dminecraft.launcher.version=";

#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchArgumentAssembler;

impl LaunchArgumentAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a compiled template against `ctx`.
    pub fn assemble(
        &self,
        template: &CompiledTemplate,
        ctx: &LaunchContext,
    ) -> Result<Vec<String>, AssemblyError> {
        let mut args = Vec::new();

        for entry in &template.entries {
            let flag = match &entry.flag {
                Some(expr) => match evaluate(expr, ctx, template.source())? {
                    Some(flag) => Some(flag),
                    None => continue,
                },
                None => None,
            };
            let value = match &entry.value {
                Some(expr) => match evaluate(expr, ctx, template.source())? {
                    Some(value) => Some(value),
                    None => continue,
                },
                None => None,
            };

            args.extend(flag);
            args.extend(value);
        }

        Ok(args)
    }

    /// Full argument vector after the executable: JVM flags, main class,
    /// game arguments.
    pub fn build_command_line(
        &self,
        version: &VersionMetadata,
        profile: &Profile,
        ctx: &LaunchContext,
        config: &LauncherConfig,
    ) -> Result<Vec<String>, AssemblyError> {
        let mut args = self.build_jvm_arguments(version, profile, ctx, config)?;
        args.push(version.main_class.clone());
        args.extend(self.build_game_arguments(version, profile, ctx)?);
        Ok(args)
    }

    pub fn build_jvm_arguments(
        &self,
        version: &VersionMetadata,
        profile: &Profile,
        ctx: &LaunchContext,
        config: &LauncherConfig,
    ) -> Result<Vec<String>, AssemblyError> {
        let mut args = memory_args(profile);

        // Custom flags replace the default tuning
        if profile.jvm_args.is_empty() {
            args.extend(default_tuning_args());
        } else {
            args.extend(user_args(&profile.jvm_args));
        }

        let template = version
            .jvm_arguments
            .as_ref()
            .map(|t| t.compile())
            .transpose()?;

        let mentions = |prefix: &str| {
            template
                .as_ref()
                .is_some_and(|t| t.mentions_literal_prefix(prefix))
        };

        if !mentions(NATIVES_PATH_PREFIX) {
            args.push(format!("{}{}", NATIVES_PATH_PREFIX, rendered(ctx, "natives_directory")));
        }
        if !mentions(BRAND_PREFIX) {
            args.push(format!("{}{}", BRAND_PREFIX, sanitize_text(&config.launcher_name)));
        }
        if !mentions(BRAND_VERSION_PREFIX) {
            args.push(format!(
                "{}{}",
                BRAND_VERSION_PREFIX,
                sanitize_text(&config.launcher_version)
            ));
        }

        match &template {
            Some(template) => args.extend(self.assemble(template, ctx)?),
            // Old versions carry no JVM template, so nothing else passes the classpath
            None => {
                args.push("-cp".to_string());
                args.push(rendered(ctx, "classpath"));
            }
        }

        Ok(args)
    }

    pub fn build_game_arguments(
        &self,
        version: &VersionMetadata,
        profile: &Profile,
        ctx: &LaunchContext,
    ) -> Result<Vec<String>, AssemblyError> {
        let template = version.game_arguments.compile()?;
        let mut args = self.assemble(&template, ctx)?;
        args.extend(user_args(&profile.game_args));
        Ok(args)
    }
}

/// `None` when the expression uses a known placeholder that has no value,
/// or renders to blank text.
fn evaluate(
    expr: &Expr,
    ctx: &LaunchContext,
    source: &str,
) -> Result<Option<String>, AssemblyError> {
    let mut out = String::new();
    let mut absent = false;

    for segment in expr.segments() {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(name) => match ctx.resolve(name) {
                Lookup::Unknown => {
                    return Err(AssemblyError::UnresolvedPlaceholder {
                        name: name.clone(),
                        template: source.to_string(),
                    })
                }
                Lookup::Absent => absent = true,
                Lookup::Present(value) => {
                    let rendered = value.render();
                    if rendered.trim().is_empty() {
                        absent = true;
                    }
                    out.push_str(&rendered);
                }
            },
        }
    }

    if absent {
        return Ok(None);
    }
    Ok(Some(out))
}

fn rendered(ctx: &LaunchContext, name: &str) -> String {
    match ctx.resolve(name) {
        Lookup::Present(value) => value.render(),
        Lookup::Unknown | Lookup::Absent => String::new(),
    }
}

/// Profile-supplied extras, sanitized like any resolved value. Entries left
/// blank are dropped.
fn user_args(raw: &[String]) -> impl Iterator<Item = String> + '_ {
    raw.iter()
        .map(|arg| sanitize_text(arg))
        .filter(|arg| !arg.trim().is_empty())
}

fn memory_args(profile: &Profile) -> Vec<String> {
    vec![
        profile
            .min_memory
            .map(|mb| format!("-Xms{}M", mb))
            .unwrap_or_else(|| "-Xms2G".to_string()),
        profile
            .max_memory
            .map(|mb| format!("-Xmx{}M", mb))
            .unwrap_or_else(|| "-Xmx4G".to_string()),
    ]
}

fn default_tuning_args() -> Vec<String> {
    [
        "-XX:+UseG1GC",
        "-XX:+UnlockExperimentalVMOptions",
        "-XX:G1NewSizePercent=20",
        "-XX:G1ReservePercent=20",
        "-XX:MaxGCPauseMillis=50",
        "-XX:G1HeapRegionSize=32M",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
