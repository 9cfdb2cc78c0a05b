use crate::error::VerificationError;
use crate::utils::process::hide_console;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// What an execution probe learned about a runtime executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub major: u32,
    pub full_version: String,
}

/// Runs a runtime executable to confirm it starts and reports its version.
pub trait RuntimeProbe: Send + Sync {
    fn probe<'a>(&'a self, executable: &'a Path)
        -> BoxFuture<'a, Result<ProbeReport, VerificationError>>;
}

/// Probes with `java -version`
#[derive(Debug, Clone)]
pub struct JavaVersionProbe {
    timeout: Duration,
}

impl JavaVersionProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, executable: &Path) -> Result<ProbeReport, VerificationError> {
        let failed = |reason: String| VerificationError::ExecutionProbeFailed {
            path: executable.to_path_buf(),
            reason,
        };

        let mut cmd = tokio::process::Command::new(executable);
        cmd.arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        hide_console(&mut cmd);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| failed(format!("no answer within {:?}", self.timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            return Err(failed(format!("exited with {}", output.status)));
        }

        // java -version writes to stderr; some builds use stdout
        let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stdout));

        parse_version_output(&text)
            .ok_or_else(|| failed(format!("unrecognized version output: {}", text.trim())))
    }
}

impl Default for JavaVersionProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::config::DEFAULT_PROBE_TIMEOUT_SECS))
    }
}

impl RuntimeProbe for JavaVersionProbe {
    fn probe<'a>(
        &'a self,
        executable: &'a Path,
    ) -> BoxFuture<'a, Result<ProbeReport, VerificationError>> {
        Box::pin(self.run(executable))
    }
}

static VERSION_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"version\s+"?((\d+)(\.(\d+))?[^"\s]*)"?"#).ok());

/// Parse `java -version` output such as `openjdk version "17.0.1" 2021-10-19`,
/// `java version "1.8.0_311"` or `openjdk version "21-ea"`.
pub fn parse_version_output(output: &str) -> Option<ProbeReport> {
    let re = VERSION_RE.as_ref()?;
    let caps = re.captures(output)?;
    let full_version = caps.get(1)?.as_str().to_string();
    let first = caps.get(2)?.as_str().parse::<u32>().ok()?;

    let major = if first == 1 {
        // 1.8.x -> 8
        caps.get(4)?.as_str().parse::<u32>().ok()?
    } else {
        first
    };

    Some(ProbeReport {
        major,
        full_version,
    })
}

/// Find the java executable in a runtime directory.
///
/// Handles `bin/java` at the root, one nested directory (`jdk-17.0.9+9/bin/java`)
/// and the macOS bundle layout (`Contents/Home/bin/java`).
pub fn find_java_executable(dir: &Path) -> Option<PathBuf> {
    let executable_name = if cfg!(windows) { "java.exe" } else { "java" };

    let direct = dir.join("bin").join(executable_name);
    if direct.is_file() {
        return Some(direct);
    }

    let macos = dir.join("Contents/Home/bin").join(executable_name);
    if macos.is_file() {
        return Some(macos);
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();

    for entry in entries {
        let nested = entry.join("bin").join(executable_name);
        if nested.is_file() {
            return Some(nested);
        }

        let nested_macos = entry.join("Contents/Home/bin").join(executable_name);
        if nested_macos.is_file() {
            return Some(nested_macos);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_version_strings() {
        let cases = [
            (r#"openjdk version "17.0.1" 2021-10-19"#, 17, "17.0.1"),
            (r#"java version "1.8.0_311""#, 8, "1.8.0_311"),
            (r#"openjdk version "21-ea" 2023-09-19"#, 21, "21-ea"),
            (r#"openjdk version "21.0.2" 2024-01-16 LTS"#, 21, "21.0.2"),
        ];
        for (text, major, full) in cases {
            let report = parse_version_output(text).unwrap();
            assert_eq!(report.major, major, "{}", text);
            assert_eq!(report.full_version, full, "{}", text);
        }
    }

    #[test]
    fn rejects_unrelated_output() {
        assert!(parse_version_output("Error: could not find libjava.so").is_none());
    }

    #[test]
    fn finds_executable_layouts() {
        let exe = if cfg!(windows) { "java.exe" } else { "java" };
        let tmp = tempfile::tempdir().unwrap();

        let direct = tmp.path().join("direct");
        std::fs::create_dir_all(direct.join("bin")).unwrap();
        std::fs::write(direct.join("bin").join(exe), b"").unwrap();
        assert_eq!(find_java_executable(&direct), Some(direct.join("bin").join(exe)));

        let nested = tmp.path().join("nested");
        std::fs::create_dir_all(nested.join("jdk-17.0.9/bin")).unwrap();
        std::fs::write(nested.join("jdk-17.0.9/bin").join(exe), b"").unwrap();
        assert_eq!(
            find_java_executable(&nested),
            Some(nested.join("jdk-17.0.9/bin").join(exe))
        );

        let mac = tmp.path().join("mac");
        std::fs::create_dir_all(mac.join("zulu-21.jre/Contents/Home/bin")).unwrap();
        std::fs::write(mac.join("zulu-21.jre/Contents/Home/bin").join(exe), b"").unwrap();
        assert!(find_java_executable(&mac).is_some());

        assert!(find_java_executable(&tmp.path().join("empty")).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probes_a_script_runtime() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("java");
        std::fs::write(
            &exe,
            "#!/bin/sh\necho 'openjdk version \"17.0.9\" 2023-10-17' >&2\n",
        )
        .unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let report = JavaVersionProbe::default().probe(&exe).await.unwrap();
        assert_eq!(report.major, 17);
        assert_eq!(report.full_version, "17.0.9");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_runtime_is_a_probe_failure() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("java");
        std::fs::write(&exe, "#!/bin/sh\nexit 3\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = JavaVersionProbe::default().probe(&exe).await.unwrap_err();
        assert!(matches!(err, VerificationError::ExecutionProbeFailed { .. }));
    }
}
