//! CLI command implementations

use crate::output::{emit, OutputFormat};
use crate::ScriptArgs;
use anyhow::Context;
use reelkit_core::classify::inspect;
use reelkit_core::loader::{
    FetchedScript, HttpScriptHost, ScriptHost, ScriptLoader, SdkScript,
};
use reelkit_core::state::normalize_qualities;
use reelkit_core::{BackendKind, PlayerConfig, PlayerOptions, Source};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// classify
// =============================================================================

#[derive(Serialize)]
struct ClassifyReport {
    file: String,
    kind: BackendKind,
    embedded: bool,
    id: Option<String>,
}

impl fmt::Display for ClassifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source: {}", self.file)?;
        writeln!(f, "  Backend: {}", self.kind)?;
        if self.embedded {
            match &self.id {
                Some(id) => writeln!(f, "  Video id: {id}")?,
                None => writeln!(f, "  Video id: not recognized")?,
            }
        }
        Ok(())
    }
}

/// Classify a source string
pub fn classify(file: &str, kind: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let mut source = Source::new(file);
    if let Some(kind) = kind {
        source = source.with_kind(kind.parse::<BackendKind>()?);
    }

    let classification = inspect(&source);
    if classification.kind.is_embedded() && classification.id.is_none() {
        warn!(file, kind = %classification.kind, "No video id could be extracted");
    }

    emit(
        &ClassifyReport {
            file: source.file,
            kind: classification.kind,
            embedded: classification.kind.is_embedded(),
            id: classification.id,
        },
        format,
    )
}

// =============================================================================
// ladder
// =============================================================================

#[derive(Serialize)]
struct LadderReport {
    qualities: Vec<String>,
    selected: Option<String>,
    preferred_honored: bool,
}

impl fmt::Display for LadderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Quality ladder:")?;
        for label in &self.qualities {
            let marker = if self.selected.as_ref() == Some(label) { "*" } else { " " };
            writeln!(f, "  {marker} {label}")?;
        }
        if !self.preferred_honored {
            writeln!(f, "  (preferred label not offered, using highest)")?;
        }
        Ok(())
    }
}

/// Normalize labels and pick the default selection
pub fn ladder(labels: Vec<String>, prefer: Option<String>, format: OutputFormat) -> anyhow::Result<()> {
    let qualities = normalize_qualities(labels);

    let wanted = prefer.clone();
    let options = PlayerOptions::default().with_prefer_quality(move |_| wanted.clone());
    let preferred = options.preferred_quality(&qualities);
    let preferred_honored = prefer.is_none() || preferred.is_some();
    let selected = preferred.or_else(|| qualities.first().cloned());

    emit(
        &LadderReport {
            qualities,
            selected,
            preferred_honored,
        },
        format,
    )
}

// =============================================================================
// scripts
// =============================================================================

fn load_config(args: &ScriptArgs) -> anyhow::Result<PlayerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            PlayerConfig::from_json(&json)?
        }
        None => PlayerConfig::default(),
    };
    if let Some(version) = &args.hls_version {
        config.hls_version = version.clone();
    }
    if let Some(version) = &args.dash_version {
        config.dash_version = version.clone();
    }
    if let Some(cdn) = &args.cdn {
        config.cdn_base = cdn.clone();
    }
    config.validate()?;
    debug!(?config, "Player config resolved");
    Ok(config)
}

#[derive(Serialize)]
struct ScriptRow {
    name: &'static str,
    global: &'static str,
    url: String,
}

#[derive(Serialize)]
struct ScriptsReport {
    scripts: Vec<ScriptRow>,
}

impl fmt::Display for ScriptsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SDK scripts:")?;
        for row in &self.scripts {
            writeln!(f, "  {:<8} {:<7} {}", row.name, row.global, row.url)?;
        }
        Ok(())
    }
}

/// Resolve every SDK script URL
pub fn scripts(args: &ScriptArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let scripts = SdkScript::all(&config)
        .iter()
        .map(|script| {
            Ok(ScriptRow {
                name: script.name(),
                global: script.global(),
                url: script.url(&config.cdn_base)?.to_string(),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    emit(&ScriptsReport { scripts }, format)
}

// =============================================================================
// fetch
// =============================================================================

#[derive(Serialize)]
struct FetchRow {
    name: &'static str,
    url: String,
    ok: bool,
    status: Option<u16>,
    bytes: Option<usize>,
    elapsed_ms: Option<u64>,
    /// Network fetches behind two concurrent loads
    fetches: usize,
    error: Option<String>,
}

#[derive(Serialize)]
struct FetchReport {
    reachable: usize,
    total: usize,
    scripts: Vec<FetchRow>,
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fetch: {}/{} scripts reachable", self.reachable, self.total)?;
        for row in &self.scripts {
            if row.ok {
                writeln!(
                    f,
                    "  ✓ {:<8} HTTP {} {} bytes in {}ms ({} fetch)",
                    row.name,
                    row.status.unwrap_or_default(),
                    row.bytes.unwrap_or_default(),
                    row.elapsed_ms.unwrap_or_default(),
                    row.fetches,
                )?;
            } else {
                writeln!(
                    f,
                    "  ✗ {:<8} {}",
                    row.name,
                    row.error.as_deref().unwrap_or("unknown failure")
                )?;
            }
        }
        Ok(())
    }
}

async fn fetch_one(
    script: &SdkScript,
    config: &PlayerConfig,
    timeout: Duration,
) -> anyhow::Result<FetchRow> {
    let url = script.url(&config.cdn_base)?;
    // One host per script, so a global mentioned by another bundle cannot satisfy it
    let host = Arc::new(HttpScriptHost::new(timeout)?);
    let loader = ScriptLoader::new(host.clone() as Arc<dyn ScriptHost<FetchedScript>>);
    // The global wait must outlast the HTTP request itself
    let player = PlayerConfig {
        script_timeout_ms: config
            .script_timeout_ms
            .max(timeout.as_millis() as u64),
        ..config.clone()
    };

    let (first, second) = tokio::join!(
        loader.load_script(script, &player),
        loader.load_script(script, &player)
    );
    let fetches = host.fetched().len();

    let row = match first.and(second) {
        Ok(fetched) => FetchRow {
            name: script.name(),
            url: url.to_string(),
            ok: true,
            status: Some(fetched.status),
            bytes: Some(fetched.bytes),
            elapsed_ms: Some(fetched.elapsed.as_millis() as u64),
            fetches,
            error: None,
        },
        Err(e) => FetchRow {
            name: script.name(),
            url: url.to_string(),
            ok: false,
            status: None,
            bytes: None,
            elapsed_ms: None,
            fetches,
            error: Some(e.to_string()),
        },
    };
    Ok(row)
}

/// Fetch each SDK script through the memoizing loader
pub async fn fetch(args: &ScriptArgs, timeout_secs: u64, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let timeout = Duration::from_secs(timeout_secs.max(1));

    let mut rows = Vec::new();
    for script in SdkScript::all(&config) {
        rows.push(fetch_one(&script, &config, timeout).await?);
    }

    let report = FetchReport {
        reachable: rows.iter().filter(|row| row.ok).count(),
        total: rows.len(),
        scripts: rows,
    };
    emit(&report, format)?;

    if report.reachable < report.total {
        anyhow::bail!("{} SDK script(s) unreachable", report.total - report.reachable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_applies_overrides() {
        let args = ScriptArgs {
            config: None,
            hls_version: Some("1.5.7".into()),
            dash_version: None,
            cdn: Some("https://unpkg.com/".into()),
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.hls_version, "1.5.7");
        assert_eq!(config.dash_version, "latest");
        assert_eq!(config.cdn_base, "https://unpkg.com/");
    }

    #[test]
    fn test_load_config_rejects_bad_cdn() {
        let args = ScriptArgs {
            config: None,
            hls_version: None,
            dash_version: None,
            cdn: Some("not a url".into()),
        };
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_ladder_report_marks_selection() {
        let report = LadderReport {
            qualities: vec!["1080p".into(), "720p".into()],
            selected: Some("720p".into()),
            preferred_honored: true,
        };
        let text = report.to_string();
        assert!(text.contains("* 720p"));
        assert!(text.contains("  1080p"));
    }
}
