//! Doctor command - verify system requirements and configuration.

use crate::cli::Output;
use crate::config::{CacheBackendKind, Settings};
use console::style;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("ytagent Doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let sections = [
        ("External Tools", vec![check_ytdlp()]),
        ("Model Provider", check_provider(settings)),
        ("Cache", vec![check_cache(settings)]),
        ("Configuration", vec![check_config_file()]),
    ];

    let mut errors = 0;
    let mut warnings = 0;

    for (title, checks) in &sections {
        println!("{}", style(title).bold());
        for check in checks {
            check.print();
            match check.status {
                CheckStatus::Error => errors += 1,
                CheckStatus::Warning => warnings += 1,
                CheckStatus::Ok => {}
            }
        }
        println!();
    }

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using ytagent.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! ytagent is ready to use.");
    }

    Ok(())
}

fn check_ytdlp() -> CheckResult {
    let hint = install_hint_ytdlp();

    match Command::new("yt-dlp").arg("--version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();
            CheckResult::ok("yt-dlp", &version)
        }
        Ok(_) => CheckResult::error("yt-dlp", "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::error("yt-dlp", "not found", hint)
        }
        Err(e) => CheckResult::error("yt-dlp", &format!("error: {}", e), hint),
    }
}

/// Check the configured provider, model and API key.
fn check_provider(settings: &Settings) -> Vec<CheckResult> {
    let llm = &settings.llm;
    let mut results = vec![CheckResult::ok(
        "Provider",
        &format!("{} ({} @ {})", llm.provider, llm.model_name(), llm.base_url()),
    )];

    let Some(var) = llm.key_env() else {
        results.push(CheckResult::ok("API key", "not required"));
        return results;
    };

    let check = match std::env::var(&var) {
        Ok(key) if key.trim().is_empty() => CheckResult::error(&var, "empty", &key_hint(&var)),
        Ok(key) => CheckResult::ok(&var, &format!("configured ({})", mask_key(&key))),
        Err(_) => CheckResult::error(&var, "not set", &key_hint(&var)),
    };
    results.push(check);
    results
}

fn check_cache(settings: &Settings) -> CheckResult {
    let cache = &settings.cache;
    if !cache.enabled {
        return CheckResult::warning(
            "Tool cache",
            "disabled",
            "Every query will hit YouTube again; set cache.enabled = true",
        );
    }

    match cache.backend {
        CacheBackendKind::Memory => CheckResult::ok(
            "Tool cache",
            &format!("memory, up to {} entries", cache.max_entries),
        ),
        CacheBackendKind::Sqlite => {
            let path = settings.cache_path();
            if path.exists() {
                CheckResult::ok("Tool cache", &format!("sqlite at {}", path.display()))
            } else {
                CheckResult::warning(
                    "Tool cache",
                    &format!("sqlite at {} (not created yet)", path.display()),
                    "The database is created on first use",
                )
            }
        }
    }
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: ytagent config edit",
        )
    }
}

fn key_hint(var: &str) -> String {
    format!("Set with: export {}='your_key_here'", var)
}

/// Show only the ends of a key.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Platform-specific install hint for yt-dlp.
fn install_hint_ytdlp() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install yt-dlp"
    } else if cfg!(target_os = "linux") {
        "Install with: pip install yt-dlp (or your package manager)"
    } else {
        "Install from: https://github.com/yt-dlp/yt-dlp"
    }
}
