//! Developer tool execution module
//!
//! Backs the cache-clear, log-tail, app-list and app-scaffold tools. The
//! router only sees [`CommandExecutor`]; the simulated backend returns canned
//! data, the live backend drives the platform's `occ` console.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::api::now_iso;
use crate::config::{ExecutorConfig, ExecutorMode};
use crate::error::CommandError;

// ============ Command Data ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub name: String,
    pub enabled: bool,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableApp {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppList {
    pub installed_apps: Vec<InstalledApp>,
    pub available_apps: Vec<AvailableApp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Validated scaffold input
#[derive(Debug, Clone)]
pub struct ScaffoldSpec {
    pub name: String,
    pub author: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStructure {
    pub name: String,
    pub author: String,
    pub description: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub message: String,
}

pub const DEFAULT_AUTHOR: &str = "Default Author";
pub const DEFAULT_DESCRIPTION: &str = "A Nextcloud app";

const SCAFFOLD_FILES: [&str; 6] = [
    "appinfo/info.xml",
    "appinfo/routes.php",
    "lib/Controller/PageController.php",
    "templates/index.php",
    "css/style.css",
    "js/script.js",
];

/// Skeleton file list for a new app. Nothing is written to disk.
pub fn scaffold_structure(spec: &ScaffoldSpec) -> AppStructure {
    let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(String::from);

    AppStructure {
        name: spec.name.clone(),
        author: non_empty(&spec.author).unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
        description: non_empty(&spec.description)
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        files: SCAFFOLD_FILES
            .iter()
            .map(|file| format!("{}/{}", spec.name, file))
            .collect(),
    }
}

// ============ Completion Handle ============

/// Completion signal for a command running on its own task.
///
/// The task keeps running if the handle is dropped.
pub struct CommandHandle {
    rx: oneshot::Receiver<Result<CommandOutcome, CommandError>>,
}

impl CommandHandle {
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<CommandOutcome, CommandError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            if tx.send(work.await).is_err() {
                debug!("Command finished after its caller went away");
            }
        });
        Self { rx }
    }

    pub async fn wait(self) -> Result<CommandOutcome, CommandError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(CommandError::Abandoned),
        }
    }
}

// ============ Executor Trait ============

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Start clearing platform caches.
    fn clear_cache(&self) -> CommandHandle;

    async fn list_apps(&self) -> Result<AppList, CommandError>;

    /// Most recent `lines` platform log entries, oldest first.
    async fn tail_log(&self, lines: usize) -> Result<Vec<LogEntry>, CommandError>;

    async fn scaffold_app(&self, spec: &ScaffoldSpec) -> Result<AppStructure, CommandError> {
        Ok(scaffold_structure(spec))
    }
}

pub fn build_executor(config: &ExecutorConfig) -> Arc<dyn CommandExecutor> {
    match config.mode {
        ExecutorMode::Simulated => Arc::new(SimulatedExecutor::new(Duration::from_millis(
            config.cache_clear_delay_ms,
        ))),
        ExecutorMode::Live => Arc::new(LiveExecutor::new(config)),
    }
}

// ============ Simulated Backend ============

/// Canned responses; never touches the platform.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    cache_clear_delay: Duration,
}

const MOCK_LOGS: [(&str, &str); 5] = [
    ("INFO", "Login successful for user admin"),
    ("WARNING", "Potentially insecure reverse proxy configuration"),
    ("INFO", "Cache cleared via OCC command"),
    ("INFO", "App calendar enabled"),
    ("INFO", "Cron job started"),
];

impl SimulatedExecutor {
    pub fn new(cache_clear_delay: Duration) -> Self {
        Self { cache_clear_delay }
    }
}

#[async_trait]
impl CommandExecutor for SimulatedExecutor {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn clear_cache(&self) -> CommandHandle {
        let delay = self.cache_clear_delay;
        CommandHandle::spawn(async move {
            tokio::time::sleep(delay).await;
            Ok(CommandOutcome {
                message: "Cache cleared successfully".to_string(),
            })
        })
    }

    async fn list_apps(&self) -> Result<AppList, CommandError> {
        let installed = |name: &str, version: &str| InstalledApp {
            name: name.to_string(),
            enabled: true,
            version: version.to_string(),
        };
        let available = |name: &str| AvailableApp {
            name: name.to_string(),
            category: "organization".to_string(),
        };

        Ok(AppList {
            installed_apps: vec![
                installed("files", "1.16.0"),
                installed("activity", "2.15.0"),
                installed("gallery", "1.5.0"),
            ],
            available_apps: vec![available("calendar"), available("contacts"), available("tasks")],
        })
    }

    async fn tail_log(&self, lines: usize) -> Result<Vec<LogEntry>, CommandError> {
        Ok(MOCK_LOGS
            .iter()
            .take(lines)
            .map(|(level, message)| LogEntry {
                level: level.to_string(),
                message: message.to_string(),
                timestamp: now_iso(),
            })
            .collect())
    }
}

// ============ Live Backend ============

/// Drives a local Nextcloud install through `php occ` and its log file.
#[derive(Debug, Clone)]
pub struct LiveExecutor {
    php_binary: String,
    occ_path: PathBuf,
    cache_clear_args: Vec<String>,
    log_file: PathBuf,
}

impl LiveExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            php_binary: config.php_binary.clone(),
            occ_path: config.occ_path.clone(),
            cache_clear_args: config.cache_clear_args.clone(),
            log_file: config.log_file.clone(),
        }
    }
}

async fn run_occ(php: &str, occ: &Path, args: &[String]) -> Result<String, CommandError> {
    info!("Running occ {}", args.join(" "));

    let output = tokio::process::Command::new(php)
        .arg(occ)
        .args(args)
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: php.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(CommandError::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl CommandExecutor for LiveExecutor {
    fn name(&self) -> &'static str {
        "live"
    }

    fn clear_cache(&self) -> CommandHandle {
        let php = self.php_binary.clone();
        let occ = self.occ_path.clone();
        let args = self.cache_clear_args.clone();

        CommandHandle::spawn(async move {
            let stdout = run_occ(&php, &occ, &args).await?;
            debug!("occ output: {}", stdout.trim());
            Ok(CommandOutcome {
                message: "Cache cleared successfully".to_string(),
            })
        })
    }

    async fn list_apps(&self) -> Result<AppList, CommandError> {
        let args = ["app:list".to_string(), "--output=json".to_string()];
        let stdout = run_occ(&self.php_binary, &self.occ_path, &args).await?;
        parse_app_list(&stdout)
    }

    async fn tail_log(&self, lines: usize) -> Result<Vec<LogEntry>, CommandError> {
        let content = read_tail(&self.log_file, lines, TAIL_CHUNK_BYTES).await?;
        Ok(parse_log_lines(&content, lines))
    }
}

const TAIL_CHUNK_BYTES: u64 = 64 * 1024;

/// Read backwards from the end of `path` in `chunk`-sized steps until at least
/// `lines` complete lines are buffered or the start of the file is reached.
async fn read_tail(path: &Path, lines: usize, chunk: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut start = file.metadata().await?.len();
    let mut buf: Vec<u8> = Vec::new();
    let mut newlines = 0;

    // One extra newline for the partial first line, one for a trailing newline
    while start > 0 && newlines <= lines + 1 {
        let step = chunk.min(start);
        start -= step;

        let mut block = vec![0u8; step as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut block).await?;

        newlines += block.iter().filter(|&&b| b == b'\n').count();
        block.extend_from_slice(&buf);
        buf = block;
    }

    if start > 0 {
        let first_line_end = buf.iter().position(|&b| b == b'\n').map_or(buf.len(), |i| i + 1);
        buf.drain(..first_line_end);
    }

    Ok(buf)
}

#[derive(Debug, Deserialize)]
struct OccAppList {
    #[serde(default)]
    enabled: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    disabled: serde_json::Map<String, serde_json::Value>,
}

/// Parse `occ app:list --output=json`, keeping the order occ reports apps in.
/// The app store is not consulted, so `available_apps` stays empty.
pub fn parse_app_list(stdout: &str) -> Result<AppList, CommandError> {
    let list: OccAppList =
        serde_json::from_str(stdout).map_err(|e| CommandError::Parse(e.to_string()))?;

    let version = |v: &serde_json::Value| v.as_str().unwrap_or_default().to_string();

    let installed_apps = list
        .enabled
        .iter()
        .map(|(name, v)| (name, v, true))
        .chain(list.disabled.iter().map(|(name, v)| (name, v, false)))
        .map(|(name, v, enabled)| InstalledApp {
            name: name.clone(),
            enabled,
            version: version(v),
        })
        .collect();

    Ok(AppList {
        installed_apps,
        available_apps: vec![],
    })
}

#[derive(Debug, Deserialize)]
struct PlatformLogLine {
    level: u8,
    #[serde(default)]
    message: String,
    #[serde(default)]
    time: String,
}

fn level_name(level: u8) -> &'static str {
    match level {
        0 => "DEBUG",
        1 => "INFO",
        2 => "WARNING",
        3 => "ERROR",
        _ => "FATAL",
    }
}

/// Last `lines` parseable entries of a JSON-lines platform log. Invalid UTF-8
/// is replaced per line rather than failing the whole read.
pub fn parse_log_lines(content: &[u8], lines: usize) -> Vec<LogEntry> {
    let mut entries: Vec<LogEntry> = content
        .split(|&b| b == b'\n')
        .map(String::from_utf8_lossy)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<PlatformLogLine>(&line) {
            Ok(parsed) => Some(LogEntry {
                level: level_name(parsed.level).to_string(),
                message: parsed.message,
                timestamp: parsed.time,
            }),
            Err(e) => {
                warn!("Skipping unreadable log line: {}", e);
                None
            }
        })
        .collect();

    let skip = entries.len().saturating_sub(lines);
    entries.drain(..skip);
    entries
}
