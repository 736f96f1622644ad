//! 守护进程与轮询循环的配置。

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{NowPlayingError, Result};

/// 默认的应用名称，同时用作进程名匹配和标题标记。
pub const DEFAULT_APP_NAME: &str = "foobar2000";

/// 轮询间隔的下限。不允许无休眠的忙等。
pub const MIN_POLL_INTERVAL_MS: u64 = 50;
/// 轮询间隔的上限。
pub const MAX_POLL_INTERVAL_MS: u64 = 5_000;

/// 守护进程与轮询循环的全部可调参数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// 播放器可执行文件的路径。默认为 `%ProgramFiles%\foobar2000\foobar2000.exe`，
    /// 不做自动发现。
    pub player_executable: PathBuf,

    /// 用于查找已有实例的进程名片段（不区分大小写的子串匹配）。
    pub process_name: String,

    /// 标题栏中的应用标记，同时决定版本横幅的格式。
    pub app_marker: String,

    /// 两次读取窗口标题之间的间隔（毫秒）。
    pub poll_interval_ms: u64,

    /// 请求关闭已有实例的窗口后，强制终止之前的等待时间（毫秒）。
    pub close_grace_ms: u64,

    /// 等待播放器界面就绪的最长时间（毫秒）。
    pub ready_timeout_ms: u64,
}

fn default_player_executable() -> PathBuf {
    let program_files =
        std::env::var_os("ProgramFiles").unwrap_or_else(|| r"C:\Program Files".into());
    PathBuf::from(program_files)
        .join(DEFAULT_APP_NAME)
        .join(format!("{DEFAULT_APP_NAME}.exe"))
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            player_executable: default_player_executable(),
            process_name: DEFAULT_APP_NAME.to_string(),
            app_marker: DEFAULT_APP_NAME.to_string(),
            poll_interval_ms: 300,
            close_grace_ms: 2_000,
            ready_timeout_ms: 10_000,
        }
    }
}

impl SupervisorConfig {
    /// 从 TOML 文本解析配置，缺失的键使用默认值。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("[Config] 正在加载配置文件: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 校验配置值。
    pub fn validate(&self) -> Result<()> {
        if self.process_name.trim().is_empty() {
            return Err(NowPlayingError::Config("进程名不能为空".to_string()));
        }
        if self.app_marker.trim().is_empty() {
            return Err(NowPlayingError::Config("应用标记不能为空".to_string()));
        }
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(NowPlayingError::Config(format!(
                "轮询间隔必须在 {MIN_POLL_INTERVAL_MS} 到 {MAX_POLL_INTERVAL_MS} 毫秒之间，当前为 {}",
                self.poll_interval_ms
            )));
        }
        Ok(())
    }

    /// 轮询间隔。
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 关闭已有实例时的宽限期。
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// 等待界面就绪的超时。
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}
