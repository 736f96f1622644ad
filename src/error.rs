use std::path::PathBuf;

use thiserror::Error;

/// 启动播放器进程时可能出现的错误。
///
/// 这是唯一会直接暴露给使用者的错误类型：播放器起不来，就没有任何数据来源，
/// 因此不会重试。
#[derive(Debug, Error)]
pub enum LaunchError {
    /// 配置的可执行文件路径不存在。
    #[error("找不到播放器可执行文件: {}", .0.display())]
    NotFound(PathBuf),

    /// 可执行文件存在，但创建进程失败。
    #[error("无法启动播放器 {}: {source}", path.display())]
    Spawn {
        /// 尝试启动的路径。
        path: PathBuf,
        /// 底层的 I/O 错误。
        #[source]
        source: std::io::Error,
    },
}

/// 定义库的统一错误枚举。
#[derive(Debug, Error)]
pub enum NowPlayingError {
    /// 播放器进程启动失败。
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// 配置无效或无法读取。
    #[error("配置无效: {0}")]
    Config(String),

    /// 无法读取配置文件。
    #[error("无法读取配置文件: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// 配置文件不是合法的 TOML。
    #[error("配置文件解析失败: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// 无法启动后台轮询线程。
    #[error("无法启动后台工作线程: {0}")]
    WorkerThread(String),
}

/// 本库统一的 `Result` 类型别名。
pub type Result<T> = std::result::Result<T, NowPlayingError>;
