#![warn(missing_docs)]

//! 一个用于启动并守护 foobar2000 进程、从其窗口标题中提取当前播放曲目信息的 Rust 库。
//!
//! foobar2000 在播放时会把主窗口标题设置为 `"<标题> | <艺术家> | <专辑>"`。
//! 本库定时读取这个标题，将其解析为结构化的元数据，并在值发生变化时
//! 以字段为粒度通知展示层。
//!
//! ## 核心功能
//!
//! * **单实例守护**: 启动前关闭所有已在运行的播放器实例，然后从固定路径启动一个新实例。
//! * **标题解析**: 纯函数 [`TitleParser::parse`] 将原始标题分为空闲、播放中和无法识别三类。
//! * **后台轮询**: 一个专用的后台线程按固定间隔采样标题，两次采样之间一定会休眠。
//! * **字段级通知**: [`MetadataStore`] 只为值真正变化的字段发送通知，通知本身不携带新值。
//! * **随子进程退出**: 播放器因任何原因退出时，整个宿主随之退出，不做重启。
//!
//! ## 使用方法
//!
//! 与本库交互的入口是 [`NowPlayingManager::start()`] 函数。
//!
//! 1.  准备一个 [`SupervisorConfig`]，可以直接使用默认值，或者通过
//!     [`SupervisorConfig::load`] 从 TOML 文件读取。
//! 2.  调用 `NowPlayingManager::start(config, host)`，其中 `host` 是 [`PlayerHost`] 的实现，
//!     在 Windows 上即 [`platform::win32::Win32Host`]。
//! 3.  通过返回的 [`NowPlayingController`] 订阅变化通知，并用 `current()` 读取最新值。
//! 4.  播放器退出时宿主会被终止；如需提前停止轮询，调用 [`NowPlayingController::shutdown()`]。
//!     停止后退出回调被解除，播放器之后再退出也不会终止宿主。
//!
//! ## 示例
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use foobar_nowplaying::{NowPlayingManager, SupervisorConfig, platform::win32::Win32Host};
//!
//! let controller = NowPlayingManager::start(SupervisorConfig::default(), Win32Host)?;
//! let changes = controller.subscribe();
//!
//! while let Ok(field) = changes.recv() {
//!     let current = controller.current();
//!     println!("{} 已变化: {}", field.name(), field.get(&current));
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

mod api;
mod config;
mod error;
pub mod platform;
mod store;
mod supervisor;
mod title_parser;
mod worker;

pub use api::{
    MetadataField, NowPlayingController, PLAYER_ICON_RESOURCE, PlayerState, ShutdownReason,
    TrackMetadata,
};
pub use config::{DEFAULT_APP_NAME, MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS, SupervisorConfig};
pub use error::{LaunchError, NowPlayingError, Result};
pub use platform::{ExitCallback, PlayerHost, PlayerProcess};
pub use store::MetadataStore;
pub use supervisor::{HOST_EXIT_CODE, ProcessSupervisor, ReadyWait};
pub use title_parser::{FIELD_DELIMITER, ParsedTitle, TitleParser, format_title};

use std::sync::Arc;

use worker::PollingWorker;

/// `NowPlayingManager` 是本库的静态入口点。
pub struct NowPlayingManager;

impl NowPlayingManager {
    /// 启动播放器与后台轮询线程，并返回一个控制器。
    ///
    /// 依次执行：校验配置、关闭已有实例、启动新实例、注册退出回调、启动轮询线程。
    /// 就绪等待在轮询线程中进行，不会阻塞调用方。
    ///
    /// # 返回
    /// - `Ok(controller)`: 成功启动后返回 [`NowPlayingController`]。
    /// - `Err(NowPlayingError::Launch)`: 播放器无法启动。这是致命错误，应直接报告给用户。
    /// - `Err(NowPlayingError)`: 配置无效，或者后台线程无法创建。
    pub fn start<H: PlayerHost>(config: SupervisorConfig, host: H) -> Result<NowPlayingController> {
        config.validate()?;

        let supervisor = ProcessSupervisor::new(Arc::new(host), config);
        supervisor.ensure_single_instance();
        let process = supervisor.launch()?;

        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let (exit_tx, exit_rx) = crossbeam_channel::bounded::<()>(1);
        supervisor.register_exit(&process, exit_tx);

        let store = Arc::new(MetadataStore::new());
        let worker = PollingWorker::new(supervisor, process, Arc::clone(&store), cancel_rx, exit_rx);
        let worker_handle = worker::start_polling_thread(worker)?;

        Ok(NowPlayingController {
            store,
            cancel_tx: Some(cancel_tx),
            worker_handle: Some(worker_handle),
        })
    }
}
