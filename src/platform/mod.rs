//! 与宿主操作系统之间的窄接口。
//!
//! 守护逻辑只通过这里的两个 trait 接触进程表和窗口管理器，
//! 测试可以用脚本化的假实现替代真实的播放器进程。

use std::{path::Path, time::Duration};

use crate::error::LaunchError;

#[cfg(windows)]
pub mod win32;

/// 进程退出时调用的回调。
pub type ExitCallback = Box<dyn FnOnce() + Send + 'static>;

/// 一个外部播放器进程的句柄。
///
/// 生命周期操作（关闭、终止）只会在一个线程上进行；
/// `window_title` 可能与退出检测并发调用，因此要求 `Sync`。
pub trait PlayerProcess: Send + Sync + 'static {
    /// 进程 ID。
    fn id(&self) -> u32;

    /// 请求主窗口正常关闭。找不到主窗口时返回 `false`。
    fn close_main_window(&self) -> bool;

    /// 强制终止进程。
    fn force_terminate(&self) -> std::io::Result<()>;

    /// 进程是否已经退出，或者句柄已经失效。
    fn has_exited(&self) -> bool;

    /// 最多等待 `timeout`，进程在此期间退出则返回 `true`。
    fn wait_for_exit(&self, timeout: Duration) -> bool;

    /// 阻塞直到进程界面可以响应输入，最多等待 `timeout`。
    /// 超时返回 `false`，调用方可以选择继续。
    fn wait_until_ui_ready(&self, timeout: Duration) -> bool;

    /// 读取主窗口当前的标题。无法读取时返回空字符串。
    fn window_title(&self) -> String;

    /// 注册退出回调。回调在进程终止后恰好调用一次，且不在调用者的线程上执行。
    fn on_exit(&self, callback: ExitCallback);
}

/// 宿主环境：进程表、进程创建，以及终止宿主自身。
pub trait PlayerHost: Send + Sync + 'static {
    /// 该宿主产生的进程句柄类型。
    type Process: PlayerProcess;

    /// 枚举名称中包含 `needle`（不区分大小写）的进程。
    fn find_processes_by_name(&self, needle: &str) -> Vec<Self::Process>;

    /// 启动可执行文件。路径不存在或创建进程失败时返回 [`LaunchError`]。
    fn spawn(&self, executable: &Path) -> Result<Self::Process, LaunchError>;

    /// 终止整个宿主应用。
    fn terminate_host(&self, exit_code: i32);
}

/// 不区分大小写的子串匹配，供各平台实现按进程名查找时使用。
pub fn process_name_matches(process_name: &str, needle: &str) -> bool {
    !needle.is_empty()
        && process_name
            .to_lowercase()
            .contains(&needle.to_lowercase())
}
