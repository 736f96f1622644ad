//! 基于 Win32 API 的宿主实现。

use std::{
    ffi::{OsString, c_void},
    os::windows::ffi::OsStringExt,
    path::Path,
    process::Command,
    thread,
    time::Duration,
};

use windows::{
    Win32::{
        Foundation::{
            CloseHandle, ERROR_NO_MORE_FILES, HANDLE, HWND, LPARAM, WAIT_OBJECT_0, WPARAM,
        },
        System::{
            Diagnostics::ToolHelp::{
                CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
                TH32CS_SNAPPROCESS,
            },
            Threading::{
                INFINITE, OpenProcess, PROCESS_ACCESS_RIGHTS, PROCESS_QUERY_INFORMATION,
                PROCESS_SYNCHRONIZE, PROCESS_TERMINATE, TerminateProcess, WaitForSingleObject,
            },
        },
        UI::WindowsAndMessaging::{
            EnumWindows, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
            IsWindowVisible, PostMessageW, WM_CLOSE, WaitForInputIdle,
        },
    },
    core::BOOL,
};

use super::{ExitCallback, PlayerHost, PlayerProcess, process_name_matches};
use crate::error::LaunchError;

const PLAYER_ACCESS: PROCESS_ACCESS_RIGHTS = PROCESS_ACCESS_RIGHTS(
    PROCESS_QUERY_INFORMATION.0 | PROCESS_TERMINATE.0 | PROCESS_SYNCHRONIZE.0,
);

/// RAII Guard，确保句柄在离开作用域时被关闭。
struct OwnedHandle(HANDLE);

// 进程句柄只是内核对象的引用，可以在线程之间传递和共享。
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe { CloseHandle(self.0).ok() };
        }
    }
}

fn open_process(pid: u32, access: PROCESS_ACCESS_RIGHTS) -> windows::core::Result<OwnedHandle> {
    let handle = unsafe { OpenProcess(access, false, pid) }?;
    Ok(OwnedHandle(handle))
}

/// 通过 `OpenProcess` 打开的播放器进程。
pub struct Win32Process {
    pid: u32,
    handle: OwnedHandle,
}

impl Win32Process {
    fn open(pid: u32) -> windows::core::Result<Self> {
        Ok(Self {
            pid,
            handle: open_process(pid, PLAYER_ACCESS)?,
        })
    }

    /// 查找属于该进程的主窗口：第一个可见、且标题非空的顶层窗口；
    /// 没有带标题的窗口时退而求其次，取第一个可见窗口。
    fn main_window(&self) -> Option<HWND> {
        struct Search {
            pid: u32,
            titled: Option<isize>,
            fallback: Option<isize>,
        }

        unsafe extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
            let search = unsafe { &mut *(lparam.0 as *mut Search) };

            let mut owner_pid = 0u32;
            unsafe { GetWindowThreadProcessId(hwnd, Some(&mut owner_pid)) };
            if owner_pid != search.pid || !unsafe { IsWindowVisible(hwnd) }.as_bool() {
                return BOOL::from(true);
            }

            if unsafe { GetWindowTextLengthW(hwnd) } > 0 {
                search.titled = Some(hwnd.0 as isize);
                return BOOL::from(false);
            }
            search.fallback.get_or_insert(hwnd.0 as isize);
            BOOL::from(true)
        }

        let mut search = Search {
            pid: self.pid,
            titled: None,
            fallback: None,
        };
        // 回调提前停止枚举时 EnumWindows 会返回错误，这里不关心返回值
        let _ = unsafe {
            EnumWindows(
                Some(enum_window_callback),
                LPARAM(&mut search as *mut Search as isize),
            )
        };

        search
            .titled
            .or(search.fallback)
            .map(|raw| HWND(raw as *mut c_void))
    }
}

impl PlayerProcess for Win32Process {
    fn id(&self) -> u32 {
        self.pid
    }

    fn close_main_window(&self) -> bool {
        let Some(hwnd) = self.main_window() else {
            log::debug!("[Win32Host] 进程 {} 没有可见的主窗口。", self.pid);
            return false;
        };
        match unsafe { PostMessageW(Some(hwnd), WM_CLOSE, WPARAM(0), LPARAM(0)) } {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[Win32Host] 向进程 {} 的主窗口发送 WM_CLOSE 失败: {e:?}", self.pid);
                false
            }
        }
    }

    fn force_terminate(&self) -> std::io::Result<()> {
        unsafe { TerminateProcess(self.handle.0, 1) }
            .map_err(|e| std::io::Error::other(e.to_string()))
    }

    fn has_exited(&self) -> bool {
        self.wait_for_exit(Duration::ZERO)
    }

    fn wait_for_exit(&self, timeout: Duration) -> bool {
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(INFINITE - 1);
        unsafe { WaitForSingleObject(self.handle.0, millis) } == WAIT_OBJECT_0
    }

    fn wait_until_ui_ready(&self, timeout: Duration) -> bool {
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(INFINITE - 1);
        // WaitForInputIdle 成功时返回 0，超时返回 WAIT_TIMEOUT，失败返回 WAIT_FAILED
        let result = unsafe { WaitForInputIdle(self.handle.0, millis) };
        if result != 0 {
            log::warn!("[Win32Host] WaitForInputIdle 未成功 (返回值 {result:#x})。");
        }
        result == 0
    }

    fn window_title(&self) -> String {
        let Some(hwnd) = self.main_window() else {
            return String::new();
        };
        let len = unsafe { GetWindowTextLengthW(hwnd) };
        if len <= 0 {
            return String::new();
        }
        let mut buffer = vec![0u16; len as usize + 1];
        let copied = unsafe { GetWindowTextW(hwnd, &mut buffer) };
        if copied <= 0 {
            return String::new();
        }
        String::from_utf16_lossy(&buffer[..copied as usize])
    }

    fn on_exit(&self, callback: ExitCallback) {
        let pid = self.pid;
        let waiter = open_process(pid, PROCESS_SYNCHRONIZE);
        let spawn_result = thread::Builder::new()
            .name("player_exit_watcher".to_string())
            .spawn(move || {
                match waiter {
                    Ok(handle) => {
                        unsafe { WaitForSingleObject(handle.0, INFINITE) };
                        log::debug!("[Win32Host] 进程 {pid} 已退出。");
                    }
                    Err(e) => {
                        // 句柄打不开通常意味着进程已经不在了
                        log::warn!("[Win32Host] 无法打开进程 {pid} 用于等待退出: {e:?}");
                    }
                }
                callback();
            });
        if let Err(e) = spawn_result {
            log::error!("[Win32Host] 无法启动退出监视线程: {e}");
        }
    }
}

/// 真实的 Windows 宿主。
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Host;

impl Win32Host {
    /// 使用 Tool Help 快照遍历系统中的所有进程，返回进程名匹配的 PID。
    fn matching_pids(needle: &str) -> Vec<u32> {
        let snapshot_handle = match unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) } {
            Ok(handle) if !handle.is_invalid() => handle,
            Ok(_) => {
                log::error!(
                    "[Win32Host] CreateToolhelp32Snapshot 返回了无效的句柄: {:?}",
                    std::io::Error::last_os_error()
                );
                return Vec::new();
            }
            Err(e) => {
                log::error!("[Win32Host] CreateToolhelp32Snapshot 调用失败: {e:?}");
                return Vec::new();
            }
        };
        let _guard = OwnedHandle(snapshot_handle);

        let mut process_entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        if unsafe { Process32FirstW(snapshot_handle, &mut process_entry) }.is_err() {
            log::trace!("[Win32Host] Process32FirstW: 快照为空。");
            return Vec::new();
        }

        let own_pid = std::process::id();
        let mut pids = Vec::new();
        loop {
            let exe_name_wide = &process_entry.szExeFile;
            let len = exe_name_wide.iter().take_while(|&&c| c != 0).count();
            let exe_name = OsString::from_wide(&exe_name_wide[..len]);

            if process_entry.th32ProcessID != own_pid
                && process_name_matches(&exe_name.to_string_lossy(), needle)
            {
                pids.push(process_entry.th32ProcessID);
            }

            if unsafe { Process32NextW(snapshot_handle, &mut process_entry) }.is_err() {
                let err = windows::core::Error::from_win32();
                if err.code() != ERROR_NO_MORE_FILES.to_hresult() {
                    log::error!("[Win32Host] Process32NextW 失败: {err:?}");
                }
                break;
            }
        }
        pids
    }
}

impl PlayerHost for Win32Host {
    type Process = Win32Process;

    fn find_processes_by_name(&self, needle: &str) -> Vec<Win32Process> {
        Self::matching_pids(needle)
            .into_iter()
            .filter_map(|pid| match Win32Process::open(pid) {
                Ok(process) => Some(process),
                Err(e) => {
                    log::warn!("[Win32Host] 无法打开进程 {pid}: {e:?}");
                    None
                }
            })
            .collect()
    }

    fn spawn(&self, executable: &Path) -> Result<Win32Process, LaunchError> {
        if !executable.is_file() {
            return Err(LaunchError::NotFound(executable.to_path_buf()));
        }

        let mut command = Command::new(executable);
        if let Some(dir) = executable.parent() {
            command.current_dir(dir);
        }
        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            path: executable.to_path_buf(),
            source,
        })?;

        Win32Process::open(child.id()).map_err(|e| LaunchError::Spawn {
            path: executable.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })
    }

    fn terminate_host(&self, exit_code: i32) {
        log::info!("[Win32Host] 正在以退出码 {exit_code} 终止宿主进程。");
        std::process::exit(exit_code);
    }
}
