use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::{
    config::SupervisorConfig,
    error::LaunchError,
    platform::{PlayerHost, PlayerProcess},
};

/// 宿主在播放器退出后使用的退出码。
pub const HOST_EXIT_CODE: i32 = 0;

/// 就绪等待的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyWait {
    /// 播放器界面已就绪。
    Ready,
    /// 超过配置的等待时间，轮询仍会开始。
    TimedOut,
    /// 等待期间收到了取消信号。
    Cancelled,
    /// 播放器在就绪之前已经退出。
    ProcessExited,
}

/// `ProcessSupervisor` 负责外部播放器进程的整个生命周期。
///
/// 1.  **单实例**: 启动前关闭所有已存在的播放器实例。
/// 2.  **启动**: 从配置的固定路径启动一个新实例。启动失败是致命错误，不会重试。
/// 3.  **就绪等待**: 在开始轮询前等待播放器界面初始化完成。
/// 4.  **随子进程退出**: 播放器因任何原因退出时终止整个宿主，且只终止一次。
///     使用者主动停止后退出回调被解除，之后播放器退出不再影响宿主。
pub struct ProcessSupervisor<H: PlayerHost> {
    host: Arc<H>,
    config: SupervisorConfig,
    /// 宿主终止是否已经被触发。退出回调与轮询线程共用这一个标志。
    host_terminated: Arc<AtomicBool>,
    /// 置位后退出回调只通知轮询线程，不再终止宿主。
    disarmed: Arc<AtomicBool>,
}

impl<H: PlayerHost> ProcessSupervisor<H> {
    /// 创建一个守护者。
    pub fn new(host: Arc<H>, config: SupervisorConfig) -> Self {
        Self {
            host,
            config,
            host_terminated: Arc::new(AtomicBool::new(false)),
            disarmed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 守护者使用的配置。
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// 关闭所有名称匹配的已有实例。没有实例时什么也不做。
    ///
    /// 对每个实例先请求关闭主窗口，宽限期内未退出则强制终止。返回处理过的实例数。
    pub fn ensure_single_instance(&self) -> usize {
        let existing = self.host.find_processes_by_name(&self.config.process_name);
        if existing.is_empty() {
            log::debug!("[Supervisor] 没有发现已在运行的播放器实例。");
            return 0;
        }

        log::info!(
            "[Supervisor] 发现 {} 个已在运行的播放器实例，正在关闭...",
            existing.len()
        );
        for process in &existing {
            let pid = process.id();
            if process.close_main_window() && process.wait_for_exit(self.config.close_grace()) {
                log::debug!("[Supervisor] 实例 {pid} 已正常关闭。");
                continue;
            }

            log::warn!("[Supervisor] 实例 {pid} 未在宽限期内退出，正在强制终止...");
            if let Err(e) = process.force_terminate() {
                log::error!("[Supervisor] 强制终止实例 {pid} 失败: {e}");
            }
        }
        existing.len()
    }

    /// 启动新的播放器实例。
    pub fn launch(&self) -> Result<H::Process, LaunchError> {
        let path = &self.config.player_executable;
        log::info!("[Supervisor] 正在启动播放器: {}", path.display());
        let process = self.host.spawn(path).inspect_err(|e| {
            log::error!("[Supervisor] 播放器启动失败: {e}");
        })?;
        log::info!("[Supervisor] 播放器已启动，PID: {}", process.id());
        Ok(process)
    }

    /// 阻塞直到播放器界面就绪、超时或收到取消信号。
    ///
    /// 等待按轮询间隔分片进行，每片之间检查一次 `cancel_rx`，因此取消不必等到超时。
    /// 超时只记录警告，轮询照常开始。
    pub fn await_input_ready(&self, process: &H::Process, cancel_rx: &Receiver<()>) -> ReadyWait {
        log::debug!("[Supervisor] 正在等待播放器界面就绪...");
        let timeout = self.config.ready_timeout();
        let max_slice = self.config.poll_interval();
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                log::warn!("[Supervisor] 等待播放器界面就绪超时 (>{timeout:?})，仍将开始轮询。");
                return ReadyWait::TimedOut;
            }

            let slice = remaining.min(max_slice);
            let started = Instant::now();
            if process.wait_until_ui_ready(slice) {
                log::debug!("[Supervisor] 播放器界面已就绪。");
                return ReadyWait::Ready;
            }
            if process.has_exited() {
                log::info!("[Supervisor] 播放器在界面就绪前已退出。");
                return ReadyWait::ProcessExited;
            }

            // 等待调用可能提前失败返回，剩余的分片时间用来等取消信号
            match cancel_rx.recv_timeout(slice.saturating_sub(started.elapsed())) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("[Supervisor] 就绪等待期间收到取消信号。");
                    return ReadyWait::Cancelled;
                }
            }
        }
    }

    /// 注册退出回调。
    ///
    /// 回调先通过 `exit_tx` 通知轮询线程停止，再终止宿主。已解除时不终止宿主。
    pub fn register_exit(&self, process: &H::Process, exit_tx: Sender<()>) {
        let host = Arc::clone(&self.host);
        let host_terminated = Arc::clone(&self.host_terminated);
        let disarmed = Arc::clone(&self.disarmed);
        let pid = process.id();
        process.on_exit(Box::new(move || {
            log::info!("[Supervisor] 收到播放器 {pid} 的退出通知。");
            let _ = exit_tx.send(());
            if disarmed.load(Ordering::SeqCst) {
                log::info!("[Supervisor] 守护已解除，宿主保持运行。");
                return;
            }
            terminate_once(host.as_ref(), &host_terminated);
        }));
    }

    /// 解除退出回调对宿主的控制。使用者主动停止轮询后调用。
    pub fn disarm(&self) {
        disarm(&self.disarmed);
    }

    /// 返回解除标志的一个共享引用，供守护者本身已被移走后仍需解除的场合使用。
    pub(crate) fn disarm_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.disarmed)
    }

    /// 轮询线程自行检测到进程丢失时调用。
    pub fn on_process_lost(&self) {
        terminate_once(self.host.as_ref(), &self.host_terminated);
    }

    /// 宿主终止是否已经被触发过。
    pub fn host_terminated(&self) -> bool {
        self.host_terminated.load(Ordering::SeqCst)
    }
}

pub(crate) fn disarm(flag: &AtomicBool) {
    if !flag.swap(true, Ordering::SeqCst) {
        log::debug!("[Supervisor] 已解除退出回调，播放器退出将不再终止宿主。");
    }
}

fn terminate_once<H: PlayerHost>(host: &H, flag: &AtomicBool) {
    if flag.swap(true, Ordering::SeqCst) {
        log::trace!("[Supervisor] 宿主终止已被触发过，忽略重复请求。");
        return;
    }
    log::info!("[Supervisor] 播放器已退出，正在终止宿主。");
    host.terminate_host(HOST_EXIT_CODE);
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    use parking_lot::Mutex;

    use super::*;
    use crate::platform::ExitCallback;

    #[derive(Default)]
    struct StubProcess {
        pid: u32,
        /// 收到 WM_CLOSE 后是否真的退出
        obeys_close: bool,
        /// 界面永远不会就绪，每次等待都耗尽给定的时间
        never_ready: bool,
        exited: AtomicBool,
        close_requests: AtomicUsize,
        kills: AtomicUsize,
        exit_callback: Mutex<Option<ExitCallback>>,
    }

    impl PlayerProcess for Arc<StubProcess> {
        fn id(&self) -> u32 {
            self.pid
        }
        fn close_main_window(&self) -> bool {
            self.close_requests.fetch_add(1, Ordering::SeqCst);
            if self.obeys_close {
                self.exited.store(true, Ordering::SeqCst);
            }
            true
        }
        fn force_terminate(&self) -> std::io::Result<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            self.exited.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn has_exited(&self) -> bool {
            self.exited.load(Ordering::SeqCst)
        }
        fn wait_for_exit(&self, _timeout: Duration) -> bool {
            self.has_exited()
        }
        fn wait_until_ui_ready(&self, timeout: Duration) -> bool {
            if self.never_ready {
                std::thread::sleep(timeout);
                return false;
            }
            true
        }
        fn window_title(&self) -> String {
            String::new()
        }
        fn on_exit(&self, callback: ExitCallback) {
            *self.exit_callback.lock() = Some(callback);
        }
    }

    #[derive(Default)]
    struct StubHost {
        running: Vec<Arc<StubProcess>>,
        missing_executable: bool,
        spawned: Mutex<Vec<PathBuf>>,
        terminations: Mutex<Vec<i32>>,
    }

    impl PlayerHost for StubHost {
        type Process = Arc<StubProcess>;

        fn find_processes_by_name(&self, _needle: &str) -> Vec<Arc<StubProcess>> {
            self.running.clone()
        }
        fn spawn(&self, executable: &Path) -> Result<Arc<StubProcess>, LaunchError> {
            if self.missing_executable {
                return Err(LaunchError::NotFound(executable.to_path_buf()));
            }
            self.spawned.lock().push(executable.to_path_buf());
            Ok(Arc::new(StubProcess {
                pid: 42,
                ..Default::default()
            }))
        }
        fn terminate_host(&self, exit_code: i32) {
            self.terminations.lock().push(exit_code);
        }
    }

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            player_executable: PathBuf::from("player.exe"),
            poll_interval_ms: 50,
            ..Default::default()
        }
    }

    fn supervisor(host: StubHost) -> (Arc<StubHost>, ProcessSupervisor<StubHost>) {
        supervisor_with(host, test_config())
    }

    fn supervisor_with(
        host: StubHost,
        config: SupervisorConfig,
    ) -> (Arc<StubHost>, ProcessSupervisor<StubHost>) {
        let host = Arc::new(host);
        (Arc::clone(&host), ProcessSupervisor::new(host, config))
    }

    fn unresponsive_process() -> Arc<StubProcess> {
        Arc::new(StubProcess {
            pid: 9,
            never_ready: true,
            ..Default::default()
        })
    }

    #[test]
    fn single_instance_is_noop_without_running_players() {
        let (_, supervisor) = supervisor(StubHost::default());
        assert_eq!(supervisor.ensure_single_instance(), 0);
        assert_eq!(supervisor.ensure_single_instance(), 0);
    }

    #[test]
    fn well_behaved_instance_is_closed_gracefully() {
        let process = Arc::new(StubProcess {
            pid: 7,
            obeys_close: true,
            ..Default::default()
        });
        let (_, supervisor) = supervisor(StubHost {
            running: vec![Arc::clone(&process)],
            ..Default::default()
        });

        assert_eq!(supervisor.ensure_single_instance(), 1);
        assert_eq!(process.close_requests.load(Ordering::SeqCst), 1);
        assert_eq!(process.kills.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stubborn_instance_is_force_terminated() {
        let process = Arc::new(StubProcess {
            pid: 8,
            obeys_close: false,
            ..Default::default()
        });
        let (_, supervisor) = supervisor(StubHost {
            running: vec![Arc::clone(&process)],
            ..Default::default()
        });

        supervisor.ensure_single_instance();
        assert_eq!(process.kills.load(Ordering::SeqCst), 1);
        assert!(process.has_exited());
    }

    #[test]
    fn launch_uses_configured_path() {
        let (host, supervisor) = supervisor(StubHost::default());
        let process = supervisor.launch().unwrap();
        assert_eq!(process.id(), 42);
        assert_eq!(*host.spawned.lock(), vec![PathBuf::from("player.exe")]);
    }

    #[test]
    fn launch_failure_is_reported() {
        let (_, supervisor) = supervisor(StubHost {
            missing_executable: true,
            ..Default::default()
        });
        let err = supervisor.launch().err().expect("launch should fail");
        assert!(matches!(err, LaunchError::NotFound(path) if path == Path::new("player.exe")));
    }

    #[test]
    fn host_is_terminated_once_from_either_path() {
        let (host, supervisor) = supervisor(StubHost::default());
        let process = supervisor.launch().unwrap();
        let (exit_tx, exit_rx) = crossbeam_channel::bounded(1);
        supervisor.register_exit(&process, exit_tx);

        supervisor.on_process_lost();
        let callback = process.exit_callback.lock().take().unwrap();
        callback();

        assert!(exit_rx.try_recv().is_ok());
        assert!(supervisor.host_terminated());
        assert_eq!(*host.terminations.lock(), vec![HOST_EXIT_CODE]);
    }

    #[test]
    fn disarmed_callback_signals_worker_but_keeps_host_alive() {
        let (host, supervisor) = supervisor(StubHost::default());
        let process = supervisor.launch().unwrap();
        let (exit_tx, exit_rx) = crossbeam_channel::bounded(1);
        supervisor.register_exit(&process, exit_tx);

        supervisor.disarm();
        let callback = process.exit_callback.lock().take().unwrap();
        callback();

        assert!(exit_rx.try_recv().is_ok());
        assert!(!supervisor.host_terminated());
        assert!(host.terminations.lock().is_empty());
    }

    #[test]
    fn ready_wait_returns_immediately_for_responsive_process() {
        let (_, supervisor) = supervisor(StubHost::default());
        let process = supervisor.launch().unwrap();
        let (_cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
        assert_eq!(
            supervisor.await_input_ready(&process, &cancel_rx),
            ReadyWait::Ready
        );
    }

    #[test]
    fn ready_wait_times_out_without_error() {
        let config = SupervisorConfig {
            ready_timeout_ms: 150,
            ..test_config()
        };
        let (_, supervisor) = supervisor_with(StubHost::default(), config);
        let (_cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);

        let started = Instant::now();
        assert_eq!(
            supervisor.await_input_ready(&unresponsive_process(), &cancel_rx),
            ReadyWait::TimedOut
        );
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn ready_wait_is_interrupted_by_cancel() {
        let (_, supervisor) = supervisor(StubHost::default());
        assert_eq!(supervisor.config().ready_timeout_ms, 10_000);
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);

        let started = Instant::now();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            cancel_tx.send(()).unwrap();
        });
        assert_eq!(
            supervisor.await_input_ready(&unresponsive_process(), &cancel_rx),
            ReadyWait::Cancelled
        );
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "cancel must not wait for the full ready timeout"
        );
        canceller.join().unwrap();
    }

    #[test]
    fn ready_wait_stops_when_process_exits() {
        let (_, supervisor) = supervisor(StubHost::default());
        let process = unresponsive_process();
        process.exited.store(true, Ordering::SeqCst);
        let (_cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);

        let started = Instant::now();
        assert_eq!(
            supervisor.await_input_ready(&process, &cancel_rx),
            ReadyWait::ProcessExited
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
